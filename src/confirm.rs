//! Movement confirmation – dispatch a step, then poll the world for
//! evidence it happened.
//!
//! Shared by navigation and targeting: both capture the position and path
//! generation counters immediately before dispatching a movement action, then
//! poll until **either** counter advances or the budget elapses. Either
//! signal is taken as sufficient evidence the environment responded; this
//! cannot distinguish the intended move from an unrelated path recompute in
//! the same window, a documented fidelity gap kept as-is (DESIGN.md).
//!
//! Diagonal steps complete slower in the target environment and get the
//! longer budget from [`ConfirmConfig`].

use crate::actuation::ActuationCall;
use crate::arbiter::{await_completion, ActionCategory, ArbiterHandle, Completion};
use crate::error::{ArbiterError, ConfirmError};
use crate::store::{PathRecord, PositionRecord, Reader, StateStore};
use crate::types::{ConfirmConfig, Direction, KeyBindings};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

/// One step-dispatching view over the store. Each consumer loop owns its own
/// walker (and with it, its own completion channel).
pub struct Walker {
    config: ConfirmConfig,
    keys: KeyBindings,
    position: Reader<PositionRecord>,
    path: Reader<PathRecord>,
    arbiter: ArbiterHandle,
    reply_tx: mpsc::UnboundedSender<Completion>,
    reply_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Walker {
    pub fn new(
        store: &StateStore,
        arbiter: ArbiterHandle,
        config: ConfirmConfig,
        keys: KeyBindings,
    ) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            config,
            keys,
            position: store.position.reader(),
            path: store.path.reader(),
            arbiter,
            reply_tx,
            reply_rx,
        }
    }

    /// Dispatch one step in `dir` and wait for the environment to react.
    ///
    /// Resolves once the position **or** path generation advances past the
    /// values captured before dispatch; errors with [`ConfirmError::Timeout`]
    /// when neither does within the direction's budget.
    pub async fn step(
        &mut self,
        dir: Direction,
        category: ActionCategory,
    ) -> Result<(), ConfirmError> {
        let budget = self.config.budget(dir);
        let deadline = Instant::now() + budget;

        // Counters captured before dispatch – advancing past these is the
        // success criterion.
        let pos_gen = self.position.generation();
        let path_gen = self.path.generation();

        let call = ActuationCall::SendKey {
            key: self.keys.for_direction(dir),
            modifier: None,
        };
        // TTL = budget: a step that sat in the queue past its own
        // confirmation window is pointless and should be discarded.
        let id = self
            .arbiter
            .submit(category, call, Some(budget), &self.reply_tx)
            .map_err(|e| ConfirmError::Dispatch(e.to_string()))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match await_completion(&mut self.reply_rx, id, remaining).await {
            Ok(completion) if completion.success => {}
            Ok(completion) => {
                return Err(ConfirmError::Dispatch(
                    completion.error.unwrap_or_else(|| "dispatch failed".into()),
                ))
            }
            // TTL-dropped in queue (no completion ever comes) or arbiter gone.
            Err(ArbiterError::CompletionTimeout { .. }) => {
                return Err(ConfirmError::Timeout {
                    waited_ms: budget.as_millis() as u64,
                })
            }
            Err(err) => return Err(ConfirmError::Dispatch(err.to_string())),
        }

        loop {
            if self.position.generation() > pos_gen || self.path.generation() > path_gen {
                trace!(?dir, "step confirmed");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ConfirmError::Timeout {
                    waited_ms: budget.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll()).await;
        }
    }
}
