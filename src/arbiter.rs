//! ActionArbiter – one queue between every intent producer and the shared
//! output channel.
//!
//! ## Queue discipline
//!
//! | Category   | Priority | Deferrable |
//! |------------|----------|------------|
//! | UserRule   | 0        | no         |
//! | Targeting  | 1        | no         |
//! | Looting    | 2        | yes        |
//! | Script     | 3        | yes        |
//! | Movement   | 4        | yes        |
//! | Hotkey     | 5        | yes        |
//! | Default    | 6        | yes        |
//!
//! Before every dispatch: TTL-expired requests are dropped, deferrable
//! requests that keep losing the priority comparison accumulate deferrals and
//! are eventually promoted to the most-urgent tier, then the head of the
//! stable priority sort is popped. Exactly one request is ever in flight, and
//! a minimum inter-dispatch interval is enforced.
//!
//! ## Completion contract
//!
//! Every **dispatched** request produces exactly one [`Completion`], success
//! or failure, so an awaiting caller never hangs on a dispatch. A request
//! whose TTL expires while still queued is dropped **without** a completion –
//! a long-standing asymmetry kept as-is (see DESIGN.md); callers that await
//! must pair [`await_completion`] with their own budget.

use crate::actuation::{ActuationCall, Actuator};
use crate::error::ArbiterError;
use crate::types::ArbiterConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Where a request came from; drives priority and deferrability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Explicit user-configured reaction (heal rule etc.).
    UserRule,
    /// Combat target acquisition.
    Targeting,
    Looting,
    Script,
    /// Navigation movement steps.
    Movement,
    Hotkey,
    Default,
}

impl ActionCategory {
    pub fn priority(self) -> u8 {
        match self {
            Self::UserRule => 0,
            Self::Targeting => 1,
            Self::Looting => 2,
            Self::Script => 3,
            Self::Movement => 4,
            Self::Hotkey => 5,
            Self::Default => 6,
        }
    }

    /// Deferrable requests may wait behind more urgent traffic; the
    /// anti-starvation pass guarantees they are not deferred forever.
    pub fn is_deferrable(self) -> bool {
        !matches!(self, Self::UserRule | Self::Targeting)
    }
}

/// Tier a starved request is promoted into.
pub const PROMOTED_PRIORITY: u8 = 0;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Result of one dispatched request, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub id: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct QueuedRequest {
    id: u64,
    category: ActionCategory,
    call: ActuationCall,
    ttl: Option<Duration>,
    enqueued_at: Instant,
    priority: u8,
    deferrals: u32,
    reply: mpsc::UnboundedSender<Completion>,
}

impl QueuedRequest {
    fn expired(&self, now: Instant) -> bool {
        self.ttl
            .map(|ttl| now.duration_since(self.enqueued_at) >= ttl)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable intake side of the arbiter. Each intent producer keeps one,
/// together with its own completion channel.
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    next_id: Arc<AtomicU64>,
}

impl ArbiterHandle {
    /// Enqueue a request. Completions for it (if it is ever dispatched) land
    /// on `reply`. Returns the correlation id.
    pub fn submit(
        &self,
        category: ActionCategory,
        call: ActuationCall,
        ttl: Option<Duration>,
        reply: &mpsc::UnboundedSender<Completion>,
    ) -> Result<u64, ArbiterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = QueuedRequest {
            id,
            priority: category.priority(),
            category,
            call,
            ttl,
            enqueued_at: Instant::now(),
            deferrals: 0,
            reply: reply.clone(),
        };
        self.tx.send(request).map_err(|_| ArbiterError::Closed)?;
        Ok(id)
    }
}

/// A fresh completion channel for one intent producer.
pub fn completion_channel() -> (
    mpsc::UnboundedSender<Completion>,
    mpsc::UnboundedReceiver<Completion>,
) {
    mpsc::unbounded_channel()
}

/// Wait for the completion of `id`, discarding stale completions of earlier
/// requests on the same channel. The budget is mandatory: a TTL-dropped
/// request never completes, and this guard is what keeps callers from
/// hanging on that documented gap.
pub async fn await_completion(
    rx: &mut mpsc::UnboundedReceiver<Completion>,
    id: u64,
    budget: Duration,
) -> Result<Completion, ArbiterError> {
    let deadline = Instant::now() + budget;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(completion)) if completion.id == id => return Ok(completion),
            Ok(Some(stale)) => {
                debug!(stale_id = stale.id, awaiting = id, "discarding stale completion");
            }
            Ok(None) => return Err(ArbiterError::Closed),
            Err(_) => {
                return Err(ArbiterError::CompletionTimeout {
                    id,
                    waited_ms: budget.as_millis() as u64,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Arbiter
// ---------------------------------------------------------------------------

/// Owns the queue and the actuator. Runs as its own task; single-threaded
/// access to the queue means no locking beyond the intake channel.
pub struct Arbiter {
    config: ArbiterConfig,
    actuator: Box<dyn Actuator>,
    rx: mpsc::UnboundedReceiver<QueuedRequest>,
    queue: Vec<QueuedRequest>,
    last_dispatch: Option<Instant>,
}

impl Arbiter {
    pub fn new(config: ArbiterConfig, actuator: Box<dyn Actuator>) -> (Self, ArbiterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ArbiterHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (
            Self {
                config,
                actuator,
                rx,
                queue: Vec::new(),
                last_dispatch: None,
            },
            handle,
        )
    }

    /// Run until every handle is dropped and the queue drains.
    pub async fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                // Nothing pending – block on intake instead of spinning.
                match self.rx.recv().await {
                    Some(request) => self.queue.push(request),
                    None => break,
                }
            }

            // Enforce the inter-dispatch throttle before arbitration so a
            // request can still expire (or be overtaken) while we wait.
            if let Some(last) = self.last_dispatch {
                let next_allowed = last + self.config.throttle();
                tokio::time::sleep_until(next_allowed).await;
            }

            self.drain_intake();
            self.prune_expired();
            self.apply_starvation_pass();

            // Stable sort keeps arrival order within a tier (fairness).
            self.queue.sort_by_key(|r| r.priority);
            if self.queue.is_empty() {
                continue;
            }
            let request = self.queue.remove(0);
            self.dispatch(request);
        }
    }

    fn drain_intake(&mut self) {
        while let Ok(request) = self.rx.try_recv() {
            self.queue.push(request);
        }
    }

    /// Drop TTL-expired requests without dispatch and **without** completion.
    fn prune_expired(&mut self) {
        let now = Instant::now();
        self.queue.retain(|r| {
            if r.expired(now) {
                debug!(id = r.id, category = ?r.category, "request expired in queue");
                false
            } else {
                true
            }
        });
    }

    /// Anti-starvation: every deferrable request sitting above the cycle's
    /// minimum priority accrues a deferral; past the threshold it jumps to
    /// the most-urgent tier.
    fn apply_starvation_pass(&mut self) {
        let Some(min_priority) = self.queue.iter().map(|r| r.priority).min() else {
            return;
        };
        for request in &mut self.queue {
            if request.priority > min_priority && request.category.is_deferrable() {
                request.deferrals += 1;
                if request.deferrals > self.config.max_deferrals
                    && request.priority != PROMOTED_PRIORITY
                {
                    debug!(
                        id = request.id,
                        category = ?request.category,
                        deferrals = request.deferrals,
                        "promoting starved request"
                    );
                    request.priority = PROMOTED_PRIORITY;
                }
            }
        }
    }

    fn dispatch(&mut self, request: QueuedRequest) {
        let result = self.actuator.perform(&request.call);
        self.last_dispatch = Some(Instant::now());

        if request.call.is_mouse() {
            self.settle_pointer();
        }

        // Exactly one completion per dispatched request, error or not – the
        // triggering error is logged here, never re-thrown across the queue.
        let completion = match result {
            Ok(()) => Completion {
                id: request.id,
                success: true,
                error: None,
            },
            Err(err) => {
                warn!(id = request.id, %err, "actuation failed");
                Completion {
                    id: request.id,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };
        // A caller that stopped listening is not an error.
        let _ = request.reply.send(completion);
    }

    /// Park the pointer somewhere plausible inside the rest rectangle so it
    /// never sits on the exact clicked pixel between actions.
    fn settle_pointer(&mut self) {
        let (x, y, w, h) = self.config.settle_rect;
        let mut rng = rand::thread_rng();
        let call = ActuationCall::MouseMove {
            x: x + rng.gen_range(0..w.max(1)),
            y: y + rng.gen_range(0..h.max(1)),
        };
        if let Err(err) = self.actuator.perform(&call) {
            debug!(%err, "settle move failed");
        }
    }
}
