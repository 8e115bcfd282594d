//! TargetSelectionEngine – combat target scoring, acquisition, and approach.
//!
//! Selection follows three rules, in order:
//!
//! 1. The environment's own confirmed target wins outright when it is
//!    present, reachable, and matches an Attack rule – the engine follows
//!    what the environment selected rather than fighting it.
//! 2. Otherwise every reachable, rule-matching creature is scored by its
//!    smoothed distance, multiplied by `1 − stickiness × step` when it is the
//!    creature already being pursued (discourages target flapping).
//! 3. Lowest score wins; ties break on raw distance.
//!
//! Acquisition clicks the creature's battle-list row, rate-limited by a
//! cooldown, then polls (bounded) for the environment's selection to change.
//! While any target is engaged the [`CombatGate`] is held, which parks the
//! navigator.

use crate::actuation::ActuationCall;
use crate::arbiter::{await_completion, ActionCategory, ArbiterHandle, Completion};
use crate::confirm::Walker;
use crate::control::{CombatGate, VisitedLog};
use crate::store::{
    BattleListRecord, CreatureRecord, CreaturesRecord, PathRecord, PositionRecord, Reader,
    RuleRecord, RulesRecord, StateStore, TargetRecord,
};
use crate::types::{AgentSettings, PathStatus, RuleAction, ScreenMap, Stance, TargetingConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Poll interval while confirming an acquisition click took effect.
const ACQUIRE_POLL: Duration = Duration::from_millis(25);

pub struct TargetingEngine {
    config: TargetingConfig,
    screen: ScreenMap,

    position: Reader<PositionRecord>,
    path: Reader<PathRecord>,
    creatures: Reader<CreaturesRecord>,
    battle: Reader<BattleListRecord>,
    rules: Reader<RulesRecord>,
    target: Reader<TargetRecord>,

    arbiter: ArbiterHandle,
    reply_tx: mpsc::UnboundedSender<Completion>,
    reply_rx: mpsc::UnboundedReceiver<Completion>,
    walker: Walker,

    gate: Arc<CombatGate>,
    visited: Arc<VisitedLog>,

    /// Instance currently pursued; 0 when disengaged.
    pursued: u32,
    last_acquisition: Option<Instant>,
}

impl TargetingEngine {
    pub fn new(
        settings: &AgentSettings,
        store: &StateStore,
        arbiter: ArbiterHandle,
        gate: Arc<CombatGate>,
        visited: Arc<VisitedLog>,
    ) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let walker = Walker::new(
            store,
            arbiter.clone(),
            settings.confirm.clone(),
            settings.keys.clone(),
        );
        Self {
            config: settings.targeting.clone(),
            screen: settings.screen.clone(),
            position: store.position.reader(),
            path: store.path.reader(),
            creatures: store.creatures.reader(),
            battle: store.battle.reader(),
            rules: store.rules.reader(),
            target: store.target.reader(),
            arbiter,
            reply_tx,
            reply_rx,
            walker,
            gate,
            visited,
            pursued: 0,
            last_acquisition: None,
        }
    }

    pub fn pursued(&self) -> u32 {
        self.pursued
    }

    pub async fn run(mut self) {
        info!("targeting loop starting");
        let mut timer = tokio::time::interval(self.config.tick());
        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    /// One selection/acquisition/movement pass.
    pub async fn tick(&mut self) {
        // Absent domains mean "no data yet" – disengage rather than act on
        // defaults.
        let (Some(creatures), Some(rules)) = (self.creatures.latest(), self.rules.latest()) else {
            self.disengage();
            return;
        };
        let env_target = self.target.latest().unwrap_or_default();

        let Some((creature, rule)) = self.select(&creatures, &rules, &env_target) else {
            self.disengage();
            return;
        };

        if self.pursued != creature.instance_id {
            trace!(
                instance = creature.instance_id,
                name = %creature.name(),
                "pursuing target"
            );
        }
        self.pursued = creature.instance_id;
        self.gate.engage();

        if env_target.instance_id != creature.instance_id {
            // Only steal the selection when the environment's current one is
            // not itself rule-matching; otherwise follow it next tick.
            if !Self::rule_matching(&rules, &env_target) {
                self.acquire(creature.instance_id).await;
            }
            return;
        }

        self.manage_movement(&creature, &rule).await;
    }

    fn disengage(&mut self) {
        if self.pursued != 0 {
            debug!(instance = self.pursued, "target lost – disengaging");
        }
        self.pursued = 0;
        self.gate.release();
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    fn select(
        &self,
        creatures: &CreaturesRecord,
        rules: &RulesRecord,
        env_target: &TargetRecord,
    ) -> Option<(CreatureRecord, RuleRecord)> {
        // The environment's confirmed selection overrides scoring.
        if !env_target.is_none() {
            if let Some(creature) = creatures.by_instance(env_target.instance_id) {
                if creature.is_reachable {
                    if let Some(rule) = rules.matching(&creature.name()) {
                        if rule.action() == RuleAction::Attack {
                            return Some((*creature, *rule));
                        }
                    }
                }
            }
        }

        let mut best: Option<(f64, i32, CreatureRecord, RuleRecord)> = None;
        for creature in creatures.iter() {
            if !creature.is_reachable {
                continue;
            }
            let Some(rule) = rules.matching(&creature.name()) else {
                continue;
            };
            if rule.action() != RuleAction::Attack {
                continue;
            }
            let mut score = creature.distance();
            if self.pursued != 0 && creature.instance_id == self.pursued {
                score *= 1.0 - f64::from(rule.stickiness) * self.config.stickiness_step;
            }
            let candidate = (score, creature.distance_x100, *creature, *rule);
            let better = match &best {
                None => true,
                // Lowest score wins; ties break on the raw distance.
                Some((s, d, _, _)) => {
                    score < *s || (score == *s && creature.distance_x100 < *d)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best.map(|(_, _, creature, rule)| (creature, rule))
    }

    fn rule_matching(rules: &RulesRecord, target: &TargetRecord) -> bool {
        if target.is_none() {
            return false;
        }
        rules
            .matching(&target.name())
            .map(|r| r.action() == RuleAction::Attack)
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    /// Click the desired creature's battle-list row, then wait (bounded) for
    /// the environment's selection to change. Suppressed entirely while the
    /// cooldown since the previous click has not elapsed – re-clicking faster
    /// only thrashes the selection.
    async fn acquire(&mut self, instance_id: u32) {
        if let Some(last) = self.last_acquisition {
            if last.elapsed() < self.config.acquisition_cooldown() {
                return;
            }
        }
        let Some(battle) = self.battle.latest() else {
            return;
        };
        let Some(slot) = battle.slot_of(instance_id) else {
            debug!(instance = instance_id, "target not on battle list");
            return;
        };
        let (x, y) = self.screen.battle_slot(slot);

        self.last_acquisition = Some(Instant::now());
        let submitted = self.arbiter.submit(
            ActionCategory::Targeting,
            ActuationCall::LeftClick { x, y },
            Some(self.config.acquisition_cooldown()),
            &self.reply_tx,
        );
        let Ok(id) = submitted else {
            return;
        };
        match await_completion(&mut self.reply_rx, id, self.config.acquisition_confirm()).await {
            Ok(completion) if completion.success => {}
            Ok(_) | Err(_) => return,
        }

        // Bounded confirmation poll; giving up is fine – next tick re-scores.
        let deadline = Instant::now() + self.config.acquisition_confirm();
        loop {
            let selected = self
                .target
                .latest()
                .map(|t| t.instance_id == instance_id)
                .unwrap_or(false);
            if selected {
                trace!(instance = instance_id, "acquisition confirmed");
                return;
            }
            if Instant::now() >= deadline {
                debug!(instance = instance_id, "acquisition unconfirmed");
                return;
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Step toward the engaged target until within the rule's distance.
    ///
    /// Desired distance 1 trusts the perception adjacency flag; anything
    /// larger compares against the smoothed Chebyshev distance. Movement
    /// needs a usable, non-stale path with at least two nodes.
    async fn manage_movement(&mut self, creature: &CreatureRecord, rule: &RuleRecord) {
        if rule.stance() == Stance::Stand {
            return;
        }
        let desired = rule.distance.max(1);
        let in_range = if desired == 1 {
            creature.is_adjacent
        } else {
            creature.distance() <= f64::from(desired)
        };
        if in_range {
            return;
        }

        let Some(pos) = self.position.latest() else {
            return;
        };
        let Some(path) = self.path.latest() else {
            return;
        };
        if path.is_stale_for(&pos.tile)
            || path.status() != PathStatus::PathFound
            || path.nodes().len() < 2
        {
            return;
        }

        let next = path.nodes().iter().find(|n| **n != pos.tile).copied();
        let Some(dir) = next.and_then(|n| pos.tile.step_toward(&n)) else {
            return;
        };
        if self.walker.step(dir, ActionCategory::Targeting).await.is_ok() {
            if let Some(after) = self.position.latest() {
                // One notification per distinct tile; the log deduplicates.
                self.visited.record(after.tile);
            }
        }
    }
}
