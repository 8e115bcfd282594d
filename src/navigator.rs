//! NavigationStateMachine – waypoint following over shared-state snapshots.
//!
//! ```text
//! Idle → EvaluatingWaypoint → {Walking | PerformingAction | ExecutingScript
//!      | WaitingForExternalSync} → EvaluatingWaypoint → … → Idle
//! ```
//!
//! One `tick` performs at most one transition. Every read is a snapshot copy
//! from the store; a bad tick degrades to waiting, never to a crash. The
//! machine holds control only while the [`CombatGate`] is released; on
//! regaining control it drops its cached path and skips an area waypoint
//! whose radius was already visited during combat.

use crate::actuation::ActuationCall;
use crate::arbiter::{await_completion, ActionCategory, ArbiterHandle, Completion};
use crate::confirm::Walker;
use crate::control::{CombatGate, VisitedLog};
use crate::error::ConfirmError;
use crate::route::{waypoint_tag, Route, Waypoint};
use crate::store::{CreaturesRecord, PathRecord, PositionRecord, Reader, StateStore};
use crate::types::{
    AgentSettings, KeyBindings, NavigatorConfig, PathStatus, ScreenMap, TilePoint, WaypointKind,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Collaborator messages
// ---------------------------------------------------------------------------

/// Refresh request sent to the pathfinding collaborator. The collaborator
/// answers by publishing a [`PathRecord`] carrying the same `tag` into the
/// store; this crate never calls a search function directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathProbe {
    pub target: TilePoint,
    pub tag: u32,
}

/// Job handed to the scripting collaborator for a `Script` waypoint.
pub struct ScriptJob {
    pub name: String,
    /// Collaborator signals completion by dropping or sending on this.
    pub done: oneshot::Sender<()>,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Closed state set; `tick` matches it exhaustively. `Idle` is both the
/// initial and the safe re-entrant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    EvaluatingWaypoint,
    Walking,
    PerformingAction,
    ExecutingScript,
    WaitingForExternalSync,
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

pub struct Navigator {
    config: NavigatorConfig,
    screen: ScreenMap,
    keys: KeyBindings,
    state: NavState,
    route: Route,

    position: Reader<PositionRecord>,
    path: Reader<PathRecord>,
    creatures: Reader<CreaturesRecord>,

    arbiter: ArbiterHandle,
    reply_tx: mpsc::UnboundedSender<Completion>,
    reply_rx: mpsc::UnboundedReceiver<Completion>,
    walker: Walker,
    probe_tx: mpsc::UnboundedSender<PathProbe>,
    script_tx: Option<mpsc::UnboundedSender<ScriptJob>>,

    gate: Arc<CombatGate>,
    visited: Arc<VisitedLog>,

    /// Last validated plan for the current waypoint.
    cached_path: Option<PathRecord>,
    /// Waypoint id whose advance was already performed – makes a repeated
    /// `WaypointReached` evaluation advance exactly once.
    last_processed: Option<u32>,
    action_attempts: u32,
    lost_control: bool,

    sync_deadline: Option<Instant>,
    sync_creature_gen: u64,
    syncing_waypoint: Option<u32>,
}

impl Navigator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: &AgentSettings,
        store: &StateStore,
        arbiter: ArbiterHandle,
        route: Route,
        gate: Arc<CombatGate>,
        visited: Arc<VisitedLog>,
        probe_tx: mpsc::UnboundedSender<PathProbe>,
        script_tx: Option<mpsc::UnboundedSender<ScriptJob>>,
    ) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let walker = Walker::new(
            store,
            arbiter.clone(),
            settings.confirm.clone(),
            settings.keys.clone(),
        );
        Self {
            config: settings.navigator.clone(),
            screen: settings.screen.clone(),
            keys: settings.keys.clone(),
            state: NavState::Idle,
            route,
            position: store.position.reader(),
            path: store.path.reader(),
            creatures: store.creatures.reader(),
            arbiter,
            reply_tx,
            reply_rx,
            walker,
            probe_tx,
            script_tx,
            gate,
            visited,
            cached_path: None,
            last_processed: None,
            action_attempts: 0,
            lost_control: false,
            sync_deadline: None,
            sync_creature_gen: 0,
            syncing_waypoint: None,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Drive ticks forever at the configured pace.
    pub async fn run(mut self) {
        info!(waypoints = self.route.len(), "navigator loop starting");
        let mut timer = tokio::time::interval(self.config.tick());
        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    /// One state-machine step. All transitions are synchronous within the
    /// tick; suspension points are bounded awaits only.
    pub async fn tick(&mut self) {
        if self.gate.is_engaged() {
            if !self.lost_control {
                debug!("combat engaged – navigation yields control");
                self.lost_control = true;
                self.state = NavState::Idle;
            }
            return;
        }
        if self.lost_control {
            self.lost_control = false;
            self.regain_control();
        }

        self.state = match self.state {
            NavState::Idle => self.from_idle(),
            NavState::EvaluatingWaypoint => self.evaluate(),
            NavState::Walking => self.walk().await,
            NavState::PerformingAction => self.perform_action().await,
            NavState::ExecutingScript => self.execute_script().await,
            NavState::WaitingForExternalSync => self.wait_external_sync(),
        };
    }

    // -----------------------------------------------------------------------
    // Idle
    // -----------------------------------------------------------------------

    fn from_idle(&mut self) -> NavState {
        if self.route.is_empty() {
            NavState::Idle
        } else {
            NavState::EvaluatingWaypoint
        }
    }

    // -----------------------------------------------------------------------
    // EvaluatingWaypoint
    // -----------------------------------------------------------------------

    fn evaluate(&mut self) -> NavState {
        // Skip anything already proven unreachable, without re-evaluating.
        if !self.route.skip_blacklisted() {
            warn!("every waypoint is blacklisted – route exhausted");
            return NavState::Idle;
        }
        let Some(wp) = self.route.current().cloned() else {
            return NavState::Idle;
        };

        // Script waypoints bypass position and path checks entirely.
        if wp.kind == WaypointKind::Script {
            return NavState::ExecutingScript;
        }

        let Some(pos) = self.position.latest() else {
            // No perception yet – wait, never invent a position.
            return NavState::EvaluatingWaypoint;
        };
        let player = pos.tile;

        if wp.satisfied_at(&player) {
            if wp.kind.bears_action() {
                return NavState::PerformingAction;
            }
            self.complete_waypoint(wp.id);
            return NavState::Idle;
        }

        let Some(path) = self.path.latest() else {
            self.request_probe(&wp);
            return NavState::EvaluatingWaypoint;
        };

        // A plan anchored somewhere we no longer stand describes an outdated
        // situation; discard wholesale and ask for a refresh.
        if path.is_stale_for(&player) {
            trace!(anchor = %path.start_anchor, player = %player, "stale path discarded");
            self.cached_path = None;
            self.request_probe(&wp);
            return NavState::EvaluatingWaypoint;
        }

        let tag = waypoint_tag(wp.id);
        let tagged = path.waypoint_tag == tag;

        match path.status() {
            PathStatus::PathFound => {
                if self.within_action_range(&wp, &player) {
                    return NavState::PerformingAction;
                }
                if tagged && path.nodes().len() >= self.config.min_path_nodes {
                    self.cached_path = Some(path);
                    return NavState::Walking;
                }
                self.request_probe(&wp);
                NavState::EvaluatingWaypoint
            }
            PathStatus::DifferentFloor => {
                if player.z == wp.tile.z {
                    // Perception lag: we are already on the waypoint's floor.
                    let cached_usable = self
                        .cached_path
                        .as_ref()
                        .map(|c| c.waypoint_tag == tag && c.start_anchor.z == player.z)
                        .unwrap_or(false);
                    if cached_usable {
                        return NavState::Walking;
                    }
                    self.request_probe(&wp);
                    return NavState::EvaluatingWaypoint;
                }
                if tagged {
                    return self.skip_waypoint(&wp);
                }
                self.request_probe(&wp);
                NavState::EvaluatingWaypoint
            }
            status if status.is_unreachable() => {
                if tagged {
                    return self.skip_waypoint(&wp);
                }
                self.request_probe(&wp);
                NavState::EvaluatingWaypoint
            }
            PathStatus::WaypointReached => {
                if tagged {
                    self.complete_waypoint(wp.id);
                    return NavState::Idle;
                }
                self.request_probe(&wp);
                NavState::EvaluatingWaypoint
            }
            // Idle / BlockedByCreature: the collaborator (or targeting) is
            // still working – hold position.
            _ => NavState::EvaluatingWaypoint,
        }
    }

    /// Proximity rule for action waypoints, with the documented exception:
    /// a ladder approached from its south-east neighbor is not adjacent –
    /// that approach angle fails in the target environment.
    fn within_action_range(&self, wp: &Waypoint, player: &TilePoint) -> bool {
        if !wp.kind.proximity_ok() || !player.same_floor(&wp.tile) {
            return false;
        }
        if player.chebyshev_to(&wp.tile) > 1 {
            return false;
        }
        let south_east = wp.kind == WaypointKind::Ladder
            && player.x == wp.tile.x + 1
            && player.y == wp.tile.y + 1;
        !south_east
    }

    fn request_probe(&mut self, wp: &Waypoint) {
        let probe = PathProbe {
            target: wp.tile,
            tag: waypoint_tag(wp.id),
        };
        if self.probe_tx.send(probe).is_err() {
            debug!("pathfinding collaborator gone – probe dropped");
        }
    }

    /// Advance past a completed waypoint, exactly once per id.
    fn complete_waypoint(&mut self, id: u32) {
        if self.last_processed == Some(id) {
            return;
        }
        trace!(waypoint = id, "waypoint complete");
        self.route.advance();
        self.last_processed = Some(id);
        self.cached_path = None;
        self.action_attempts = 0;
    }

    /// Blacklist and advance past an unreachable waypoint. The processed
    /// marker is invalidated so the next tick re-evaluates cleanly instead of
    /// deadlocking on the skip.
    fn skip_waypoint(&mut self, wp: &Waypoint) -> NavState {
        warn!(waypoint = wp.id, tile = %wp.tile, "waypoint unreachable – blacklisted");
        self.route.blacklist(wp.id);
        self.route.advance();
        self.last_processed = None;
        self.cached_path = None;
        self.action_attempts = 0;
        NavState::Idle
    }

    // -----------------------------------------------------------------------
    // Walking
    // -----------------------------------------------------------------------

    async fn walk(&mut self) -> NavState {
        let Some(pos) = self.position.latest() else {
            return NavState::EvaluatingWaypoint;
        };
        let Some(cached) = self.cached_path.as_ref() else {
            return NavState::EvaluatingWaypoint;
        };

        // First plan node we are not already standing on.
        let next = cached.nodes().iter().find(|n| **n != pos.tile).copied();
        let Some(dir) = next.and_then(|n| pos.tile.step_toward(&n)) else {
            self.cached_path = None;
            return NavState::EvaluatingWaypoint;
        };

        match self.walker.step(dir, ActionCategory::Movement).await {
            Ok(()) => NavState::EvaluatingWaypoint,
            Err(ConfirmError::Timeout { waited_ms }) => {
                debug!(?dir, waited_ms, "step unconfirmed – dropping cached path");
                self.cached_path = None;
                NavState::EvaluatingWaypoint
            }
            Err(err) => {
                warn!(?dir, %err, "step dispatch failed");
                self.cached_path = None;
                NavState::EvaluatingWaypoint
            }
        }
    }

    // -----------------------------------------------------------------------
    // PerformingAction
    // -----------------------------------------------------------------------

    async fn perform_action(&mut self) -> NavState {
        let Some(wp) = self.route.current().cloned() else {
            return NavState::Idle;
        };
        let Some(pos) = self.position.latest() else {
            return NavState::EvaluatingWaypoint;
        };
        let before = pos.tile;

        // Standing on a Stand waypoint is the whole action.
        if wp.kind == WaypointKind::Stand {
            self.complete_waypoint(wp.id);
            return NavState::Idle;
        }

        let calls = self.action_calls(&wp, &before);
        if calls.is_empty() {
            // Tile not on screen (floor mismatch mid-action) – retry path.
            return self.action_failed(&wp).await;
        }

        let mut last_id = None;
        for call in calls {
            match self.arbiter.submit(
                ActionCategory::Movement,
                call,
                Some(self.config.action_timeout()),
                &self.reply_tx,
            ) {
                Ok(id) => last_id = Some(id),
                Err(err) => {
                    warn!(%err, "waypoint action submit failed");
                    return self.action_failed(&wp).await;
                }
            }
        }
        let Some(id) = last_id else {
            return self.action_failed(&wp).await;
        };

        match await_completion(&mut self.reply_rx, id, self.config.action_timeout()).await {
            Ok(completion) if completion.success => {
                let after = self.position.latest().map(|p| p.tile).unwrap_or(before);
                let jumped = before.chebyshev_to(&after) >= self.config.teleport_threshold
                    || !before.same_floor(&after);
                if wp.kind.changes_floor() || jumped {
                    self.begin_external_sync(wp.id);
                    NavState::WaitingForExternalSync
                } else {
                    self.complete_waypoint(wp.id);
                    NavState::Idle
                }
            }
            Ok(completion) => {
                debug!(
                    waypoint = wp.id,
                    error = completion.error.as_deref().unwrap_or("unknown"),
                    "waypoint action failed"
                );
                self.action_failed(&wp).await
            }
            Err(err) => {
                debug!(waypoint = wp.id, %err, "waypoint action unconfirmed");
                self.action_failed(&wp).await
            }
        }
    }

    /// Fixed backoff, then re-evaluate; bounded by `max_action_retries`.
    async fn action_failed(&mut self, wp: &Waypoint) -> NavState {
        self.action_attempts += 1;
        if self.action_attempts >= self.config.max_action_retries {
            return self.skip_waypoint(wp);
        }
        tokio::time::sleep(self.config.action_backoff()).await;
        NavState::EvaluatingWaypoint
    }

    /// Actuation primitives for an action waypoint, already resolved to
    /// window pixels. Empty when the tile is not currently rendered.
    fn action_calls(&self, wp: &Waypoint, player: &TilePoint) -> Vec<ActuationCall> {
        let Some((x, y)) = self.screen.tile_to_pixels(player, &wp.tile) else {
            return Vec::new();
        };
        match wp.kind {
            WaypointKind::Ladder => vec![ActuationCall::RightClick { x, y }],
            WaypointKind::Door => vec![ActuationCall::LeftClick { x, y }],
            WaypointKind::Rope => vec![
                ActuationCall::SendKey {
                    key: self.keys.rope,
                    modifier: None,
                },
                ActuationCall::LeftClick { x, y },
            ],
            WaypointKind::Shovel => vec![
                ActuationCall::SendKey {
                    key: self.keys.shovel,
                    modifier: None,
                },
                ActuationCall::LeftClick { x, y },
            ],
            WaypointKind::Machete => vec![
                ActuationCall::SendKey {
                    key: self.keys.machete,
                    modifier: None,
                },
                ActuationCall::LeftClick { x, y },
            ],
            WaypointKind::Node | WaypointKind::Stand | WaypointKind::Script => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // ExecutingScript
    // -----------------------------------------------------------------------

    async fn execute_script(&mut self) -> NavState {
        let Some(wp) = self.route.current().cloned() else {
            return NavState::Idle;
        };
        if let Some(tx) = &self.script_tx {
            let (done_tx, done_rx) = oneshot::channel();
            let job = ScriptJob {
                name: wp.script.clone().unwrap_or_default(),
                done: done_tx,
            };
            if tx.send(job).is_ok() {
                // Bounded wait; a hung script must not stall the route.
                if tokio::time::timeout(self.config.action_timeout(), done_rx)
                    .await
                    .is_err()
                {
                    debug!(waypoint = wp.id, "script timed out – proceeding");
                }
            }
        } else {
            debug!(waypoint = wp.id, "no scripting collaborator attached");
        }
        self.complete_waypoint(wp.id);
        NavState::Idle
    }

    // -----------------------------------------------------------------------
    // WaitingForExternalSync
    // -----------------------------------------------------------------------

    fn begin_external_sync(&mut self, waypoint: u32) {
        self.sync_deadline = Some(Instant::now() + self.config.sync_timeout());
        self.sync_creature_gen = self.creatures.generation();
        self.syncing_waypoint = Some(waypoint);
    }

    /// Wait for perception to re-stabilise after a floor change; on timeout
    /// proceed anyway – availability over strict correctness.
    fn wait_external_sync(&mut self) -> NavState {
        let refreshed = self.creatures.generation() > self.sync_creature_gen;
        let expired = self
            .sync_deadline
            .map(|d| Instant::now() >= d)
            .unwrap_or(true);
        if !refreshed && !expired {
            return NavState::WaitingForExternalSync;
        }
        if !refreshed {
            debug!("perception sync timed out – proceeding");
        }
        self.sync_deadline = None;
        if let Some(id) = self.syncing_waypoint.take() {
            self.complete_waypoint(id);
        }
        NavState::Idle
    }

    // -----------------------------------------------------------------------
    // Control handover
    // -----------------------------------------------------------------------

    /// Called once when the combat gate releases. Any cached plan describes
    /// the pre-combat world; an area waypoint whose radius was walked during
    /// combat is already satisfied.
    fn regain_control(&mut self) {
        self.cached_path = None;
        if let Some(wp) = self.route.current().cloned() {
            if wp.kind == WaypointKind::Node && self.visited.any_within(&wp.tile, wp.radius) {
                debug!(waypoint = wp.id, "area waypoint visited during combat – skipping");
                self.complete_waypoint(wp.id);
            }
        }
        self.visited.clear();
        self.state = NavState::Idle;
    }
}
