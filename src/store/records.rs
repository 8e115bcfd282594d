//! Fixed-layout records published into seqlock regions.
//!
//! ## Encoding rules
//!
//! 1. Every record is `#[repr(C)] + Copy` – the volatile seqlock copy relies
//!    on a fixed size and no heap indirection.
//! 2. Text is a fixed `[u8; NAME_CAPACITY]`, zero-terminated, silently
//!    truncated on a UTF-8 boundary beyond capacity.
//! 3. Enums cross as `u8` (tables live next to the enums in `types.rs`).
//! 4. Fractional values are integers scaled by 100.
//! 5. Collections carry a `count` and truncate deterministically at their
//!    fixed capacity – overflow is documented behaviour, not an error.

use crate::types::{HealthBucket, PathStatus, RuleAction, Stance, TilePoint};

/// Capacity of every fixed-width text field.
pub const NAME_CAPACITY: usize = 32;
/// Maximum nodes a published path plan may carry.
pub const MAX_PATH_NODES: usize = 64;
/// Maximum creatures tracked on screen at once.
pub const MAX_CREATURES: usize = 64;
/// Maximum rows mirrored from the battle list panel.
pub const MAX_BATTLE_ENTRIES: usize = 32;
/// Maximum user targeting rules.
pub const MAX_RULES: usize = 32;

// ---------------------------------------------------------------------------
// Text codec
// ---------------------------------------------------------------------------

/// Encode `text` into a zero-terminated fixed-width field, truncating on a
/// character boundary if it does not fit.
pub fn encode_name(text: &str) -> [u8; NAME_CAPACITY] {
    let mut out = [0u8; NAME_CAPACITY];
    let mut end = text.len().min(NAME_CAPACITY - 1);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&text.as_bytes()[..end]);
    out
}

/// Decode a zero-terminated fixed-width field.
pub fn decode_name(field: &[u8; NAME_CAPACITY]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_CAPACITY);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// Player position
// ---------------------------------------------------------------------------

/// Live player tile, rewritten wholesale by the perception collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PositionRecord {
    pub tile: TilePoint,
    pub update_counter: u32,
}

// ---------------------------------------------------------------------------
// Path plan
// ---------------------------------------------------------------------------

/// Result published by the pathfinding collaborator.
///
/// A plan is only trustworthy while `start_anchor` equals the live player
/// tile; consumers must discard it wholesale otherwise (see
/// [`PathRecord::is_stale_for`]).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct PathRecord {
    pub start_anchor: TilePoint,
    pub target: TilePoint,
    pub status_raw: u8,
    pub node_count: u32,
    pub nodes: [TilePoint; MAX_PATH_NODES],
    pub chebyshev_distance: i32,
    /// Tag of the waypoint this plan was computed for (see `route::waypoint_tag`).
    pub waypoint_tag: u32,
    pub update_counter: u32,
}

impl PathRecord {
    pub fn status(&self) -> PathStatus {
        PathStatus::from_raw(self.status_raw)
    }

    pub fn set_status(&mut self, status: PathStatus) {
        self.status_raw = status.as_raw();
    }

    pub fn nodes(&self) -> &[TilePoint] {
        &self.nodes[..(self.node_count as usize).min(MAX_PATH_NODES)]
    }

    /// Copy `nodes` in, truncating the tail past capacity.
    pub fn set_nodes(&mut self, nodes: &[TilePoint]) {
        let n = nodes.len().min(MAX_PATH_NODES);
        self.nodes[..n].copy_from_slice(&nodes[..n]);
        self.node_count = n as u32;
    }

    /// A plan whose anchor no longer matches the live position describes an
    /// outdated situation and must not be partially trusted.
    pub fn is_stale_for(&self, player: &TilePoint) -> bool {
        self.start_anchor != *player
    }
}

impl Default for PathRecord {
    fn default() -> Self {
        Self {
            start_anchor: TilePoint::default(),
            target: TilePoint::default(),
            status_raw: PathStatus::Idle.as_raw(),
            node_count: 0,
            nodes: [TilePoint::default(); MAX_PATH_NODES],
            chebyshev_distance: 0,
            waypoint_tag: 0,
            update_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Creatures
// ---------------------------------------------------------------------------

/// One perceived creature. `instance_id` is stable for the lifetime of a
/// sighting and never reused while the creature is alive – the perception
/// collaborator owns that lifecycle.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CreatureRecord {
    pub instance_id: u32,
    pub tile: TilePoint,
    /// Smoothed distance to the player, ×100.
    pub distance_x100: i32,
    pub is_reachable: bool,
    pub is_adjacent: bool,
    pub is_blocking_path: bool,
    pub health_raw: u8,
    pub name: [u8; NAME_CAPACITY],
}

impl CreatureRecord {
    pub fn health(&self) -> HealthBucket {
        HealthBucket::from_raw(self.health_raw)
    }

    pub fn distance(&self) -> f64 {
        self.distance_x100 as f64 / 100.0
    }

    pub fn name(&self) -> String {
        decode_name(&self.name)
    }
}

impl Default for CreatureRecord {
    fn default() -> Self {
        Self {
            instance_id: 0,
            tile: TilePoint::default(),
            distance_x100: 0,
            is_reachable: false,
            is_adjacent: false,
            is_blocking_path: false,
            health_raw: HealthBucket::Full.as_raw(),
            name: [0; NAME_CAPACITY],
        }
    }
}

/// Every creature currently perceived, rewritten wholesale each publish.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CreaturesRecord {
    pub count: u32,
    pub creatures: [CreatureRecord; MAX_CREATURES],
    pub update_counter: u32,
}

impl CreaturesRecord {
    pub fn iter(&self) -> impl Iterator<Item = &CreatureRecord> {
        self.creatures[..(self.count as usize).min(MAX_CREATURES)].iter()
    }

    /// Append, silently dropping past capacity.
    pub fn push(&mut self, creature: CreatureRecord) {
        if (self.count as usize) < MAX_CREATURES {
            self.creatures[self.count as usize] = creature;
            self.count += 1;
        }
    }

    pub fn by_instance(&self, instance_id: u32) -> Option<&CreatureRecord> {
        self.iter().find(|c| c.instance_id == instance_id)
    }
}

impl Default for CreaturesRecord {
    fn default() -> Self {
        Self {
            count: 0,
            creatures: [CreatureRecord::default(); MAX_CREATURES],
            update_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Battle list
// ---------------------------------------------------------------------------

/// One row of the in-game battle panel, in on-screen order. Row index doubles
/// as the click slot for target acquisition.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BattleEntryRecord {
    pub instance_id: u32,
    pub is_selected: bool,
    pub name: [u8; NAME_CAPACITY],
}

impl BattleEntryRecord {
    pub fn name(&self) -> String {
        decode_name(&self.name)
    }
}

impl Default for BattleEntryRecord {
    fn default() -> Self {
        Self {
            instance_id: 0,
            is_selected: false,
            name: [0; NAME_CAPACITY],
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BattleListRecord {
    pub count: u32,
    pub entries: [BattleEntryRecord; MAX_BATTLE_ENTRIES],
    pub update_counter: u32,
}

impl BattleListRecord {
    pub fn iter(&self) -> impl Iterator<Item = &BattleEntryRecord> {
        self.entries[..(self.count as usize).min(MAX_BATTLE_ENTRIES)].iter()
    }

    pub fn push(&mut self, entry: BattleEntryRecord) {
        if (self.count as usize) < MAX_BATTLE_ENTRIES {
            self.entries[self.count as usize] = entry;
            self.count += 1;
        }
    }

    /// On-screen row of a creature, used to aim the acquisition click.
    pub fn slot_of(&self, instance_id: u32) -> Option<usize> {
        self.iter().position(|e| e.instance_id == instance_id)
    }
}

impl Default for BattleListRecord {
    fn default() -> Self {
        Self {
            count: 0,
            entries: [BattleEntryRecord::default(); MAX_BATTLE_ENTRIES],
            update_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Current target
// ---------------------------------------------------------------------------

/// The environment's own selected target. `instance_id == 0` means none.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TargetRecord {
    pub instance_id: u32,
    pub tile: TilePoint,
    pub distance_x100: i32,
    pub is_reachable: bool,
    pub name: [u8; NAME_CAPACITY],
    pub update_counter: u32,
}

impl TargetRecord {
    pub fn is_none(&self) -> bool {
        self.instance_id == 0
    }

    pub fn name(&self) -> String {
        decode_name(&self.name)
    }
}

impl Default for TargetRecord {
    fn default() -> Self {
        Self {
            instance_id: 0,
            tile: TilePoint::default(),
            distance_x100: 0,
            is_reachable: false,
            name: [0; NAME_CAPACITY],
            update_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Targeting rules
// ---------------------------------------------------------------------------

/// One user targeting rule. Immutable per tick; the whole set is rewritten
/// when the user edits it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RuleRecord {
    pub name: [u8; NAME_CAPACITY],
    pub action_raw: u8,
    pub priority: u8,
    /// 0–10; bias that keeps the current target "cheaper" when re-scoring.
    pub stickiness: u8,
    pub stance_raw: u8,
    /// Desired engagement distance in tiles.
    pub distance: i32,
}

impl RuleRecord {
    pub fn action(&self) -> RuleAction {
        RuleAction::from_raw(self.action_raw)
    }

    pub fn stance(&self) -> Stance {
        Stance::from_raw(self.stance_raw)
    }

    pub fn name(&self) -> String {
        decode_name(&self.name)
    }
}

impl Default for RuleRecord {
    fn default() -> Self {
        Self {
            name: [0; NAME_CAPACITY],
            action_raw: RuleAction::Ignore.as_raw(),
            priority: 0,
            stickiness: 0,
            stance_raw: Stance::Stand.as_raw(),
            distance: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RulesRecord {
    pub count: u32,
    pub rules: [RuleRecord; MAX_RULES],
    pub update_counter: u32,
}

impl RulesRecord {
    pub fn iter(&self) -> impl Iterator<Item = &RuleRecord> {
        self.rules[..(self.count as usize).min(MAX_RULES)].iter()
    }

    pub fn push(&mut self, rule: RuleRecord) {
        if (self.count as usize) < MAX_RULES {
            self.rules[self.count as usize] = rule;
            self.count += 1;
        }
    }

    /// Highest-priority rule whose name matches `creature_name`.
    pub fn matching(&self, creature_name: &str) -> Option<&RuleRecord> {
        self.iter()
            .filter(|r| r.name() == creature_name)
            .max_by_key(|r| r.priority)
    }
}

impl Default for RulesRecord {
    fn default() -> Self {
        Self {
            count: 0,
            rules: [RuleRecord::default(); MAX_RULES],
            update_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Looting flag
// ---------------------------------------------------------------------------

/// Whether the looting collaborator currently wants the shared channel.
/// Published for out-of-process peers; nothing in this crate consumes it.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct LootingRecord {
    pub active: bool,
}
