//! Core agent types shared across all modules.
//!
//! Everything that crosses the shared-memory boundary is encoded as small
//! integers; the enum `as_raw`/`from_raw` tables in this module are the single
//! source of truth for that mapping.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Tile coordinates
// ---------------------------------------------------------------------------

/// Integer tile coordinate. `z` is the floor index (smaller = higher).
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TilePoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev (king-move) distance on the same floor.
    pub fn chebyshev_to(&self, other: &TilePoint) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn same_floor(&self, other: &TilePoint) -> bool {
        self.z == other.z
    }

    /// Direction of a single step toward `other`, `None` when already there
    /// or on a different floor.
    pub fn step_toward(&self, other: &TilePoint) -> Option<Direction> {
        if self.z != other.z {
            return None;
        }
        Direction::from_delta((other.x - self.x).signum(), (other.y - self.y).signum())
    }
}

impl std::fmt::Display for TilePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Movement directions
// ---------------------------------------------------------------------------

/// Eight-way step direction. Diagonal steps complete noticeably slower in the
/// target environment, so confirmation budgets depend on
/// [`Direction::is_diagonal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::North),
            (1, -1) => Some(Self::NorthEast),
            (1, 0) => Some(Self::East),
            (1, 1) => Some(Self::SouthEast),
            (0, 1) => Some(Self::South),
            (-1, 1) => Some(Self::SouthWest),
            (-1, 0) => Some(Self::West),
            (-1, -1) => Some(Self::NorthWest),
            _ => None,
        }
    }

    pub fn is_diagonal(&self) -> bool {
        matches!(
            self,
            Self::NorthEast | Self::SouthEast | Self::SouthWest | Self::NorthWest
        )
    }
}

// ---------------------------------------------------------------------------
// Path plan status
// ---------------------------------------------------------------------------

/// Status published by the pathfinding collaborator.
///
/// Raw mapping (shared-memory byte): 0 Idle, 1 PathFound, 2 WaypointReached,
/// 3 NoPathFound, 4 DifferentFloor, 5 Error, 6 NoValidStartOrEnd,
/// 7 BlockedByCreature. Unknown bytes decode as Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Idle,
    PathFound,
    WaypointReached,
    NoPathFound,
    DifferentFloor,
    Error,
    NoValidStartOrEnd,
    BlockedByCreature,
}

impl PathStatus {
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::PathFound => 1,
            Self::WaypointReached => 2,
            Self::NoPathFound => 3,
            Self::DifferentFloor => 4,
            Self::Error => 5,
            Self::NoValidStartOrEnd => 6,
            Self::BlockedByCreature => 7,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::PathFound,
            2 => Self::WaypointReached,
            3 => Self::NoPathFound,
            4 => Self::DifferentFloor,
            5 => Self::Error,
            6 => Self::NoValidStartOrEnd,
            7 => Self::BlockedByCreature,
            _ => Self::Idle,
        }
    }

    /// Statuses that mean "this waypoint cannot be walked to".
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::NoPathFound | Self::Error | Self::NoValidStartOrEnd
        )
    }
}

// ---------------------------------------------------------------------------
// Creature health bucket
// ---------------------------------------------------------------------------

/// Coarse health reading from the perception collaborator.
///
/// Raw mapping: 0 Full, 1 High, 2 Medium, 3 Low, 4 Critical. Unknown bytes
/// decode as Full (the conservative reading for targeting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBucket {
    Full,
    High,
    Medium,
    Low,
    Critical,
}

impl HealthBucket {
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Critical => 4,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::High,
            2 => Self::Medium,
            3 => Self::Low,
            4 => Self::Critical,
            _ => Self::Full,
        }
    }
}

// ---------------------------------------------------------------------------
// Targeting rules
// ---------------------------------------------------------------------------

/// What to do with creatures matching a rule. Raw mapping: 0 Ignore, 1 Attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Ignore,
    Attack,
}

impl RuleAction {
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Ignore => 0,
            Self::Attack => 1,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            Self::Attack
        } else {
            Self::Ignore
        }
    }
}

/// Movement stance while a rule's target is engaged.
/// Raw mapping: 0 Stand, 1 Follow, 2 Reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Stand,
    Follow,
    Reach,
}

impl Stance {
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Stand => 0,
            Self::Follow => 1,
            Self::Reach => 2,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Follow,
            2 => Self::Reach,
            _ => Self::Stand,
        }
    }
}

// ---------------------------------------------------------------------------
// Waypoint kinds
// ---------------------------------------------------------------------------

/// Route waypoint flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// Area waypoint – satisfied anywhere within its radius.
    Node,
    /// Exact-tile waypoint.
    Stand,
    Ladder,
    Rope,
    Shovel,
    Machete,
    Door,
    /// Hands control to the scripting collaborator.
    Script,
}

impl WaypointKind {
    /// Kinds executed by standing on (or next to) the tile and performing an
    /// actuation primitive.
    pub fn bears_action(&self) -> bool {
        matches!(self, Self::Stand | Self::Ladder | Self::Rope | Self::Shovel)
    }

    /// Kinds that may fire from an adjacent tile instead of the exact tile.
    pub fn proximity_ok(&self) -> bool {
        matches!(
            self,
            Self::Ladder | Self::Rope | Self::Shovel | Self::Machete | Self::Door
        )
    }

    /// Kinds whose action moves the player to another floor, requiring a
    /// perception re-sync before the next waypoint is evaluated.
    pub fn changes_floor(&self) -> bool {
        matches!(self, Self::Ladder | Self::Rope | Self::Shovel)
    }
}

// ---------------------------------------------------------------------------
// Screen mapping
// ---------------------------------------------------------------------------

/// Converts world tiles and battle-list slots to window pixel coordinates.
///
/// The viewport is player-centered: the player's own tile always renders at
/// (`center_x`, `center_y`), so a tile's pixel position is its delta from the
/// player scaled by `tile_px`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenMap {
    /// Pixel position of the player's own tile centre.
    pub center_x: i32,
    pub center_y: i32,
    /// Rendered size of one tile in pixels.
    pub tile_px: i32,
    /// Top-left corner of the first battle-list row.
    pub battle_origin_x: i32,
    pub battle_origin_y: i32,
    /// Vertical stride between battle-list rows.
    pub battle_row_px: i32,
}

impl ScreenMap {
    /// Pixel centre of `tile` when the player stands on `player`.
    /// `None` when the tile is on another floor (not rendered).
    pub fn tile_to_pixels(&self, player: &TilePoint, tile: &TilePoint) -> Option<(i32, i32)> {
        if !player.same_floor(tile) {
            return None;
        }
        Some((
            self.center_x + (tile.x - player.x) * self.tile_px,
            self.center_y + (tile.y - player.y) * self.tile_px,
        ))
    }

    /// Pixel centre of battle-list row `index`.
    pub fn battle_slot(&self, index: usize) -> (i32, i32) {
        (
            self.battle_origin_x + self.battle_row_px / 2,
            self.battle_origin_y + index as i32 * self.battle_row_px + self.battle_row_px / 2,
        )
    }
}

impl Default for ScreenMap {
    fn default() -> Self {
        Self {
            center_x: 480,
            center_y: 352,
            tile_px: 64,
            battle_origin_x: 1620,
            battle_origin_y: 220,
            battle_row_px: 22,
        }
    }
}

// ---------------------------------------------------------------------------
// Key bindings
// ---------------------------------------------------------------------------

/// Platform key codes for the primitives the agent presses.
///
/// Defaults are X11 keysyms: numpad for movement, F-keys for tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    pub north: u32,
    pub north_east: u32,
    pub east: u32,
    pub south_east: u32,
    pub south: u32,
    pub south_west: u32,
    pub west: u32,
    pub north_west: u32,
    pub rope: u32,
    pub shovel: u32,
    pub machete: u32,
}

impl KeyBindings {
    pub fn for_direction(&self, dir: Direction) -> u32 {
        match dir {
            Direction::North => self.north,
            Direction::NorthEast => self.north_east,
            Direction::East => self.east,
            Direction::SouthEast => self.south_east,
            Direction::South => self.south,
            Direction::SouthWest => self.south_west,
            Direction::West => self.west,
            Direction::NorthWest => self.north_west,
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            north: 0xFF97,      // KP_Up
            north_east: 0xFF9A, // KP_Prior
            east: 0xFF98,       // KP_Right
            south_east: 0xFF9B, // KP_Next
            south: 0xFF99,      // KP_Down
            south_west: 0xFF9C, // KP_End
            west: 0xFF96,       // KP_Left
            north_west: 0xFF95, // KP_Home
            rope: 0xFFC0,       // F3
            shovel: 0xFFC1,     // F4
            machete: 0xFFC2,    // F5
        }
    }
}

// ---------------------------------------------------------------------------
// Component configs
// ---------------------------------------------------------------------------

// Durations cross the config boundary as integer milliseconds so TOML/JSON
// profiles stay flat; accessor methods return `Duration`.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Minimum time between two consecutive dispatches.
    pub throttle_ms: u64,
    /// Arbitration cycles a deferrable request may lose before promotion.
    pub max_deferrals: u32,
    /// Rest rectangle for the post-mouse settle move: `x, y, width, height`.
    pub settle_rect: (i32, i32, i32, i32),
}

impl ArbiterConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 120,
            max_deferrals: 8,
            settle_rect: (900, 600, 300, 200),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Confirmation budget for orthogonal steps.
    pub orthogonal_ms: u64,
    /// Confirmation budget for diagonal steps (slower in-environment).
    pub diagonal_ms: u64,
    /// Poll interval while waiting for a counter to advance.
    pub poll_ms: u64,
}

impl ConfirmConfig {
    pub fn budget(&self, dir: Direction) -> Duration {
        if dir.is_diagonal() {
            Duration::from_millis(self.diagonal_ms)
        } else {
            Duration::from_millis(self.orthogonal_ms)
        }
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            orthogonal_ms: 900,
            diagonal_ms: 1600,
            poll_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Loop pacing.
    pub tick_ms: u64,
    /// Budget for awaiting an action-bearing waypoint's completion.
    pub action_timeout_ms: u64,
    /// Backoff after a failed waypoint action before re-evaluating.
    pub action_backoff_ms: u64,
    /// Budget for the perception re-sync wait after a floor change.
    pub sync_timeout_ms: u64,
    /// Position jump (Chebyshev) treated as a teleport.
    pub teleport_threshold: i32,
    /// Minimum cached-path length considered walkable.
    pub min_path_nodes: usize,
    /// Failed attempts before a waypoint action gives up and the waypoint is
    /// blacklisted.
    pub max_action_retries: u32,
}

impl NavigatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn action_backoff(&self) -> Duration {
        Duration::from_millis(self.action_backoff_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            action_timeout_ms: 2000,
            action_backoff_ms: 600,
            sync_timeout_ms: 2500,
            teleport_threshold: 3,
            min_path_nodes: 2,
            max_action_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetingConfig {
    /// Loop pacing.
    pub tick_ms: u64,
    /// Minimum gap between two acquisition clicks.
    pub acquisition_cooldown_ms: u64,
    /// Budget for confirming the environment switched to the desired target.
    pub acquisition_confirm_ms: u64,
    /// Score multiplier step per stickiness point for the pursued creature
    /// (`1 - stickiness * step`).
    pub stickiness_step: f64,
}

impl TargetingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn acquisition_cooldown(&self) -> Duration {
        Duration::from_millis(self.acquisition_cooldown_ms)
    }

    pub fn acquisition_confirm(&self) -> Duration {
        Duration::from_millis(self.acquisition_confirm_ms)
    }
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            acquisition_cooldown_ms: 1200,
            acquisition_confirm_ms: 800,
            stickiness_step: 0.075,
        }
    }
}

/// Top-level agent settings, layered defaults → TOML profile → CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub arbiter: ArbiterConfig,
    pub confirm: ConfirmConfig,
    pub navigator: NavigatorConfig,
    pub targeting: TargetingConfig,
    pub screen: ScreenMap,
    pub keys: KeyBindings,
}
