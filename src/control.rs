//! Cross-loop coordination: the combat control gate and the visited-tile log.
//!
//! These are the only shared mutable values outside the seqlock store, and
//! both are deliberately tiny – a flag and a set.

use crate::types::TilePoint;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Combat gate
// ---------------------------------------------------------------------------

/// Handover flag between targeting and navigation. While engaged, the
/// navigator idles; on release it clears its cached path and re-checks the
/// waypoint it left off on.
#[derive(Debug, Default)]
pub struct CombatGate {
    engaged: AtomicBool,
}

impl CombatGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        self.engaged.store(true, Ordering::Release);
    }

    pub fn release(&self) {
        self.engaged.store(false, Ordering::Release);
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Visited tiles
// ---------------------------------------------------------------------------

/// Tiles walked during combat, one notification per distinct tile. Consumed
/// by the navigator to recognise area waypoints satisfied while control was
/// with targeting.
#[derive(Debug, Default)]
pub struct VisitedLog {
    tiles: Mutex<HashSet<TilePoint>>,
}

impl VisitedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tile. Returns `true` only the first time the tile is seen –
    /// downstream bookkeeping wants exactly one notification per tile.
    pub fn record(&self, tile: TilePoint) -> bool {
        self.tiles.lock().insert(tile)
    }

    /// Any recorded tile within `radius` (Chebyshev) of `center`, same floor.
    pub fn any_within(&self, center: &TilePoint, radius: i32) -> bool {
        self.tiles
            .lock()
            .iter()
            .any(|t| t.same_floor(center) && t.chebyshev_to(center) <= radius)
    }

    pub fn clear(&self) {
        self.tiles.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}
