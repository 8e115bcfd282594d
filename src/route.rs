//! Waypoint routes: the ordered list the navigator walks, the unreachable
//! blacklist, and the cached-path tag.

use crate::types::{TilePoint, WaypointKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Waypoint
// ---------------------------------------------------------------------------

/// One route entry. Loaded from a JSON route file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    /// Stable id within the route; the path-plan tag is derived from it.
    pub id: u32,
    pub kind: WaypointKind,
    pub tile: TilePoint,
    /// Satisfaction radius for `Node` waypoints.
    #[serde(default)]
    pub radius: i32,
    /// Script name for `Script` waypoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Waypoint {
    /// Whether standing at `tile` already satisfies this waypoint.
    pub fn satisfied_at(&self, tile: &TilePoint) -> bool {
        match self.kind {
            WaypointKind::Node => {
                tile.same_floor(&self.tile) && tile.chebyshev_to(&self.tile) <= self.radius
            }
            _ => *tile == self.tile,
        }
    }
}

/// Tag identifying which waypoint a published path plan was computed for.
///
/// A checksum of the id rather than the raw id, so a plan left over from an
/// earlier route (same ids, different file) is cheaply invalidated alongside
/// everything else whenever tags are regenerated.
pub fn waypoint_tag(id: u32) -> u32 {
    let digest = md5::compute(id.to_le_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// The waypoint list plus cursor and blacklist. Routes loop: advancing past
/// the last waypoint wraps to the first.
#[derive(Debug, Clone)]
pub struct Route {
    waypoints: Vec<Waypoint>,
    current: usize,
    blacklist: HashSet<u32>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            current: 0,
            blacklist: HashSet::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Move the cursor to the next waypoint, wrapping at the end.
    pub fn advance(&mut self) {
        if !self.waypoints.is_empty() {
            self.current = (self.current + 1) % self.waypoints.len();
        }
    }

    /// Mark a waypoint as proven unreachable; it is skipped from then on and
    /// never retried.
    pub fn blacklist(&mut self, id: u32) {
        self.blacklist.insert(id);
    }

    pub fn is_blacklisted(&self, id: u32) -> bool {
        self.blacklist.contains(&id)
    }

    /// Advance the cursor past any blacklisted waypoints, without
    /// re-evaluating them. Returns `false` when every waypoint is
    /// blacklisted (the route is exhausted).
    pub fn skip_blacklisted(&mut self) -> bool {
        for _ in 0..self.waypoints.len() {
            match self.current() {
                Some(wp) if self.blacklist.contains(&wp.id) => self.advance(),
                Some(_) => return true,
                None => return false,
            }
        }
        false
    }
}
