//! SharedStateStore – one seqlock region per perception domain.
//!
//! | Domain      | Record              | Writer                      |
//! |-------------|---------------------|-----------------------------|
//! | `position`  | [`PositionRecord`]  | minimap / screen perception |
//! | `path`      | [`PathRecord`]      | pathfinding collaborator    |
//! | `creatures` | [`CreaturesRecord`] | creature perception         |
//! | `battle`    | [`BattleListRecord`]| battle panel perception     |
//! | `rules`     | [`RulesRecord`]     | user-facing rule editor     |
//! | `target`    | [`TargetRecord`]    | target-mark perception      |
//! | `looting`   | [`LootingRecord`]   | looting collaborator        |
//!
//! Each domain is single-writer / many-reader. There is **no** ordering
//! guarantee across domains: a fresh path plan may momentarily describe a
//! position one tick older, so consumers cross-validate
//! (`PathRecord::is_stale_for`) instead of assuming coupled writes.
//!
//! Domains left unconfigured read as absent forever – "no data yet", never a
//! zero-valued record with meaning.
//!
//! The `looting` domain is boundary-only: the looting collaborator publishes
//! its busy flag for out-of-process peers; no loop in this crate reads it.

pub mod records;
pub mod seqlock;

pub use records::{
    decode_name, encode_name, BattleEntryRecord, BattleListRecord, CreatureRecord,
    CreaturesRecord, LootingRecord, PathRecord, PositionRecord, RuleRecord, RulesRecord,
    TargetRecord, MAX_BATTLE_ENTRIES, MAX_CREATURES, MAX_PATH_NODES, MAX_RULES, NAME_CAPACITY,
};
pub use seqlock::{Publisher, Reader, Region};

use crate::error::StoreError;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// One optionally-configured region plus its accessors.
pub struct Domain<T: Copy> {
    name: &'static str,
    region: Option<Arc<Region<T>>>,
}

impl<T: Copy + Send + Default> Domain<T> {
    fn configured(name: &'static str) -> Self {
        Self {
            name,
            region: Some(Region::new(name, T::default())),
        }
    }

    fn absent(name: &'static str) -> Self {
        Self { name, region: None }
    }

    pub fn is_configured(&self) -> bool {
        self.region.is_some()
    }

    /// A fresh reader view. Any number may coexist.
    pub fn reader(&self) -> Reader<T> {
        match &self.region {
            Some(region) => Reader::for_region(Arc::clone(region)),
            None => Reader::detached(self.name),
        }
    }

    /// The single writer handle. Errors when the domain is unconfigured or a
    /// publisher was already handed out – both are startup failures, and the
    /// owning worker must refuse to initialise rather than run degraded.
    pub fn take_publisher(&self) -> Result<Publisher<T>, StoreError> {
        match &self.region {
            Some(region) => region.take_publisher(),
            None => Err(StoreError::Absent(self.name)),
        }
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// All perception domains, allocated once at startup and shared as
/// `Arc<StateStore>`. Workers only ever hold non-owning `Reader`/`Publisher`
/// views; every read is a snapshot copy, never a reference into the region.
pub struct StateStore {
    pub position: Domain<PositionRecord>,
    pub path: Domain<PathRecord>,
    pub creatures: Domain<CreaturesRecord>,
    pub battle: Domain<BattleListRecord>,
    pub rules: Domain<RulesRecord>,
    pub target: Domain<TargetRecord>,
    pub looting: Domain<LootingRecord>,
}

impl StateStore {
    /// Every domain configured – the normal production shape.
    pub fn with_all_domains() -> Arc<Self> {
        Arc::new(Self {
            position: Domain::configured("position"),
            path: Domain::configured("path"),
            creatures: Domain::configured("creatures"),
            battle: Domain::configured("battle"),
            rules: Domain::configured("rules"),
            target: Domain::configured("target"),
            looting: Domain::configured("looting"),
        })
    }

    /// No domains configured; every read is absent. Exists so consumers can
    /// be exercised against the "perception never came up" failure mode.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            position: Domain::absent("position"),
            path: Domain::absent("path"),
            creatures: Domain::absent("creatures"),
            battle: Domain::absent("battle"),
            rules: Domain::absent("rules"),
            target: Domain::absent("target"),
            looting: Domain::absent("looting"),
        })
    }
}
