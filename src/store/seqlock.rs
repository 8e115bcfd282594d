//! Seqlock regions – the only shared mutable state in the process.
//!
//! Each domain is one [`Region`]: a single atomic sequence word next to a
//! fixed-layout record. A writer never blocks and never sees a reader; a
//! reader never blocks a writer and detects (then retries past) any overlap
//! with an in-progress write.
//!
//! ## Protocol
//!
//! The sequence word starts at 0 ("never published"). A publish bumps it to
//! odd, volatile-writes the whole record, then bumps it to even. The even
//! word divided by two is the domain's **generation counter**: it advances by
//! exactly one per publish and is what consumers compare to detect fresh data
//! (and what the movement-confirmation protocol watches).
//!
//! A reader loads the word (`c0`), volatile-copies the record, and loads the
//! word again (`c1`). The copy is consistent iff `c0` is even and
//! `c0 == c1`. Retries are bounded; exhaustion is reported as
//! [`StoreError::Contended`] and treated by consumers as "no new data this
//! tick" rather than ever blocking.

use crate::error::StoreError;
use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Read retries before a tick gives up on a contended domain.
pub const READ_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// One seqlock-protected record. Allocated once by the process that owns the
/// store; every worker holds a non-owning view (`Publisher` or `Reader`).
pub struct Region<T> {
    name: &'static str,
    seq: AtomicU64,
    data: UnsafeCell<T>,
    publisher_taken: AtomicBool,
}

// SAFETY: `data` is only written through the single `Publisher` (enforced by
// `publisher_taken`) and only read through the volatile seqlock protocol,
// which detects and discards every torn copy.
unsafe impl<T: Copy + Send> Send for Region<T> {}
unsafe impl<T: Copy + Send> Sync for Region<T> {}

impl<T: Copy> Region<T> {
    pub fn new(name: &'static str, initial: T) -> Arc<Self> {
        Arc::new(Self {
            name,
            seq: AtomicU64::new(0),
            data: UnsafeCell::new(initial),
            publisher_taken: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Committed publish count. 0 until the first publish completes; an
    /// in-progress write does not advance it.
    pub fn generation(&self) -> u64 {
        self.seq.load(Ordering::Acquire) / 2
    }

    /// Hand out the single writer handle. Second call is a startup error.
    pub fn take_publisher(self: &Arc<Self>) -> Result<Publisher<T>, StoreError> {
        if self.publisher_taken.swap(true, Ordering::SeqCst) {
            return Err(StoreError::PublisherTaken(self.name));
        }
        Ok(Publisher {
            region: Arc::clone(self),
        })
    }

    fn try_snapshot(&self) -> Result<(u64, T), StoreError> {
        for _ in 0..READ_RETRIES {
            let c0 = self.seq.load(Ordering::Acquire);
            if c0 == 0 {
                // Never published – not contention, just no data yet.
                return Err(StoreError::Absent(self.name));
            }
            if c0 & 1 != 0 {
                // Write in progress.
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: volatile copy of a `Copy` record; consistency is decided
            // by the sequence comparison below, never by the copy itself.
            let copy = unsafe { std::ptr::read_volatile(self.data.get()) };
            // Order the data copy before the second sequence load.
            fence(Ordering::Acquire);
            let c1 = self.seq.load(Ordering::Relaxed);
            if c0 == c1 {
                return Ok((c0 / 2, copy));
            }
        }
        Err(StoreError::Contended {
            domain: self.name,
            retries: READ_RETRIES,
        })
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Single-writer handle for one domain. Deliberately not `Clone`.
pub struct Publisher<T: Copy> {
    region: Arc<Region<T>>,
}

impl<T: Copy> Publisher<T> {
    /// Publish a whole record. Wholesale only – partial field updates would
    /// defeat the torn-read detection.
    pub fn publish(&mut self, record: T) {
        let region = &*self.region;
        let seq = region.seq.load(Ordering::Relaxed);
        // Odd: write in progress. Readers spin past this.
        region.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: sole writer (publisher handle is unique); readers discard
        // anything copied while the sequence word is odd or unstable.
        unsafe { std::ptr::write_volatile(region.data.get(), record) };
        // Even again: record committed, generation advanced by one.
        region.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.region.generation()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Many-reader view of one domain. Tracks the last generation this reader
/// consumed so [`Reader::poll`] only yields genuinely fresh records.
pub struct Reader<T: Copy> {
    region: Option<Arc<Region<T>>>,
    name: &'static str,
    last_seen: u64,
}

impl<T: Copy> Reader<T> {
    pub(crate) fn for_region(region: Arc<Region<T>>) -> Self {
        Self {
            name: region.name,
            region: Some(region),
            last_seen: 0,
        }
    }

    /// Reader for an unconfigured domain: every read is absent.
    pub(crate) fn detached(name: &'static str) -> Self {
        Self {
            region: None,
            name,
            last_seen: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current generation counter, 0 when absent or never published.
    pub fn generation(&self) -> u64 {
        self.region.as_ref().map(|r| r.generation()).unwrap_or(0)
    }

    /// Fresh snapshot, only if the generation advanced since the last `poll`.
    pub fn poll(&mut self) -> Option<T> {
        let region = self.region.as_ref()?;
        match region.try_snapshot() {
            Ok((gen, data)) if gen > self.last_seen => {
                self.last_seen = gen;
                Some(data)
            }
            Ok(_) => None,
            Err(StoreError::Absent(_)) => None,
            Err(err) => {
                tracing::debug!(domain = self.name, %err, "seqlock read contended");
                None
            }
        }
    }

    /// Newest committed snapshot regardless of freshness. `None` when the
    /// domain is absent, never published, or contended this tick.
    pub fn latest(&self) -> Option<T> {
        let region = self.region.as_ref()?;
        match region.try_snapshot() {
            Ok((_, data)) => Some(data),
            Err(StoreError::Absent(_)) => None,
            Err(err) => {
                tracing::debug!(domain = self.name, %err, "seqlock read contended");
                None
            }
        }
    }
}
