//! Error types for every component boundary.
//!
//! Per-tick failures are non-fatal by design: consumers degrade to an
//! idle/waiting state and try again next tick. Only startup wiring errors
//! (missing region publisher, unreadable route) abort a worker.

use thiserror::Error;

/// Shared-state read/publish failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The domain's region was never configured; readers must treat this as
    /// "no data yet", never as a zero-valued record.
    #[error("shared-state domain '{0}' is not configured")]
    Absent(&'static str),

    /// Seqlock retries exhausted – a writer kept racing the read.
    /// Non-fatal: the consumer skips the domain for this tick.
    #[error("snapshot of '{domain}' still torn after {retries} retries")]
    Contended { domain: &'static str, retries: u32 },

    /// A second publisher was requested for a single-writer domain.
    #[error("publisher for domain '{0}' already taken")]
    PublisherTaken(&'static str),
}

/// Movement-confirmation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmError {
    /// Neither the position nor the path generation advanced in time.
    #[error("no environment response within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The dispatched step itself failed before confirmation could start.
    #[error("step dispatch failed: {0}")]
    Dispatch(String),
}

/// Arbitration-side failures reported to intent producers.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The arbiter task is gone; the agent is shutting down.
    #[error("arbiter channel closed")]
    Closed,

    /// No completion arrived within the caller's own deadline. Requests that
    /// expire by TTL inside the queue are dropped without a completion, so
    /// every awaiting caller needs this guard.
    #[error("no completion for request {id} within {waited_ms}ms")]
    CompletionTimeout { id: u64, waited_ms: u64 },
}

/// Failures raised by the actuation collaborator.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("input injection failed: {0}")]
    Injection(String),

    #[error("target window is gone")]
    WindowLost,
}
