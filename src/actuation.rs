//! Actuation boundary – the keyboard/mouse primitives the arbiter dispatches.
//!
//! The real implementation (display-server injection, window handles) lives
//! outside this crate. Implementations must be synchronous, must not retry,
//! and must report failure instead of swallowing it – the arbiter converts
//! every failure into a `success: false` completion.

use crate::error::ActuationError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Closed set of physical primitives. Intent producers build these; nothing
/// else ever crosses the actuation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "primitive")]
pub enum ActuationCall {
    SendKey { key: u32, modifier: Option<u32> },
    KeyDown { key: u32 },
    KeyUp { key: u32 },
    LeftClick { x: i32, y: i32 },
    RightClick { x: i32, y: i32 },
    MouseMove { x: i32, y: i32 },
    TypeText { lines: Vec<String>, wrap_with_enter: bool },
}

impl ActuationCall {
    /// Mouse primitives get a randomized settle move after dispatch so the
    /// pointer never rests on the clicked spot.
    pub fn is_mouse(&self) -> bool {
        matches!(
            self,
            Self::LeftClick { .. } | Self::RightClick { .. } | Self::MouseMove { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Boundary trait
// ---------------------------------------------------------------------------

pub trait Actuator: Send {
    fn perform(&mut self, call: &ActuationCall) -> Result<(), ActuationError>;
}

// ---------------------------------------------------------------------------
// Null / recording implementations
// ---------------------------------------------------------------------------

/// Logs every primitive instead of injecting it. Default for dry runs.
#[derive(Debug, Default)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn perform(&mut self, call: &ActuationCall) -> Result<(), ActuationError> {
        tracing::debug!(?call, "actuation (null)");
        Ok(())
    }
}

/// Captures every primitive for inspection; used by the integration tests.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuationCall>>>,
    fail_all: Arc<Mutex<bool>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuationCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Make every subsequent `perform` fail, for dispatch-error paths.
    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock() = fail;
    }
}

impl Actuator for RecordingActuator {
    fn perform(&mut self, call: &ActuationCall) -> Result<(), ActuationError> {
        self.calls.lock().push(call.clone());
        if *self.fail_all.lock() {
            return Err(ActuationError::Injection("scripted failure".into()));
        }
        Ok(())
    }
}
