//! Availability of the operator controls

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Runner state the controls depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsState {
    /// A run is in flight
    pub running: bool,
    /// A reference update or another long operation is in flight
    pub processing: bool,
    pub server_stopped: bool,
}

/// Which controls are usable right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    pub run_all: bool,
    pub retry_failed: bool,
    pub accept_opened: bool,
    pub stop_server: bool,
}

impl ControlsState {
    fn busy(&self) -> bool {
        self.running || self.processing || self.server_stopped
    }

    pub fn controls(&self, suite_count: usize, failed_count: usize) -> Controls {
        Controls {
            run_all: suite_count > 0 && !self.busy(),
            retry_failed: failed_count > 0 && !self.busy(),
            accept_opened: failed_count > 0 && !self.busy(),
            stop_server: !self.server_stopped,
        }
    }
}

/// Runner state readable while a run or an update is in flight
#[derive(Debug, Clone, Default)]
pub struct SharedControls {
    state: Arc<Mutex<ControlsState>>,
}

impl SharedControls {
    pub fn snapshot(&self) -> ControlsState {
        *self.state.lock()
    }

    pub fn update(&self, apply: impl FnOnce(&mut ControlsState)) {
        apply(&mut *self.state.lock());
    }

    pub fn controls(&self, suite_count: usize, failed_count: usize) -> Controls {
        self.snapshot().controls(suite_count, failed_count)
    }
}
