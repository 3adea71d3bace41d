//! Lifecycle of a single backup or restore invocation.
//!
//! pending -> running -> succeeded | failed. There is no retry state: a failed
//! operation stays failed and a retry is a new `Operation`.

use std::fmt;
use std::time::Instant;

use log::{debug, info};

use crate::error::{Result, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Backup,
    Restore,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    /// The only legal moves are pending -> running -> terminal.
    pub fn can_advance_to(self, next: OperationState) -> bool {
        matches!(
            (self, next),
            (OperationState::Pending, OperationState::Running)
                | (OperationState::Running, OperationState::Succeeded)
                | (OperationState::Running, OperationState::Failed)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Pending => "pending",
            OperationState::Running => "running",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct Operation {
    kind: OperationKind,
    state: OperationState,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Operation {
            kind,
            state: OperationState::Pending,
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Run `work` once, moving through the states and logging the outcome.
    pub fn run<T>(&mut self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.state != OperationState::Pending {
            return Err(SnapshotError::Usage(format!(
                "{} already {}, start a new one to retry",
                self.kind.as_str(),
                self.state
            )));
        }

        self.advance(OperationState::Running);
        let start = Instant::now();

        let result = work();
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => {
                self.advance(OperationState::Succeeded);
                info!("{} succeeded in {elapsed:.2}s", self.kind.as_str());
            }
            Err(e) => {
                self.advance(OperationState::Failed);
                // the caller prints the diagnostic, this only adds timing
                info!("{} failed after {elapsed:.2}s: {e}", self.kind.as_str());
            }
        }

        result
    }

    fn advance(&mut self, next: OperationState) {
        debug_assert!(self.state.can_advance_to(next), "{} -> {next}", self.state);
        debug!("{}: {} -> {next}", self.kind.as_str(), self.state);
        self.state = next;
    }
}
