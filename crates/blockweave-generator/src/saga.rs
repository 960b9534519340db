//! Compensating actions for multi-step writes.
//!
//! Steps that leave external state behind (an uploaded archive) record how to
//! undo themselves. If a later step fails the recorded actions run in reverse
//! order; once every step has succeeded the saga is committed and nothing runs.

use tracing::{info, warn};

use crate::archive::ArchiveStore;

/// Undo action for one completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Delete an uploaded archive.
    RemoveArchive(String),
}

/// Recorded compensations of an in-flight operation.
#[derive(Debug, Default)]
pub struct Saga {
    steps: Vec<Compensation>,
}

impl Saga {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn pending(&self) -> &[Compensation] {
        &self.steps
    }

    /// Forget every recorded step.
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Run every recorded step, newest first. Failures are logged and skipped.
    pub async fn compensate(mut self, archives: &ArchiveStore) -> usize {
        let mut undone = 0;
        while let Some(step) = self.steps.pop() {
            match &step {
                Compensation::RemoveArchive(name) => match archives.remove(name).await {
                    Ok(()) => {
                        info!(archive = %name, "removed orphaned archive");
                        undone += 1;
                    }
                    Err(e) => warn!(archive = %name, error = %e, "failed to remove orphaned archive"),
                },
            }
        }
        undone
    }
}
