//! Two-phase startup gate.
//!
//! The server can only answer once the place catalog is loaded and the
//! postcode lookup client is configured. Both happen independently; the gate
//! opens exactly once, when the second of them is marked.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Catalog,
    Lookup,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    catalog: bool,
    lookup: bool,
}

impl Progress {
    fn complete(&self) -> bool {
        self.catalog && self.lookup
    }
}

#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<Progress>,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Progress::default());
        Self { tx }
    }

    /// Mark a phase done. Marking twice is a no-op.
    pub fn mark(&self, phase: Phase) {
        let opened = self.tx.send_if_modified(|progress| {
            let flag = match phase {
                Phase::Catalog => &mut progress.catalog,
                Phase::Lookup => &mut progress.lookup,
            };
            if *flag {
                return false;
            }
            *flag = true;
            true
        });

        if opened && self.is_ready() {
            info!("All startup phases complete");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().complete()
    }

    /// Resolves once both phases are marked
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(Progress::complete).await;
    }
}
