//! One-shot turn completion barrier

use crate::turn::TurnResolution;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// Accepts exactly one resolution; later ones are dropped
#[derive(Debug)]
pub struct CompletionBarrier {
    slot: watch::Sender<Option<TurnResolution>>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Returns false if the barrier was already resolved
    pub fn resolve(&self, resolution: TurnResolution) -> bool {
        self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(resolution);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn current(&self) -> Option<TurnResolution> {
        self.slot.borrow().clone()
    }

    /// Wait up to `timeout` for the resolution
    pub async fn wait(&self, timeout: Duration) -> Option<TurnResolution> {
        let mut rx = self.slot.subscribe();
        let resolution = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(resolution)) => resolution.clone(),
            _ => None,
        };
        resolution
    }
}

/// Resolves the barrier as abandoned if dropped before anything else did,
/// so a coordinator that panics or is aborted still releases the waiter
pub(crate) struct ResolveOnDrop {
    barrier: Arc<CompletionBarrier>,
}

impl ResolveOnDrop {
    pub(crate) fn new(barrier: Arc<CompletionBarrier>) -> Self {
        Self { barrier }
    }
}

impl Drop for ResolveOnDrop {
    fn drop(&mut self) {
        if self
            .barrier
            .resolve(TurnResolution::Abandoned("turn coordinator stopped".into()))
        {
            warn!("turn coordinator stopped without resolving the turn");
        }
    }
}
