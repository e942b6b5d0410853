use std::sync::Arc;

use tokio::sync::watch;

use super::GlacierState;
use crate::stream::StateStream;

/// Holds the current module state and notifies subscribers on change.
///
/// Reads are wait-free clones of an `Arc`. Only the sync task writes,
/// always by replacing the whole value.
pub struct TopologyStore {
    state: watch::Sender<Arc<GlacierState>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(GlacierState::default()));
        Self { state }
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<GlacierState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateStream {
        StateStream::new(self.state.subscribe())
    }

    pub(crate) fn replace(&self, next: GlacierState) {
        self.state.send_replace(Arc::new(next));
    }
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}
