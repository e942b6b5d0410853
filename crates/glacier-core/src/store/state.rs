use std::sync::Arc;

use glacier_api::PushState;

use crate::model::{Device, EntityId, Topology};
use crate::scan::ScanPhase;

/// Everything a consumer observes about the topology module.
#[derive(Debug, Clone)]
pub struct GlacierState {
    pub topology: Arc<Topology>,
    pub scan: ScanPhase,
    /// Single error slot; a new error overwrites the previous one.
    pub error: Option<String>,
    /// Latest transient informational message.
    pub notice: Option<String>,
    /// Push connectivity, a standing condition rather than an error.
    pub push: PushState,
    pub selection: Option<EntityId>,
    /// True until the first snapshot (or its failure) has been processed.
    pub loading: bool,
}

impl Default for GlacierState {
    fn default() -> Self {
        Self {
            topology: Arc::new(Topology::default()),
            scan: ScanPhase::Loading,
            error: None,
            notice: None,
            push: PushState::Disconnected,
            selection: None,
            loading: true,
        }
    }
}

impl GlacierState {
    pub fn selected_device(&self) -> Option<&Device> {
        self.selection.as_ref().and_then(|id| self.topology.device(id))
    }
}
