// ── Topology Data Store ──
//
// `state` is the observable module state, `reducer` the pure transition
// function, `topology_store` the watch channel holding the current value.

mod reducer;
mod state;
mod topology_store;

pub use reducer::{TopologyEvent, reduce};
pub use state::GlacierState;
pub use topology_store::TopologyStore;
