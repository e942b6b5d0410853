// ── Synchronization layer ──
//
// All inputs (fetch results, push events, command results, selection)
// are messages on one queue. A single task owns the reducer and the scan
// state machine and is the only writer to the `TopologyStore`, so
// concurrent deliveries are processed one at a time.

mod actor;
mod push;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use glacier_api::{PushEvent, PushState};

use crate::error::CoreError;
use crate::model::Topology;
use crate::store::TopologyEvent;

pub(crate) use actor::SyncActor;
pub(crate) use push::forward_push;

/// Monotonic sequence numbers, taken when a request is issued or a push
/// event is received.
#[derive(Debug, Default)]
pub(crate) struct Sequencer(AtomicU64);

impl Sequencer {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Scan acknowledgements routed to the scan state machine.
#[derive(Debug)]
pub(crate) enum ScanInput {
    Started {
        scan_id: Option<String>,
        job_id: Option<String>,
        message: Option<String>,
    },
    Cancelled {
        message: Option<String>,
    },
    StaleCleared {
        message: Option<String>,
    },
}

pub(crate) enum SyncMessage {
    /// A full snapshot fetched by request `seq`.
    Snapshot {
        seq: u64,
        result: Result<Topology, CoreError>,
    },
    /// A push event received as `seq`.
    Push { seq: u64, event: Arc<PushEvent> },
    PushState(PushState),
    /// Incremental changes from a command result or the presentation layer.
    Apply { seq: u64, events: Vec<TopologyEvent> },
    Scan(ScanInput),
    Notice(String),
    Failure(String),
    /// Clear the error and notice slots.
    Dismiss,
    Refetch,
    /// Answered once every earlier message has been handled.
    Flush(oneshot::Sender<()>),
}
