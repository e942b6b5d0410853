use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use glacier_api::PushEvent;

use super::{ScanInput, Sequencer, SyncMessage};
use crate::backend::TopologySource;
use crate::error::CoreError;
use crate::layout::LayoutEngine;
use crate::model::Topology;
use crate::scan::{ScanEffect, ScanLifecycle};
use crate::store::{GlacierState, TopologyEvent, TopologyStore, reduce};

/// Incrementals kept for re-application over a late snapshot.
const REPLAY_LIMIT: usize = 256;

/// Owner of all state writes.
pub(crate) struct SyncActor {
    store: Arc<TopologyStore>,
    source: Arc<dyn TopologySource>,
    tx: mpsc::Sender<SyncMessage>,
    sequencer: Arc<Sequencer>,
    layout: LayoutEngine,
    debounce: Duration,
    scan: ScanLifecycle,
    state: GlacierState,
    /// Sequence number of the last applied snapshot.
    snapshot_seq: u64,
    replay: VecDeque<(u64, TopologyEvent)>,
    relayout_at: Option<Instant>,
}

impl SyncActor {
    pub(crate) fn new(
        store: Arc<TopologyStore>,
        source: Arc<dyn TopologySource>,
        tx: mpsc::Sender<SyncMessage>,
        sequencer: Arc<Sequencer>,
        layout: LayoutEngine,
        debounce: Duration,
    ) -> Self {
        let state = (*store.snapshot()).clone();
        Self {
            store,
            source,
            tx,
            sequencer,
            layout,
            debounce,
            scan: ScanLifecycle::new(),
            state,
            snapshot_seq: 0,
            replay: VecDeque::new(),
            relayout_at: None,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<SyncMessage>, cancel: CancellationToken) {
        loop {
            let deadline = self.relayout_at;
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = relayout_timer(deadline) => {
                    self.relayout_at = None;
                    self.relayout();
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    self.handle(msg);
                }
            }
        }
        debug!("sync task exiting");
    }

    /// Issue a snapshot fetch. The sequence number is taken now, so a
    /// slow response cannot overwrite a newer push snapshot.
    pub(crate) fn spawn_fetch(&self) {
        let seq = self.sequencer.next();
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        debug!(seq, "fetching topology");

        tokio::spawn(async move {
            let result = source
                .fetch_topology()
                .await
                .map(Topology::from)
                .map_err(CoreError::from);
            let _ = tx.send(SyncMessage::Snapshot { seq, result }).await;
        });
    }

    fn handle(&mut self, msg: SyncMessage) {
        match msg {
            SyncMessage::Snapshot { seq, result } => match result {
                Ok(topology) => self.apply_snapshot(seq, topology),
                Err(e) => self.fetch_failed(&e),
            },
            SyncMessage::Push { seq, event } => self.apply_push(seq, &event),
            SyncMessage::PushState(push) => {
                if self.state.push != push {
                    debug!(?push, "push state changed");
                    self.state.push = push;
                    self.publish();
                }
            }
            SyncMessage::Apply { seq, events } => {
                for event in events {
                    self.apply_incremental(seq, event);
                }
                self.schedule_relayout();
                self.publish();
            }
            SyncMessage::Scan(input) => {
                let effects = match input {
                    ScanInput::Started {
                        scan_id,
                        job_id,
                        message,
                    } => self.scan.on_started(scan_id, job_id, message),
                    ScanInput::Cancelled { message } => self.scan.on_cancelled(message),
                    ScanInput::StaleCleared { message } => self.scan.on_stale_cleared(message),
                };
                self.after_scan(effects);
                self.publish();
            }
            SyncMessage::Notice(message) => {
                self.state.notice = Some(message);
                self.publish();
            }
            SyncMessage::Failure(message) => {
                self.state.error = Some(message);
                self.publish();
            }
            SyncMessage::Dismiss => {
                self.state.error = None;
                self.state.notice = None;
                self.publish();
            }
            SyncMessage::Refetch => self.spawn_fetch(),
            SyncMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────

    fn apply_snapshot(&mut self, seq: u64, topology: Topology) {
        if seq < self.snapshot_seq {
            debug!(
                seq,
                applied = self.snapshot_seq,
                "discarding snapshot older than the one already applied"
            );
            return;
        }
        self.snapshot_seq = seq;

        let mut next = reduce(&self.state, &TopologyEvent::Snapshot(topology));
        self.replay.retain(|(s, _)| *s > seq);
        for (_, event) in &self.replay {
            next = reduce(&next, event);
        }
        if !self.replay.is_empty() {
            debug!(count = self.replay.len(), "re-applied newer updates over snapshot");
        }

        self.state = next;
        self.state.loading = false;

        let effects = self.scan.on_snapshot(&self.state.topology);
        self.after_scan(effects);
        self.schedule_relayout();
        self.publish();
    }

    fn fetch_failed(&mut self, error: &CoreError) {
        warn!(error = %error, "topology fetch failed");
        self.state.error = Some(error.to_string());
        if self.state.loading {
            self.state.loading = false;
            self.scan.on_fetch_failed();
            self.state.scan = self.scan.phase().clone();
        }
        self.publish();
    }

    // ── Incrementals ─────────────────────────────────────────────────

    fn apply_incremental(&mut self, seq: u64, event: TopologyEvent) {
        self.state = reduce(&self.state, &event);
        if event.touches_topology() && !matches!(event, TopologyEvent::PositionsApplied(_)) {
            self.replay.push_back((seq, event));
            if self.replay.len() > REPLAY_LIMIT {
                self.replay.pop_front();
            }
        }
    }

    fn apply_push(&mut self, seq: u64, event: &PushEvent) {
        match event {
            PushEvent::NetworkUpdate(update) => {
                trace!(seq, "network update");
                self.apply_incremental(seq, TopologyEvent::from(update.clone()));
                self.schedule_relayout();
                self.publish();
            }
            PushEvent::DeviceUpdated(record) => {
                trace!(seq, id = %record.id, "device updated elsewhere");
                self.apply_incremental(seq, TopologyEvent::DeviceUpserted(record.clone().into()));
                self.schedule_relayout();
                self.publish();
            }
            PushEvent::TopologyUpdate(payload) => {
                self.apply_snapshot(seq, Topology::from(payload.clone()));
            }
            PushEvent::ScanProgress(progress) => {
                let effects = self.scan.on_progress(progress);
                self.after_scan(effects);
                self.publish();
            }
            PushEvent::Other { event, .. } => trace!(event, "unhandled push event"),
        }
    }

    // ── Scan effects ─────────────────────────────────────────────────

    fn after_scan(&mut self, effects: Vec<ScanEffect>) {
        self.state.scan = self.scan.phase().clone();
        for effect in effects {
            match effect {
                ScanEffect::RefetchTopology => self.spawn_fetch(),
                ScanEffect::Notice(message) => self.state.notice = Some(message),
                ScanEffect::Error(message) => self.state.error = Some(message),
            }
        }
    }

    // ── Layout ───────────────────────────────────────────────────────

    fn schedule_relayout(&mut self) {
        if self.state.topology.needs_layout() {
            self.relayout_at = Some(Instant::now() + self.debounce);
        }
    }

    fn relayout(&mut self) {
        if let Some(positions) = self.layout.compute(&self.state.topology) {
            debug!(nodes = positions.len(), "layout recomputed");
            self.state = reduce(&self.state, &TopologyEvent::PositionsApplied(positions));
            self.publish();
        }
    }

    fn publish(&self) {
        self.store.replace(self.state.clone());
    }
}

async fn relayout_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
