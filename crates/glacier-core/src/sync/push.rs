use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use glacier_api::PushState;

use super::{Sequencer, SyncMessage};
use crate::backend::PushTransport;

/// Forward push events and connectivity into the sync queue.
///
/// Each event gets its sequence number here, at receipt. A reconnect or
/// a lagged receiver means events were missed, so a fresh snapshot is
/// requested.
pub(crate) async fn forward_push(
    push: Arc<dyn PushTransport>,
    tx: mpsc::Sender<SyncMessage>,
    sequencer: Arc<Sequencer>,
    cancel: CancellationToken,
) {
    let mut events = push.subscribe();
    let mut state = push.state();
    let mut last = *state.borrow_and_update();

    if tx.send(SyncMessage::PushState(last)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    debug!("push state channel closed");
                    let _ = tx.send(SyncMessage::PushState(PushState::Disconnected)).await;
                    break;
                }
                let current = *state.borrow_and_update();
                let reconnected =
                    current.is_connected() && matches!(last, PushState::Reconnecting { .. });
                last = current;

                if tx.send(SyncMessage::PushState(current)).await.is_err() {
                    break;
                }
                if reconnected {
                    info!("push channel reconnected, refreshing topology");
                    let _ = tx.send(SyncMessage::Refetch).await;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let seq = sequencer.next();
                    if tx.send(SyncMessage::Push { seq, event }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push receiver lagged, refreshing topology");
                    let _ = tx.send(SyncMessage::Refetch).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("push event channel closed");
                    break;
                }
            }
        }
    }
}
