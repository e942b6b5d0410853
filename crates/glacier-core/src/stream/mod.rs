// ── Reactive state streams ──
//
// Subscription types for consuming module state changes.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::GlacierState;

pub use filter::{ViewFilter, visible_devices};

/// A subscription to the module state.
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct StateStream {
    current: Arc<GlacierState>,
    receiver: watch::Receiver<Arc<GlacierState>>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<GlacierState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The state captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Arc<GlacierState> {
        &self.current
    }

    /// The latest state.
    pub fn latest(&self) -> Arc<GlacierState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<GlacierState>> {
        self.receiver.changed().await.ok()?;
        let state = self.receiver.borrow_and_update().clone();
        self.current = state.clone();
        Some(state)
    }

    /// Wait until `predicate` holds, checking the latest state first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&GlacierState) -> bool,
    ) -> Option<Arc<GlacierState>> {
        let state = self.receiver.wait_for(|s| predicate(s)).await.ok()?.clone();
        self.current = state.clone();
        Some(state)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`; yields the current
/// state first, then every change.
pub struct StateWatchStream {
    inner: WatchStream<Arc<GlacierState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<GlacierState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
