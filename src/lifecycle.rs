//! Lifecycle Module
//!
//! Cancellation signal shared by a store handle, its GC loop and the
//! hosting process.
//!
//! `cancel()` drops the only sender of a zero-capacity channel, so every
//! clone of the receiver becomes ready at once and a thread parked in
//! `crossbeam::select!` wakes without polling.
//!
//! Tokens form a tree: cancelling a token cancels every child created from
//! it, while cancelling a child leaves its parent and siblings running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

struct Inner {
    cancelled: AtomicBool,
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            receiver,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sender.lock().take();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cloneable, one-shot cancellation signal
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// A token cancelled together with this one, but cancellable on its own
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();

        let mut children = self.inner.children.lock();
        if self.is_cancelled() {
            drop(children);
            child.cancel();
        } else {
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        child
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Channel that disconnects on cancellation, for use in `select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
