//! Per-stage signal registries for error and topology events.
//!
//! Each stage privately owns a [`Hub`] holding its error listeners and its
//! link/unlink observers. There is no process-wide registry: a listener is
//! registered on one hub, addressed by the [`ListenerId`] returned at
//! registration, and fires synchronously in registration order on a snapshot
//! of the table taken at emit time.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;

/// Handle to a registered listener, used for selective removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type ErrorFn = Arc<dyn Fn(&Error) + Send + Sync>;
type TopologyFn = Arc<dyn Fn(&SourceRef) + Send + Sync>;

/// The signal surface of one stage: error listeners plus link/unlink
/// observers.
#[derive(Default)]
pub struct Hub {
    errors: Mutex<Vec<(ListenerId, ErrorFn)>>,
    links: Mutex<Vec<(ListenerId, TopologyFn)>>,
    unlinks: Mutex<Vec<(ListenerId, TopologyFn)>>,
    next_id: AtomicU64,
    errored: AtomicBool,
    bubbling: AtomicBool,
}

impl Hub {
    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an error listener.
    pub fn on_error(&self, f: impl Fn(&Error) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.errors.lock().unwrap().push((id, Arc::new(f)));
        id
    }

    /// Remove a previously registered error listener. Returns whether the
    /// listener was still registered.
    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut errors = self.errors.lock().unwrap();
        let before = errors.len();
        errors.retain(|(registered, _)| *registered != id);
        errors.len() != before
    }

    /// Observe new upstream links.
    pub fn on_link(&self, f: impl Fn(&SourceRef) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.links.lock().unwrap().push((id, Arc::new(f)));
        id
    }

    /// Observe upstream unlinks.
    pub fn on_unlink(&self, f: impl Fn(&SourceRef) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.unlinks.lock().unwrap().push((id, Arc::new(f)));
        id
    }

    /// Emit an error event. Dispatch is synchronous; an error that reaches a
    /// hub with no listeners is reported through the log rather than dropped.
    pub fn emit_error(&self, err: &Error) {
        let listeners: Vec<ErrorFn> = {
            let errors = self.errors.lock().unwrap();
            errors.iter().map(|(_, f)| f.clone()).collect()
        };
        if listeners.is_empty() {
            tracing::error!(error = %err, "unhandled stage error");
            return;
        }
        for listener in listeners {
            listener(err);
        }
    }

    /// Announce that `source` is now feeding this stage.
    pub fn emit_link(&self, source: &SourceRef) {
        tracing::debug!(source = ?source, "source linked");
        let observers: Vec<TopologyFn> = {
            let links = self.links.lock().unwrap();
            links.iter().map(|(_, f)| f.clone()).collect()
        };
        for observer in observers {
            observer(source);
        }
    }

    /// Announce that `source` has been detached from this stage.
    pub fn emit_unlink(&self, source: &SourceRef) {
        tracing::debug!(source = ?source, "source unlinked");
        let observers: Vec<TopologyFn> = {
            let unlinks = self.unlinks.lock().unwrap();
            unlinks.iter().map(|(_, f)| f.clone()).collect()
        };
        for observer in observers {
            observer(source);
        }
    }

    /// Whether this stage has ever emitted an error.
    pub fn has_errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_errored(&self) {
        self.errored.store(true, Ordering::SeqCst);
    }

    /// Flip the bubbling flag, returning the previous value.
    pub(crate) fn set_bubbling(&self) -> bool {
        self.bubbling.swap(true, Ordering::SeqCst)
    }

    /// Whether bubbling has been enabled on this stage.
    pub fn is_bubbling(&self) -> bool {
        self.bubbling.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("errored", &self.has_errored())
            .field("bubbling", &self.is_bubbling())
            .finish_non_exhaustive()
    }
}

/// Identity of an upstream source together with its error channel.
///
/// Handed to link/unlink observers; two refs denote the same source exactly
/// when they share the underlying hub.
#[derive(Clone)]
pub struct SourceRef {
    hub: Arc<Hub>,
}

impl SourceRef {
    pub(crate) fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Re-emit an error on this source.
    pub fn emit_error(&self, err: &Error) {
        self.hub.emit_error(err);
    }

    /// Whether `other` refers to the same source.
    pub fn same_source(&self, other: &SourceRef) -> bool {
        Arc::ptr_eq(&self.hub, &other.hub)
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceRef")
            .field(&Arc::as_ptr(&self.hub))
            .finish()
    }
}
