//! Explicit linking of upstream sources into downstream consumers.
//!
//! Linking connects an [`Outlet`]'s buffered output to an [`Inlet`]'s intake
//! channel and announces the topology change on the destination's hub. Each
//! link also installs a guard so that an error on the destination detaches
//! its sources, the engine-side reaction that the bubbling overlay's unlink
//! observers must distinguish from an application-initiated unlink.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::events::{Hub, ListenerId, SourceRef};
use crate::stage::{Feed, OutputSlot, Stage};

/// A linkable upstream endpoint: buffered output plus source identity.
pub trait Outlet<T: Send + 'static> {
    fn outlet(&self) -> &Arc<Mutex<OutputSlot<T>>>;
    fn source_ref(&self) -> SourceRef;
}

/// A linkable downstream endpoint: intake channel, signal hub, and the table
/// of currently linked sources.
pub trait Inlet<T: Send + 'static> {
    fn intake(&self) -> mpsc::UnboundedSender<Feed<T>>;
    fn hub(&self) -> &Arc<Hub>;
    fn bindings(&self) -> &Arc<Mutex<Vec<Binding>>>;
}

/// One linked source recorded on a destination.
pub struct Binding {
    source: SourceRef,
    guard: ListenerId,
    disconnect: Box<dyn Fn() + Send + Sync>,
}

/// Link `source` into `dest`.
///
/// Topology observers fire before the data path is connected, so wiring
/// installed by a link observer (such as a bubbling relay) is in place
/// before the first item can fail. Output emitted before the link drains
/// into the destination in order.
pub fn link<T, S, D>(source: &S, dest: &D)
where
    T: Send + 'static,
    S: Outlet<T>,
    D: Inlet<T>,
{
    let src = source.source_ref();

    // An erroring destination is detached from its sources by the engine.
    // The unlink observers this triggers consult the destination's errored
    // flag, which the bubbling overlay sets before this guard runs.
    let guard = {
        let hub = Arc::downgrade(dest.hub());
        let bindings = Arc::downgrade(dest.bindings());
        let src = src.clone();
        dest.hub().on_error(move |_| {
            if let (Some(hub), Some(bindings)) = (hub.upgrade(), bindings.upgrade()) {
                detach(&hub, &bindings, &src);
            }
        })
    };

    let disconnect: Box<dyn Fn() + Send + Sync> = {
        let outlet = Arc::downgrade(source.outlet());
        let intake = dest.intake();
        Box::new(move || {
            if let Some(outlet) = outlet.upgrade() {
                let mut slot = outlet.lock().unwrap();
                if slot.tx.as_ref().is_some_and(|tx| tx.same_channel(&intake)) {
                    slot.tx = None;
                }
            }
        })
    };

    dest.bindings().lock().unwrap().push(Binding {
        source: src.clone(),
        guard,
        disconnect,
    });
    dest.hub().emit_link(&src);

    // Connect the data path and drain anything emitted before the link.
    let intake = dest.intake();
    let mut slot = source.outlet().lock().unwrap();
    while let Some(frame) = slot.pending.pop_front() {
        if intake.send(frame).is_err() {
            return;
        }
    }
    slot.tx = Some(intake);
}

/// Explicitly unlink `source` from `dest`. Returns whether a link existed.
pub fn unlink<T, S, D>(source: &S, dest: &D) -> bool
where
    T: Send + 'static,
    S: Outlet<T>,
    D: Inlet<T>,
{
    detach(dest.hub(), dest.bindings(), &source.source_ref())
}

/// Remove every binding for `src` on the destination: tear the data path,
/// drop the per-link error guard, and announce the unlink once.
fn detach(hub: &Arc<Hub>, bindings: &Arc<Mutex<Vec<Binding>>>, src: &SourceRef) -> bool {
    let removed: Vec<Binding> = {
        let mut table = bindings.lock().unwrap();
        let mut removed = Vec::new();
        let mut i = 0;
        while i < table.len() {
            if table[i].source.same_source(src) {
                removed.push(table.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    };
    if removed.is_empty() {
        return false;
    }
    for binding in &removed {
        (binding.disconnect)();
        hub.remove_error_listener(binding.guard);
    }
    hub.emit_unlink(src);
    true
}

/// Fluent linking on any outlet.
pub trait OutletExt<T: Send + 'static>: Outlet<T> + Sized {
    /// Link this outlet into `dest`.
    fn link_to<D: Inlet<T>>(&self, dest: &D) {
        link(self, dest);
    }

    /// Unlink this outlet from `dest`. Returns whether a link existed.
    fn unlink_from<D: Inlet<T>>(&self, dest: &D) -> bool {
        unlink(self, dest)
    }
}

impl<T: Send + 'static, S: Outlet<T>> OutletExt<T> for S {}

impl<I, O> Outlet<O> for Stage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn outlet(&self) -> &Arc<Mutex<OutputSlot<O>>> {
        self.output_ref()
    }

    fn source_ref(&self) -> SourceRef {
        Stage::source_ref(self)
    }
}

impl<I, O> Inlet<I> for Stage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn intake(&self) -> mpsc::UnboundedSender<Feed<I>> {
        self.intake_sender()
    }

    fn hub(&self) -> &Arc<Hub> {
        self.hub_ref()
    }

    fn bindings(&self) -> &Arc<Mutex<Vec<Binding>>> {
        self.bindings_ref()
    }
}
