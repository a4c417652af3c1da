//! Opt-in re-emission of a stage's errors onto its linked upstream sources.
//!
//! Enabling bubbling installs three observers on the stage's hub: one marks
//! the stage as errored on its first error, one registers a relay per newly
//! linked source, and one tears relays down again on explicit unlinks. The
//! relay table remembers which listener was registered for which source, so
//! removal can be narrowed to exactly the entries of the source being
//! detached.

use std::sync::{Arc, Mutex};

use crate::events::{Hub, ListenerId, SourceRef};

struct Relay {
    source: SourceRef,
    listener: ListenerId,
}

/// Install the bubbling observers on `hub`. Idempotent: the first call wins.
pub(crate) fn enable(hub: &Arc<Hub>) {
    if hub.set_bubbling() {
        return;
    }

    let relays: Arc<Mutex<Vec<Relay>>> = Arc::new(Mutex::new(Vec::new()));

    // Track when this stage has had an error. The engine reacts to an error
    // by unlinking the stage's sources; those unlinks must not tear down the
    // relay wiring carrying that same error upstream.
    let weak = Arc::downgrade(hub);
    hub.on_error(move |_| {
        if let Some(hub) = weak.upgrade() {
            hub.mark_errored();
        }
    });

    let weak = Arc::downgrade(hub);
    let table = relays.clone();
    hub.on_link(move |source| {
        let Some(hub) = weak.upgrade() else { return };
        let upstream = source.clone();
        let listener = hub.on_error(move |err| upstream.emit_error(err));
        table.lock().unwrap().push(Relay {
            source: source.clone(),
            listener,
        });
    });

    let weak = Arc::downgrade(hub);
    let table = relays;
    hub.on_unlink(move |source| {
        let Some(hub) = weak.upgrade() else { return };
        if hub.has_errored() {
            return;
        }
        let mut table = table.lock().unwrap();
        table.retain(|relay| {
            if relay.source.same_source(source) {
                hub.remove_error_listener(relay.listener);
                false
            } else {
                true
            }
        });
    });
}
