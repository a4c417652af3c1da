//! The base object-mode transform stage.
//!
//! A [`Stage`] drives one item at a time through a user-supplied [`Transform`]
//! and converts transform failures into stage-local error events instead of
//! panics or silently dropped items. Stages default to synchronous
//! completion: the stage settles the per-item [`Completion`] from the
//! transform's returned `Result`. A stage switched to async mode via
//! [`Stage::set_async`] hands the completion to the transform instead, which
//! must settle it exactly once, typically from a spawned task or timer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::bubble;
use crate::error::{Error, Result};
use crate::events::{Hub, ListenerId, SourceRef};
use crate::link::Binding;

/// A frame on a stage's input: one item, or end of stream.
#[derive(Debug)]
pub enum Feed<T> {
    Item(T),
    End,
}

/// One-shot continuation a stage fires to signal that item processing is
/// finished.
///
/// Cloneable so asynchronous transforms can carry it into spawned work; only
/// the first [`resolve`](Completion::resolve) or [`fail`](Completion::fail)
/// takes effect, so a synchronous failure out of an async setup path cannot
/// double-settle the slot.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Option<oneshot::Sender<Option<Error>>>>>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Option<Error>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Signal success: the stage may take the next item.
    pub fn resolve(&self) {
        self.settle(None);
    }

    /// Signal failure: `err` becomes the stage's error event.
    pub fn fail(&self, err: Error) {
        self.settle(Some(err));
    }

    fn settle(&self, outcome: Option<Error>) {
        if let Some(tx) = self.slot.lock().unwrap().take() {
            let _ = tx.send(outcome);
        }
    }
}

/// A stage's buffered output: frames emitted while no consumer is linked
/// queue up here and drain into the consumer's intake on link.
pub struct OutputSlot<T> {
    pub(crate) pending: VecDeque<Feed<T>>,
    pub(crate) tx: Option<mpsc::UnboundedSender<Feed<T>>>,
}

impl<T> Default for OutputSlot<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            tx: None,
        }
    }
}

/// Downstream push handle given to transforms.
pub struct Emitter<T> {
    slot: Arc<Mutex<OutputSlot<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(slot: Arc<Mutex<OutputSlot<T>>>) -> Self {
        Self { slot }
    }

    /// Push one output item downstream.
    pub fn push(&self, item: T) {
        self.send(Feed::Item(item));
    }

    pub(crate) fn close(&self) {
        self.send(Feed::End);
    }

    fn send(&self, frame: Feed<T>) {
        let mut slot = self.slot.lock().unwrap();
        match &slot.tx {
            Some(tx) => {
                if let Err(returned) = tx.send(frame) {
                    // Consumer went away; keep the frame for a future link.
                    slot.tx = None;
                    slot.pending.push_back(returned.0);
                }
            }
            None => slot.pending.push_back(frame),
        }
    }
}

/// The per-item extension point of a stage.
///
/// Implementations push zero, one, or more outputs per input through `out`;
/// a filtering stage pushes zero or one. In the default synchronous mode the
/// stage settles `done` from the returned `Result` and `done` can be ignored.
/// In async mode the implementation owns `done`: clone it into whatever
/// finishes the work and settle it exactly once.
///
/// ```rust
/// use async_trait::async_trait;
/// use stageweld::prelude::*;
///
/// struct Double;
///
/// #[async_trait]
/// impl Transform for Double {
///     type Input = i64;
///     type Output = i64;
///
///     async fn transform(
///         &mut self,
///         item: i64,
///         out: &Emitter<i64>,
///         _done: &Completion,
///     ) -> Result<()> {
///         out.push(item * 2);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transform: Send + 'static {
    /// The type of items this stage accepts
    type Input: Send + 'static;
    /// The type of items this stage produces
    type Output: Send + 'static;

    /// Transform one item. The default implementation fails: concrete stages
    /// must supply their own.
    async fn transform(
        &mut self,
        item: Self::Input,
        out: &Emitter<Self::Output>,
        done: &Completion,
    ) -> Result<()> {
        let _ = (item, out, done);
        Err(Error::Unimplemented("Transform::transform"))
    }

    /// Called once when the input ends, before end-of-stream is forwarded.
    async fn flush(&mut self, out: &Emitter<Self::Output>) -> Result<()> {
        let _ = out;
        Ok(())
    }
}

/// Handle to a running object-mode transform stage.
///
/// A `Stage` is a cheap clone over shared state; the transform itself runs on
/// a dedicated worker task that takes items strictly one at a time. Must be
/// created inside a Tokio runtime.
pub struct Stage<I, O> {
    hub: Arc<Hub>,
    intake: mpsc::UnboundedSender<Feed<I>>,
    output: Arc<Mutex<OutputSlot<O>>>,
    bindings: Arc<Mutex<Vec<Binding>>>,
    async_mode: Arc<AtomicBool>,
}

impl<I, O> Clone for Stage<I, O> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            intake: self.intake.clone(),
            output: self.output.clone(),
            bindings: self.bindings.clone(),
            async_mode: self.async_mode.clone(),
        }
    }
}

impl<I, O> Stage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawn a stage around `transform`.
    pub fn spawn<T>(transform: T) -> Self
    where
        T: Transform<Input = I, Output = O>,
    {
        let (intake, feed) = mpsc::unbounded_channel();
        let hub = Arc::new(Hub::default());
        let output = Arc::new(Mutex::new(OutputSlot::default()));
        let async_mode = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            transform,
            feed,
            out: Emitter::new(output.clone()),
            hub: hub.clone(),
            async_mode: async_mode.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            hub,
            intake,
            output,
            bindings: Arc::new(Mutex::new(Vec::new())),
            async_mode,
        }
    }

    /// Switch the stage to asynchronous completion.
    ///
    /// Only meaningful before the first item is written; flipping the mode
    /// mid-stream is unsupported.
    pub fn set_async(self) -> Self {
        self.async_mode.store(true, Ordering::SeqCst);
        self
    }

    /// Whether the stage is in async mode.
    pub fn is_async(&self) -> bool {
        self.async_mode.load(Ordering::SeqCst)
    }

    /// Re-emit this stage's errors on every upstream source linked from now
    /// on, so a chain's failures can be handled in one place.
    ///
    /// Idempotent. Sources linked before the first call are not observed.
    pub fn bubble_errors(self) -> Self {
        bubble::enable(&self.hub);
        self
    }

    /// Register an error listener; fires synchronously for every error event
    /// on this stage.
    pub fn on_error(&self, f: impl Fn(&Error) + Send + Sync + 'static) -> ListenerId {
        self.hub.on_error(f)
    }

    /// Remove a previously registered error listener.
    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.hub.remove_error_listener(id)
    }

    /// Queue one item for processing.
    pub fn write(&self, item: I) {
        let _ = self.intake.send(Feed::Item(item));
    }

    /// Signal end of input; flushes the transform and forwards end-of-stream
    /// to the linked consumer.
    pub fn end(&self) {
        let _ = self.intake.send(Feed::End);
    }

    /// Write a final item, then end.
    pub fn end_with(&self, item: I) {
        self.write(item);
        self.end();
    }

    /// This stage's identity as an upstream source.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(self.hub.clone())
    }

    pub(crate) fn intake_sender(&self) -> mpsc::UnboundedSender<Feed<I>> {
        self.intake.clone()
    }

    pub(crate) fn hub_ref(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub(crate) fn output_ref(&self) -> &Arc<Mutex<OutputSlot<O>>> {
        &self.output
    }

    pub(crate) fn bindings_ref(&self) -> &Arc<Mutex<Vec<Binding>>> {
        &self.bindings
    }
}

/// The engine loop behind one stage: serialized item delivery, completion
/// tracking, error emission.
struct Worker<T: Transform> {
    transform: T,
    feed: mpsc::UnboundedReceiver<Feed<T::Input>>,
    out: Emitter<T::Output>,
    hub: Arc<Hub>,
    async_mode: Arc<AtomicBool>,
}

impl<T: Transform> Worker<T> {
    async fn run(mut self) {
        while let Some(frame) = self.feed.recv().await {
            match frame {
                Feed::Item(item) => {
                    let (done, settled) = Completion::channel();
                    self.process_item(item, &done).await;
                    drop(done);
                    match settled.await {
                        Ok(None) => {}
                        Ok(Some(err)) => self.hub.emit_error(&err),
                        Err(_) => {
                            tracing::warn!(
                                "completion dropped without being fired; skipping item"
                            );
                        }
                    }
                }
                Feed::End => {
                    if let Err(err) = self.transform.flush(&self.out).await {
                        self.hub.emit_error(&err);
                    }
                    self.out.close();
                    break;
                }
            }
        }
    }

    /// Drive one item through the transform, settling `done` on its behalf
    /// in sync mode. A synchronous `Err` out of an async-mode transform is
    /// still forwarded; the one-shot slot absorbs the case where the
    /// transform already settled.
    async fn process_item(&mut self, item: T::Input, done: &Completion) {
        let async_mode = self.async_mode.load(Ordering::SeqCst);
        match self.transform.transform(item, &self.out, done).await {
            Ok(()) if async_mode => {}
            Ok(()) => done.resolve(),
            Err(err) => done.fail(err),
        }
    }
}
