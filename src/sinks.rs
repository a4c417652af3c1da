//! Terminal consumers for linked chains.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch, Mutex as TokioMutex};

use crate::events::Hub;
use crate::link::{Binding, Inlet};
use crate::stage::Feed;

/// A sink that gathers every item it receives.
///
/// Clones share the underlying vector, so a handle kept aside can inspect
/// what a linked chain produced.
pub struct Collector<T> {
    hub: Arc<Hub>,
    intake: mpsc::UnboundedSender<Feed<T>>,
    bindings: Arc<Mutex<Vec<Binding>>>,
    items: Arc<TokioMutex<Vec<T>>>,
    ended: watch::Receiver<bool>,
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            intake: self.intake.clone(),
            bindings: self.bindings.clone(),
            items: self.items.clone(),
            ended: self.ended.clone(),
        }
    }
}

impl<T: Send + 'static> Collector<T> {
    /// Spawn a collector. Must be created inside a Tokio runtime.
    pub fn spawn() -> Self {
        let (intake, mut feed) = mpsc::unbounded_channel::<Feed<T>>();
        let (end_tx, ended) = watch::channel(false);
        let items: Arc<TokioMutex<Vec<T>>> = Arc::new(TokioMutex::new(Vec::new()));

        let sink = items.clone();
        tokio::spawn(async move {
            while let Some(frame) = feed.recv().await {
                match frame {
                    Feed::Item(item) => sink.lock().await.push(item),
                    Feed::End => break,
                }
            }
            let _ = end_tx.send(true);
        });

        Self {
            hub: Arc::new(Hub::default()),
            intake,
            bindings: Arc::new(Mutex::new(Vec::new())),
            items,
            ended,
        }
    }

    /// Shared handle to the gathered items.
    pub fn items(&self) -> Arc<TokioMutex<Vec<T>>> {
        self.items.clone()
    }

    /// Wait for end-of-stream.
    pub async fn wait(&self) {
        let mut ended = self.ended.clone();
        let _ = ended.wait_for(|done| *done).await;
    }

    /// Wait for end-of-stream, then take a snapshot of the items.
    pub async fn collected(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.wait().await;
        self.items.lock().await.clone()
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::spawn()
    }
}

impl<T: Send + 'static> Inlet<T> for Collector<T> {
    fn intake(&self) -> mpsc::UnboundedSender<Feed<T>> {
        self.intake.clone()
    }

    fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    fn bindings(&self) -> &Arc<Mutex<Vec<Binding>>> {
        &self.bindings
    }
}
