//! Ready-made stage constructors.
//!
//! These are thin specializations of the base [`Stage`]: each one supplies a
//! [`Transform`] and, for the asynchronous variant, flips the stage's mode
//! flag at construction time.

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::stage::{Completion, Emitter, Stage, Transform};

/// Build a stage applying `f` to every item, pushing each result downstream.
/// A failed `f` becomes the stage's error event.
pub fn map<I, O, F>(f: F) -> Stage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Result<O> + Send + 'static,
{
    Stage::spawn(MapTransform {
        f,
        _marker: PhantomData,
    })
}

struct MapTransform<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, I, O> Transform for MapTransform<F, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Result<O> + Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn transform(&mut self, item: I, out: &Emitter<O>, _done: &Completion) -> Result<()> {
        out.push((self.f)(item)?);
        Ok(())
    }
}

/// Delivery handle for [`map_async`] stages: settles the item by pushing the
/// mapped value, skipping it, or failing the stage.
pub struct MapDone<O> {
    out: Emitter<O>,
    done: Completion,
}

impl<O: Send + 'static> MapDone<O> {
    /// Push the mapped value downstream and request the next item.
    pub fn deliver(self, value: O) {
        self.out.push(value);
        self.done.resolve();
    }

    /// Drop the item without output and request the next one.
    pub fn skip(self) {
        self.done.resolve();
    }

    /// Fail the item; `err` becomes the stage's error event.
    pub fn abort(self, err: Error) {
        self.done.fail(err);
    }
}

/// Build an asynchronous mapping stage.
///
/// `f` receives each item plus a [`MapDone`] handle and must eventually
/// settle it, typically from a spawned task or timer. The returned stage is
/// already in async mode.
pub fn map_async<I, O, F>(f: F) -> Stage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I, MapDone<O>) + Send + 'static,
{
    Stage::spawn(AsyncMapTransform {
        f,
        _marker: PhantomData,
    })
    .set_async()
}

struct AsyncMapTransform<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, I, O> Transform for AsyncMapTransform<F, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I, MapDone<O>) + Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn transform(&mut self, item: I, out: &Emitter<O>, done: &Completion) -> Result<()> {
        (self.f)(
            item,
            MapDone {
                out: out.clone(),
                done: done.clone(),
            },
        );
        Ok(())
    }
}

/// Build a stage forwarding only the items that satisfy `pred`.
pub fn filter<T, F>(pred: F) -> Stage<T, T>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send + 'static,
{
    Stage::spawn(FilterTransform {
        pred,
        _marker: PhantomData,
    })
}

struct FilterTransform<F, T> {
    pred: F,
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<F, T> Transform for FilterTransform<F, T>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn transform(&mut self, item: T, out: &Emitter<T>, _done: &Completion) -> Result<()> {
        if (self.pred)(&item) {
            out.push(item);
        }
        Ok(())
    }
}

/// Build an identity stage.
pub fn passthrough<T: Send + 'static>() -> Stage<T, T> {
    Stage::spawn(PassThrough {
        _marker: PhantomData,
    })
}

struct PassThrough<T> {
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<T: Send + 'static> Transform for PassThrough<T> {
    type Input = T;
    type Output = T;

    async fn transform(&mut self, item: T, out: &Emitter<T>, _done: &Completion) -> Result<()> {
        out.push(item);
        Ok(())
    }
}

/// Named zero-argument method dispatch for [`method`] stages.
pub trait Invoke {
    /// The type returned by every invocable method
    type Output;

    /// Invoke `name` on this item, or `None` when the item has no such
    /// method.
    fn invoke(&self, name: &str) -> Option<Self::Output>;
}

/// Build a stage that calls the named method on every incoming item and
/// pushes the return value. An item lacking the method fails the stage with
/// a "has no method" error.
pub fn method<T>(name: impl Into<String>) -> Stage<T, T::Output>
where
    T: Invoke + Send + 'static,
    T::Output: Send + 'static,
{
    Stage::spawn(MethodTransform {
        name: name.into(),
        _marker: PhantomData,
    })
}

struct MethodTransform<T> {
    name: String,
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<T> Transform for MethodTransform<T>
where
    T: Invoke + Send + 'static,
    T::Output: Send + 'static,
{
    type Input = T;
    type Output = <T as Invoke>::Output;

    async fn transform(
        &mut self,
        item: T,
        out: &Emitter<<T as Invoke>::Output>,
        _done: &Completion,
    ) -> Result<()> {
        match item.invoke(&self.name) {
            Some(value) => {
                out.push(value);
                Ok(())
            }
            None => Err(Error::no_such_method(
                std::any::type_name::<T>(),
                &self.name,
            )),
        }
    }
}
