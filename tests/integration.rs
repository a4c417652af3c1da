//! Integration tests for the stage system and its error bubbling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use stageweld::prelude::*;

/// Capture a stage's error events on a channel.
fn errors_of<I, O>(stage: &Stage<I, O>) -> mpsc::UnboundedReceiver<Error>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    stage.on_error(move |err| {
        let _ = tx.send(err.clone());
    });
    rx
}

async fn expect_error(rx: &mut mpsc::UnboundedReceiver<Error>) -> Error {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for an error event")
        .expect("error channel closed")
}

/// Give the worker tasks a beat before asserting that nothing happened.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn transform_failures_surface_as_error_events() {
    let stage = map(|n: i32| {
        if n == 2 {
            Err(Error::custom("boom"))
        } else {
            Ok(n * 10)
        }
    });
    let sink = Collector::spawn();
    stage.link_to(&sink);
    let mut errors = errors_of(&stage);

    stage.write(1);
    stage.write(2);
    stage.write(3);
    stage.end();

    let err = expect_error(&mut errors).await;
    assert_eq!(err.to_string(), "boom");
    assert_eq!(sink.collected().await, vec![10, 30]);
    settle().await;
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn passthrough_chain_preserves_order() {
    let first = passthrough::<i32>();
    let second = passthrough::<i32>();
    let sink = Collector::spawn();
    link(&first, &second);
    link(&second, &sink);

    for n in 0..100 {
        first.write(n);
    }
    first.end();

    assert_eq!(sink.collected().await, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn stages_default_to_synchronous_mode() {
    let stage = map(|n: i32| Ok(n));
    assert!(!stage.is_async());

    let marked = map(|n: i32| Ok(n)).set_async();
    assert!(marked.is_async());
}

#[tokio::test]
async fn async_stages_hold_the_slot_until_completion_fires() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let stage = map_async(move |n: i32, done: MapDone<i32>| {
        // The first item takes much longer than the second; only serialized
        // delivery keeps the output in input order.
        let delay = [50u64, 5][counter.fetch_add(1, Ordering::SeqCst) % 2];
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            done.deliver(n);
        });
    });
    assert!(stage.is_async());

    let sink = Collector::spawn();
    stage.link_to(&sink);
    stage.write(1);
    stage.write(2);
    stage.end();

    assert_eq!(sink.collected().await, vec![1, 2]);
}

#[tokio::test]
async fn errors_do_not_bubble_unless_enabled() {
    let upstream = passthrough::<&'static str>();
    let failing = map(|_: &'static str| -> Result<&'static str> { Err(Error::custom("fail")) });
    upstream.link_to(&failing);

    let mut upstream_errors = errors_of(&upstream);
    let mut failing_errors = errors_of(&failing);

    upstream.end_with("while home in new york was champagne and disco");

    let err = expect_error(&mut failing_errors).await;
    assert_eq!(err.to_string(), "fail");
    settle().await;
    assert!(upstream_errors.try_recv().is_err());
}

#[tokio::test]
async fn enabled_bubbling_reemits_on_the_linked_source() {
    let upstream = passthrough::<&'static str>();
    let failing = map(|_: &'static str| -> Result<&'static str> { Err(Error::custom("fail")) })
        .bubble_errors();
    upstream.link_to(&failing);

    let mut upstream_errors = errors_of(&upstream);
    upstream.end_with("hello world");

    let err = expect_error(&mut upstream_errors).await;
    assert_eq!(err.to_string(), "fail");
}

#[tokio::test]
async fn errors_bubble_across_multiple_levels() {
    let origin = passthrough::<&'static str>();
    let one = passthrough::<&'static str>();
    let two = passthrough::<&'static str>().bubble_errors();
    let three = map(|_: &'static str| -> Result<&'static str> { Err(Error::custom("deep error")) })
        .bubble_errors();

    origin.link_to(&one);
    one.link_to(&two);
    two.link_to(&three);

    let mut one_errors = errors_of(&one);
    origin.end_with("tapes from la slash san francisco");

    let err = expect_error(&mut one_errors).await;
    assert_eq!(err.to_string(), "deep error");
}

#[tokio::test]
async fn unlinking_a_source_stops_bubbling() {
    let upstream = passthrough::<i32>();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let failing = map(move |n: i32| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(n)
        } else {
            Err(Error::custom("fail"))
        }
    })
    .bubble_errors();

    upstream.link_to(&failing);
    let mut upstream_errors = errors_of(&upstream);
    let mut failing_errors = errors_of(&failing);

    upstream.write(1);
    settle().await;

    assert!(upstream.unlink_from(&failing));
    failing.end_with(2);

    let err = expect_error(&mut failing_errors).await;
    assert_eq!(err.to_string(), "fail");
    settle().await;
    assert!(upstream_errors.try_recv().is_err());
}

#[tokio::test]
async fn engine_unlink_caused_by_the_error_keeps_the_relay() {
    let upstream = passthrough::<i32>();
    let failing = map(|_: i32| -> Result<i32> { Err(Error::custom("fail")) }).bubble_errors();
    upstream.link_to(&failing);
    let mut upstream_errors = errors_of(&upstream);

    upstream.write(1);
    let err = expect_error(&mut upstream_errors).await;
    assert_eq!(err.to_string(), "fail");

    // The error detached the link, but the relay recorded for the source
    // survived: direct writes still reach the stage and still bubble.
    failing.write(2);
    let err = expect_error(&mut upstream_errors).await;
    assert_eq!(err.to_string(), "fail");
}

#[tokio::test]
async fn enabling_bubbling_twice_registers_one_relay() {
    let upstream = passthrough::<i32>();
    let failing = map(|_: i32| -> Result<i32> { Err(Error::custom("fail")) })
        .bubble_errors()
        .bubble_errors();
    upstream.link_to(&failing);

    let received = Arc::new(AtomicUsize::new(0));
    let count = received.clone();
    upstream.on_error(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    upstream.write(1);
    settle().await;
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn relinking_after_unlink_installs_exactly_one_relay() {
    let upstream = passthrough::<i32>();
    let failing = map(|_: i32| -> Result<i32> { Err(Error::custom("fail")) }).bubble_errors();

    upstream.link_to(&failing);
    assert!(upstream.unlink_from(&failing));
    upstream.link_to(&failing);

    let received = Arc::new(AtomicUsize::new(0));
    let count = received.clone();
    upstream.on_error(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    upstream.write(1);
    settle().await;
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sources_linked_before_enabling_are_not_observed() {
    let upstream = passthrough::<i32>();
    let failing = map(|_: i32| -> Result<i32> { Err(Error::custom("fail")) });
    upstream.link_to(&failing);
    let failing = failing.bubble_errors();

    let mut upstream_errors = errors_of(&upstream);
    let mut failing_errors = errors_of(&failing);

    upstream.write(1);
    let err = expect_error(&mut failing_errors).await;
    assert_eq!(err.to_string(), "fail");
    settle().await;
    assert!(upstream_errors.try_recv().is_err());
}

struct Bare;

#[async_trait]
impl Transform for Bare {
    type Input = ();
    type Output = ();
}

#[tokio::test]
async fn the_default_extension_point_reports_unimplemented() {
    let stage = Stage::spawn(Bare);
    let mut errors = errors_of(&stage);
    stage.end_with(());
    let err = expect_error(&mut errors).await;
    assert!(err.to_string().contains("must be implemented"));
}

#[tokio::test]
async fn map_applies_a_mapper() {
    let stage = map(|line: &'static str| Ok(line.to_uppercase()));
    let sink = Collector::spawn();
    stage.link_to(&sink);

    stage.write("why would you lie about how much coal you have?");
    stage.write("why would you lie about anything at all?");
    stage.end();

    assert_eq!(
        sink.collected().await,
        vec![
            "WHY WOULD YOU LIE ABOUT HOW MUCH COAL YOU HAVE?".to_string(),
            "WHY WOULD YOU LIE ABOUT ANYTHING AT ALL?".to_string(),
        ]
    );
}

#[tokio::test]
async fn map_async_applies_a_mapper() {
    let stage = map_async(|line: &'static str, done: MapDone<String>| {
        tokio::spawn(async move {
            done.deliver(line.to_uppercase());
        });
    });
    let sink = Collector::spawn();
    stage.link_to(&sink);

    stage.write("why would you lie about how much coal you have?");
    stage.write("why would you lie about anything at all?");
    stage.end();

    assert_eq!(
        sink.collected().await,
        vec![
            "WHY WOULD YOU LIE ABOUT HOW MUCH COAL YOU HAVE?".to_string(),
            "WHY WOULD YOU LIE ABOUT ANYTHING AT ALL?".to_string(),
        ]
    );
}

#[tokio::test]
async fn filter_stages_push_zero_or_one_items() {
    let evens = filter(|n: &i32| n % 2 == 0);
    let sink = Collector::spawn();
    evens.link_to(&sink);

    for n in 1..=10 {
        evens.write(n);
    }
    evens.end();

    assert_eq!(sink.collected().await, vec![2, 4, 6, 8, 10]);
}

#[derive(Clone)]
struct Note(&'static str);

impl Invoke for Note {
    type Output = String;

    fn invoke(&self, name: &str) -> Option<String> {
        match name {
            "render" => Some(self.0.to_string()),
            "shout" => Some(self.0.to_uppercase()),
            _ => None,
        }
    }
}

#[tokio::test]
async fn method_stages_call_the_named_method() {
    let stage = method::<Note>("shout");
    let sink = Collector::spawn();
    stage.link_to(&sink);

    stage.end_with(Note("a stranger walked in through the door"));

    assert_eq!(
        sink.collected().await,
        vec!["A STRANGER WALKED IN THROUGH THE DOOR".to_string()]
    );
}

#[tokio::test]
async fn missing_methods_fail_with_a_capability_error() {
    let stage = method::<Note>("fake");
    let mut errors = errors_of(&stage);

    stage.end_with(Note("a stranger walked in through the door"));

    let err = expect_error(&mut errors).await;
    assert!(err.to_string().contains("has no method `fake`"));
}

#[test]
fn stage_handles_are_cloneable() {
    tokio_test::block_on(async {
        let stage = map(|n: i32| Ok(n + 1));
        let clone = stage.clone();
        let sink = Collector::spawn();
        stage.link_to(&sink);

        clone.write(1);
        clone.end();

        assert_eq!(sink.collected().await, vec![2]);
    });
}
