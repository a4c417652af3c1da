//! Centralized error handling: every interior stage bubbles, so all failures
//! surface at the source that feeds the chain.
//!
//! Run with: cargo run --example bubbling

use std::time::Duration;

use stageweld::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let source = passthrough::<&'static str>();
    let parse = map(|line: &'static str| line.parse::<i64>().map_err(Error::transform))
        .bubble_errors();
    let square = map(|n: i64| Ok(n * n)).bubble_errors();
    let sink = Collector::spawn();

    source.link_to(&parse);
    parse.link_to(&square);
    square.link_to(&sink);

    source.on_error(|err| println!("handled at the source: {err}"));

    source.write("41");
    source.write("not a number");
    source.end();

    // The failure detaches the chain, so give the workers a beat instead of
    // waiting for an end-of-stream that may never be forwarded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("squared before the failure: {:?}", sink.items().lock().await);
    Ok(())
}
