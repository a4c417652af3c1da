//! Basic stage usage: build a chain, write items, collect results.
//!
//! Run with: cargo run --example basic

use stageweld::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Uppercase mapping ===");
    let upper = map(|line: String| Ok(line.to_uppercase()));
    let lines = Collector::spawn();
    upper.link_to(&lines);

    upper.write("why would you lie about how much coal you have?".to_string());
    upper.write("why would you lie about anything at all?".to_string());
    upper.end();

    for line in lines.collected().await {
        println!("{line}");
    }

    println!("\n=== Filter + map chain ===");
    let evens = filter(|n: &i64| n % 2 == 0);
    let tripled = map(|n: i64| Ok(n * 3));
    let numbers = Collector::spawn();
    evens.link_to(&tripled);
    tripled.link_to(&numbers);

    for n in 1..=10 {
        evens.write(n);
    }
    evens.end();
    println!("{:?}", numbers.collected().await);

    println!("\n=== Method invocation ===");
    struct Reading(f64);

    impl Invoke for Reading {
        type Output = String;

        fn invoke(&self, name: &str) -> Option<String> {
            match name {
                "celsius" => Some(format!("{:.1}°C", self.0)),
                "fahrenheit" => Some(format!("{:.1}°F", self.0 * 9.0 / 5.0 + 32.0)),
                _ => None,
            }
        }
    }

    let render = method::<Reading>("fahrenheit");
    let rendered = Collector::spawn();
    render.link_to(&rendered);

    render.write(Reading(21.5));
    render.end_with(Reading(36.6));
    println!("{:?}", rendered.collected().await);

    Ok(())
}
