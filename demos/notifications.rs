//! Notifications example: render retry and connection notices.
//!
//! Points the client at a port nothing listens on, so every call fails with
//! a connection problem, and prints what a UI would show.
//!
//! Run with: `cargo run --example notifications`

use std::time::Duration;
use steadfast::{Client, ClientEvent, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), steadfast::Error> {
    tracing_subscriber::fmt()
        .with_env_filter("steadfast=info")
        .init();

    let client = Client::builder()
        .base_url("http://127.0.0.1:9")?
        .timeout(Duration::from_secs(2))
        .retry_policy(RetryPolicy::default().base_delay(Duration::from_millis(200)))
        .build()?;

    let mut events = client.subscribe();
    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::ConnectionError(e) => {
                    println!("[banner] {} ({})", e.message, e.kind);
                }
                ClientEvent::RetryAttempted(e) => {
                    println!(
                        "[toast] retrying {} {} in {:?} ({}/{})",
                        e.method, e.path, e.delay, e.attempt, e.max_attempts
                    );
                }
            }
        }
    });

    if let Err(e) = client.get::<serde_json::Value>("/api/events").await {
        println!("call failed: {}", e);
        println!("kind: {:?}, retryable: {}", e.kind(), e.is_retryable());
    }

    drop(client);
    let _ = listener.await;
    Ok(())
}
