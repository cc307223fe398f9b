//! Basic example: configure a client from JSON settings and make calls.
//!
//! This example shows how to:
//! - Build a client from a deserialized `ClientConfig`
//! - Make GET and POST requests
//! - Inspect the classification of a failed call
//!
//! Run with: `cargo run --example basic_call`

use serde::{Deserialize, Serialize};
use steadfast::{Client, ClientBuilder, ClientConfig, Error};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("steadfast=debug,basic_call=info")
        .init();

    let config: ClientConfig = serde_json::from_str(
        r#"{
            "base_url": "https://jsonplaceholder.typicode.com",
            "timeout_ms": 10000,
            "api_prefix": "/api",
            "retry": { "max_attempts": 3, "base_delay_ms": 500 }
        }"#,
    )?;
    let client: Client = ClientBuilder::from_config(&config)?.build()?;

    println!("=== GET ===");
    let response = client.get::<Post>("/posts/1").await?;
    println!("#{} {}", response.id, response.title);
    println!("latency: {:?}, attempts: {}", response.latency, response.attempts);

    println!("=== POST ===");
    let new_post = NewPost {
        title: "Hello".to_string(),
        body: "First post".to_string(),
        user_id: 1,
    };
    let created = client.post::<_, Post>("/posts", &new_post).await?;
    println!("created #{} ({})", created.id, created.status);

    println!("=== Classified failure ===");
    match client.get::<Post>("/posts/999999").await {
        Ok(response) => println!("unexpected success: {:?}", response.data),
        Err(Error::Rejected {
            classified,
            attempts,
            ..
        }) => {
            println!("kind: {}", classified.kind);
            println!("status: {:?}", classified.status);
            println!("message: {}", classified.message);
            println!("attempts: {}", attempts);
        }
        Err(e) => println!("other error: {}", e),
    }

    Ok(())
}
