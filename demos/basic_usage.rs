//! Basic usage example
//!
//! Reads the same endpoint from several tasks at once and prints how the calls were served.
//!
//! Configuration comes from the environment:
//! - CAMPUS_API_URL (required), e.g. http://localhost:8080/api
//! - CAMPUS_API_TOKEN (optional bearer token)
//!
//! Usage:
//!   CAMPUS_API_URL=http://localhost:8080/api RUST_LOG=campus_client=debug cargo run --example basic_usage

use campus_client::{
    ApiFamily, BearerTokenProvider, CacheClient, Params, RequestOptions, StaticOrigin,
    TenantContext,
};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Ok(base_url) = std::env::var("CAMPUS_API_URL") else {
        eprintln!("CAMPUS_API_URL not set");
        return Ok(());
    };
    let token = Arc::new(BearerTokenProvider::default());
    if let Ok(t) = std::env::var("CAMPUS_API_TOKEN") {
        token.set_token(t);
    }

    let client = CacheClient::builder()
        .family(ApiFamily::general())
        .origin_resolver(Arc::new(StaticOrigin::new(base_url)))
        .header_provider(token)
        .build()?;

    let params = Params::new().with("page", 1);
    let options = RequestOptions::new().tenant(TenantContext::new().institute("inst-1"));

    let readers: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            let params = params.clone();
            let options = options.clone();
            tokio::spawn(async move { client.get::<Value>("/classes", Some(&params), &options).await })
        })
        .collect();
    for reader in readers {
        match reader.await? {
            Ok(classes) => println!("classes: {classes}"),
            Err(e) => println!("request failed: {e}"),
        }
    }

    let stats = client.stats();
    println!(
        "dispatches={} joins={} cache hits={} misses={}",
        stats.calls.dispatches, stats.calls.joins, stats.cache.hits, stats.cache.misses
    );
    Ok(())
}
