//! Simulated morning at a news portal.
//!
//! A burst of login attempts from one client runs into the login policy
//! while readers generate views; a background task keeps the trending box
//! fresh.
//!
//! Run with: `RUST_LOG=newsdesk=debug cargo run --example newsroom`

use newsdesk::{
    derive_client_identity, InMemoryRankStore, InMemoryViewLog, RankerConfig, RateLimitConfig,
    RateLimiter, SystemClock, TrendingRanker, LOGIN,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Throttling
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default())?);
    let (sweeper, stop_sweeper) = limiter.clone().start_cleanup_thread()?;

    let headers = [("X-Forwarded-For", "203.0.113.77, 10.0.0.3")];
    let identity = derive_client_identity(&headers);

    for attempt in 1..=7 {
        let result = limiter.check_named(&identity, LOGIN)?;
        if result.allowed {
            println!("login attempt {attempt}: allowed ({} left)", result.remaining);
        } else {
            println!(
                "login attempt {attempt}: 429, retry after {}s",
                result.retry_after_secs.unwrap_or(1)
            );
        }
    }
    if let Some(metrics) = limiter.metrics(LOGIN) {
        println!("{metrics}");
    }

    // Trending
    let clock = Arc::new(SystemClock);
    let log = Arc::new(InMemoryViewLog::new(clock.clone()));
    let store = Arc::new(InMemoryRankStore::new());

    log.add_lifetime_views("how-to-vote", 12_000);
    log.add_lifetime_views("tax-guide", 8_500);

    let ranker = Arc::new(TrendingRanker::with_clock(
        log.clone(),
        store.clone(),
        RankerConfig::default().with_k(3),
        clock,
    )?);
    let (refresher, stop_refresher) = ranker.clone().start_refresh_task(Duration::from_millis(200));

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("before the news breaks: {:?}", store.leaderboard());

    for (slug, views) in [("storm-landfall", 40), ("election-night", 25), ("match-report", 5)] {
        for _ in 0..views {
            log.record(slug);
        }
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("after the news breaks:  {:?}", store.leaderboard());
    println!("served on demand:       {:?}", ranker.trending(2).await);

    let _ = stop_refresher.send(());
    refresher.await?;
    let _ = stop_sweeper.send(());
    let _ = sweeper.join();

    println!("{:?}", ranker.stats());
    println!("{}", limiter.stats());
    Ok(())
}
