//! Rate limiting on the intake endpoints.

mod common;

use common::TestServer;
use serde_json::Value;

#[tokio::test]
async fn create_returns_rate_headers() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let resp = server.create_report("203.0.113.10", "Pothole").await?;
    assert_eq!(resp.status(), 201);

    let headers = resp.headers();
    assert_eq!(headers["x-ratelimit-limit"], "5");
    assert_eq!(headers["x-ratelimit-remaining"], "4");
    let reset: i64 = headers["x-ratelimit-reset"].to_str()?.parse()?;
    assert!(reset > chrono::Utc::now().timestamp());
    assert!(headers.get("retry-after").is_none());
    Ok(())
}

#[tokio::test]
async fn sixth_create_in_window_is_rejected() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    for i in 0..5 {
        let resp = server.create_report("203.0.113.11", "Pothole").await?;
        assert_eq!(resp.status(), 201, "request {i} should be admitted");
    }

    let resp = server.create_report("203.0.113.11", "Pothole").await?;
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp.headers()["retry-after"].to_str()?.parse()?;
    assert!((1..=60).contains(&retry_after));
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");

    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "rate limit exceeded");
    Ok(())
}

#[tokio::test]
async fn clients_have_separate_budgets() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    for _ in 0..5 {
        server.create_report("203.0.113.12", "Pothole").await?;
    }
    assert_eq!(
        server.create_report("203.0.113.12", "Pothole").await?.status(),
        429
    );

    let other = server.create_report("198.51.100.7", "Pothole").await?;
    assert_eq!(other.status(), 201);
    assert_eq!(other.headers()["x-ratelimit-remaining"], "4");
    Ok(())
}

#[tokio::test]
async fn forwarded_chain_uses_first_hop() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    for _ in 0..5 {
        server
            .create_report("203.0.113.13, 10.0.0.1", "Pothole")
            .await?;
    }
    // Different proxy, same originating client.
    let resp = server
        .create_report("203.0.113.13, 10.9.9.9", "Pothole")
        .await?;
    assert_eq!(resp.status(), 429);
    Ok(())
}

#[tokio::test]
async fn evidence_budget_is_independent_of_create() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let client = "203.0.113.14";

    let (id, token) = server.create_ok(client).await?;
    let token = token.ok_or_else(|| anyhow::anyhow!("no token"))?;

    for _ in 0..3 {
        let resp = server.attach_evidence(client, &id, Some(&token)).await?;
        assert_eq!(resp.status(), 201);
    }
    let resp = server.attach_evidence(client, &id, Some(&token)).await?;
    assert_eq!(resp.status(), 429);

    // One create used so far, four left.
    let resp = server.create_report(client, "Pothole").await?;
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "3");
    Ok(())
}

#[tokio::test]
async fn rejected_bodies_still_count_against_budget() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    for _ in 0..5 {
        let resp = server.create_report("203.0.113.15", "   ").await?;
        assert_eq!(resp.status(), 400);
    }
    let resp = server.create_report("203.0.113.15", "Pothole").await?;
    assert_eq!(resp.status(), 429);
    Ok(())
}
