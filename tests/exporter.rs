#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
use anyhow::Result;
use pg_gauges::collectors::config::GaugesConfig;
use secrecy::SecretString;
use tokio::task::JoinHandle;

mod common;

fn config() -> GaugesConfig {
    GaugesConfig::default()
        .with_namespace("it")
        .with_default_collectors()
}

/// Start the exporter on a free port, or `None` when no server is reachable
async fn spawn_exporter(listen: Option<&str>) -> Option<(u16, JoinHandle<Result<()>>)> {
    let pool = common::create_test_pool().await?;
    pool.close().await;

    let port = common::get_available_port();
    let dsn = SecretString::from(common::get_test_dsn());
    let listen = listen.map(ToString::to_string);

    let handle =
        tokio::spawn(async move { pg_gauges::exporter::new(port, listen, dsn, config()).await });

    assert!(
        common::wait_for_server(port, 50).await,
        "Server failed to start on port {port}"
    );

    Some((port, handle))
}

async fn scrape_until(port: u16, needle: &str) -> Result<String> {
    let client = reqwest::Client::new();
    let url = format!("{}/metrics", common::get_test_url(port));

    for _ in 0..50 {
        let body = client.get(&url).send().await?.text().await?;
        if body.contains(needle) {
            return Ok(body);
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    panic!("{needle} never appeared in /metrics");
}

#[tokio::test]
async fn test_exporter_database_connection() -> Result<()> {
    let Some(pool) = common::create_test_pool().await else {
        return Ok(());
    };

    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    assert_eq!(row.0, 1);

    pool.close().await;

    Ok(())
}

#[tokio::test]
async fn test_exporter_starts_and_stops() -> Result<()> {
    let Some((port, handle)) = spawn_exporter(None).await else {
        return Ok(());
    };

    handle.abort();

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    let result = tokio::net::TcpStream::connect(format!("127.0.0.1:{port}")).await;
    assert!(result.is_err(), "Server should be stopped");

    Ok(())
}

#[tokio::test]
async fn test_exporter_metrics_endpoint() -> Result<()> {
    let Some((port, handle)) = spawn_exporter(Some("127.0.0.1")).await else {
        return Ok(());
    };

    let response = reqwest::Client::new()
        .get(format!("{}/metrics", common::get_test_url(port)))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(
        response
            .headers()
            .get("server")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("pg_gauges/"))
    );

    let body = response.text().await?;
    assert!(body.contains("it_postgresql_query_errors 0"));
    assert!(body.contains("it_postgresql_version_info"));

    // Family pollers start with the server; their first cycle may still be running.
    let body = scrape_until(port, "postgresql_database_writing_usage{stat=\"tup_inserted\"}").await?;
    assert!(body.contains("tup_updated"));
    assert!(body.contains("tup_deleted"));

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_exporter_health_endpoint() -> Result<()> {
    let Some((port, handle)) = spawn_exporter(Some("127.0.0.1")).await else {
        return Ok(());
    };

    let response = reqwest::Client::new()
        .get(format!("{}/health", common::get_test_url(port)))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    let health: serde_json::Value = serde_json::from_str(&response.text().await?)?;
    assert_eq!(health["status"], "ok");
    assert!(health["version"].as_str().is_some_and(|v| !v.is_empty()));
    assert!(health["query_errors"].as_f64().is_some_and(|v| v.abs() < f64::EPSILON));
    assert!(
        health["collectors"]
            .as_array()
            .is_some_and(|c| c.iter().any(|name| name == "writing_usage"))
    );

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_exporter_bind_to_ipv4_all_interfaces() -> Result<()> {
    let Some((port, handle)) = spawn_exporter(Some("0.0.0.0")).await else {
        return Ok(());
    };

    let result = tokio::net::TcpStream::connect(format!("127.0.0.1:{port}")).await;
    assert!(result.is_ok(), "Should connect via 127.0.0.1");

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_exporter_default_bind_auto_detect() -> Result<()> {
    // None = try [::], fall back to 0.0.0.0; either accepts IPv4 loopback
    let Some((port, handle)) = spawn_exporter(None).await else {
        return Ok(());
    };

    let result = tokio::net::TcpStream::connect(format!("127.0.0.1:{port}")).await;
    assert!(result.is_ok(), "Should connect via 127.0.0.1");

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_exporter_fails_on_unreachable_database() {
    let dsn = SecretString::from("postgresql://nobody@127.0.0.1:1/none".to_string());
    let result = pg_gauges::exporter::new(0, Some("127.0.0.1".to_string()), dsn, config()).await;
    assert!(result.is_err());
}
