use crate::collectors::{config::GaugesConfig, registry::Gauges, util::describe_dsn};
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use opentelemetry::{global, propagation::TextMapPropagator as _};
use opentelemetry_http::HeaderExtractor;
use prometheus::{Registry, TextEncoder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, error, info, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use ulid::Ulid;

const SERVER_HEADER: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct AppState {
    gauges: Arc<Gauges>,
    registry: Registry,
}

#[derive(Clone, Copy, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Ulid::new().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Connect, start the gauges and serve `/metrics` and `/health` until a
/// shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the DSN is malformed, the database is unreachable,
/// metrics cannot be registered or the listener cannot be bound.
pub async fn new(
    port: u16,
    listen: Option<String>,
    dsn: SecretString,
    config: GaugesConfig,
) -> Result<()> {
    let connect_options =
        PgConnectOptions::from_str(dsn.expose_secret()).context("invalid PostgreSQL DSN")?;

    info!(database = %describe_dsn(&dsn), "connecting");

    let max_connections = u32::try_from(config.poller_count() + 1).unwrap_or(u32::MAX);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(config.query_timeout)
        .connect_lazy_with(connect_options);

    let gauges = match Gauges::new(pool.clone(), config).await {
        Ok(gauges) => Arc::new(gauges),
        Err(e) => {
            pool.close().await;
            return Err(e);
        }
    };

    let registry = Registry::new();
    gauges.register_metrics(&registry)?;

    let app = router(Arc::clone(&gauges), registry);
    let listener = bind(listen.as_deref(), port).await?;

    info!(addr = %listener.local_addr()?, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    gauges.shutdown().await;
    pool.close().await;

    info!("shutdown complete");

    served
}

/// Build the HTTP router for an already running engine.
#[must_use]
pub fn router(gauges: Arc<Gauges>, registry: Registry) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUlid))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %id,
                otel.kind = "server",
            )
        }))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::SERVER,
            HeaderValue::from_static(SERVER_HEADER),
        ));

    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(layers)
        .with_state(AppState { gauges, registry })
}

async fn bind(listen: Option<&str>, port: u16) -> Result<TcpListener> {
    if let Some(ip) = listen {
        let addr: IpAddr = ip
            .parse()
            .with_context(|| format!("invalid listen address {ip:?}"))?;

        return TcpListener::bind(SocketAddr::new(addr, port))
            .await
            .with_context(|| format!("failed to bind {addr}:{port}"));
    }

    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            debug!(error = %e, "IPv6 bind failed, falling back to IPv4");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
                .await
                .with_context(|| format!("failed to bind 0.0.0.0:{port}"))
        }
    }
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    scrape_span(&headers).in_scope(|| encode(&state.registry))
}

/// Span for one scrape, parented on the caller's W3C trace context if any.
fn scrape_span(headers: &HeaderMap) -> Span {
    let parent =
        global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)));

    let span = info_span!(
        "metrics.scrape",
        otel.kind = "server",
        families = tracing::field::Empty
    );
    if let Err(e) = span.set_parent(parent) {
        debug!(error = ?e, "scrape span not linked to caller trace");
    }

    span
}

fn encode(registry: &Registry) -> Response {
    let families = registry.gather();
    let mut body = String::new();

    match TextEncoder::new().encode_utf8(&families, &mut body) {
        Ok(()) => {
            Span::current().record("families", families.len());
            (
                [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let capabilities = state.gauges.capabilities();

    Json(json!({
        "status": "ok",
        "version": capabilities.version,
        "short_version": capabilities.short_version,
        "query_errors": state.gauges.errors().value(),
        "collectors": state.gauges.families(),
    }))
    .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
