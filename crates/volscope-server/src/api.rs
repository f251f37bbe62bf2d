use crate::config::ServerConfig;
use crate::exporter::render_prometheus;
use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use volscope_core::{MetricsAggregator, VolumeUsageRecord};

#[derive(Clone)]
pub struct SnapshotApi {
    aggregator: Arc<MetricsAggregator>,
    config: Arc<ServerConfig>,
}

impl SnapshotApi {
    pub fn new(aggregator: Arc<MetricsAggregator>, config: Arc<ServerConfig>) -> Self {
        Self { aggregator, config }
    }

    pub fn router(self: Arc<Self>) -> Router {
        let snapshots = Router::new()
            .route("/api/data", get(data_handler))
            .route("/metrics", get(metrics_handler))
            .layer(middleware::from_fn(crate::security::no_store_middleware));

        let probes = Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler));

        let assets = ServeDir::new(&self.config.static_dir);

        Router::new()
            .merge(snapshots)
            .merge(probes)
            .fallback_service(assets)
            .layer(middleware::from_fn(crate::security::security_headers_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr;
        let router = Arc::new(self).router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Snapshot API listening on {}", addr);

        axum::serve(listener, router.into_make_service()).await?;
        Ok(())
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// Always answers 200; a failed collection is served as an empty array.
async fn data_handler(State(state): State<Arc<SnapshotApi>>) -> Json<Vec<VolumeUsageRecord>> {
    match state.aggregator.collect().await {
        Ok(records) => Json(records),
        Err(e) => {
            tracing::error!(error = %e, "collection failed, serving empty report");
            Json(Vec::new())
        }
    }
}

async fn metrics_handler(State(state): State<Arc<SnapshotApi>>) -> impl IntoResponse {
    let output = match state.aggregator.collect_snapshot().await {
        Ok(snapshot) => render_prometheus(Some(&snapshot)),
        Err(e) => {
            tracing::error!(error = %e, "collection failed, exporting failure gauge only");
            render_prometheus(None)
        }
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        output,
    )
}
