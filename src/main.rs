use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use dotenvy::dotenv;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use judged::handlers::judge::{run_endpoint, submit_endpoint};
use judged::handlers::metrics::metrics_endpoint;
use judged::judge::Judge;
use judged::system_monitor;
use judged::types::{AppConfig, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    dotenv().ok();
    let settings = Config::builder()
        .add_source(config::File::with_name("Settings").required(false))
        .add_source(config::Environment::with_prefix("APP"))
        .build()
        .unwrap();

    let app_config: AppConfig = settings.try_deserialize().unwrap();

    // Install global Prometheus recorder and keep the handle for rendering metrics.
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder().unwrap();

    describe_counter!("requests_total", "Judge HTTP requests by endpoint");
    describe_counter!(
        "judge_requests_total",
        "Judge pipeline runs by endpoint and outcome"
    );
    describe_counter!("submissions_total", "Graded submissions by overall verdict");
    describe_histogram!("case_wall_time_ms", "Per-test-case wall time in milliseconds");
    describe_gauge!("workspaces_active", "Workspace directories currently on disk");
    describe_gauge!("system_memory_used_bytes", "Used system memory in bytes");
    describe_gauge!("system_cpu_usage_percent", "System CPU usage in percent");
    describe_gauge!(
        "workspace_disk_free_bytes",
        "Free disk space under the workspace root"
    );

    system_monitor::start_system_monitor(PathBuf::from(&app_config.workspace_root)).await;

    let judge = Arc::new(Judge::new(
        app_config.workspace_root.clone(),
        app_config.judge_settings(),
    ));

    let app = Router::new()
        .route("/run", post(run_endpoint))
        .route("/submit", post(submit_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(AppState {
            judge,
            prometheus_handle: handle.clone(),
        });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", app_config.port))
        .await
        .unwrap();

    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
