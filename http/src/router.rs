use crate::error::AppError;
use axum::{
    extract::State,
    http::header,
    response::{
        Html,
        IntoResponse,
    },
    routing::get,
    Router,
};
use std::{
    future::Future,
    sync::Arc,
};
use teeworlds_exporter_metrics::{
    Aggregator,
    CONTENT_TYPE,
};
use teeworlds_exporter_sources::{
    DirectoryRegistry,
    LiveRegistry,
};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct AppState {
    pub directories: DirectoryRegistry,
    pub econs: LiveRegistry,
    pub aggregator: Arc<Aggregator>,
    /// Path the metrics are served at, always starting with `/`.
    pub endpoint: String,
}

impl AppState {
    pub fn new(directories: DirectoryRegistry, econs: LiveRegistry, endpoint: &str) -> Self {
        let endpoint = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{endpoint}")
        };
        Self {
            directories,
            econs,
            aggregator: Arc::new(Aggregator::default()),
            endpoint,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route(&state.endpoint, get(metrics));
    if state.endpoint != "/healthz" {
        router = router.route("/healthz", get(healthz));
    }
    if state.endpoint != "/" {
        router = router.route("/", get(index));
    }
    router.with_state(state)
}

/// Serves `router` until `shutdown` resolves, then drains open connections.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!("listening on http://{address}");
    }
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let directories = state.directories.snapshot();
    let econs = state.econs.snapshot();
    let body = state.aggregator.render(&directories, &econs)?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Teeworlds Exporter</title></head>\n\
         <body>\n\
         <h1>Teeworlds Exporter</h1>\n\
         <p><a href=\"{endpoint}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        endpoint = state.endpoint
    ))
}

async fn healthz() -> &'static str {
    "OK"
}
