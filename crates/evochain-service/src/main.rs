use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use evochain_api::{DatasetSummary, EvolutionApi, PageQuery, API_CONTRACT_VERSION};
use evochain_core::{Catalog, PageSize};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const DATASET_VERSION_HEADER: &str = "x-dataset-version";
const SERVICE_CONTRACT_HEADER: &str = "x-service-contract-version";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: EvolutionApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    dataset_version: String,
}

#[derive(Debug, Parser)]
#[command(name = "evochain-service")]
#[command(about = "Local HTTP service serving paged evolution chains")]
struct Args {
    /// JSON file holding the precomputed evolution chains.
    #[arg(long, default_value = "./evolutions.json")]
    dataset: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, default_value_t = PageSize::default())]
    page_size: PageSize,
    /// Refuse to start unless the dataset hashes to this `sha256:` version.
    #[arg(long)]
    expect_version: Option<String>,
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, service_contract_version: SERVICE_CONTRACT_VERSION, error: message.into() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/dataset", get(dataset_summary))
        .route("/v1/filters", get(filters))
        .route("/v1/evolutions", get(evolutions))
        .fallback(not_found)
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let api = EvolutionApi::open(&args.dataset, args.page_size, args.expect_version.as_deref())?;
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, "evolution service listening");
    axum::serve(listener, app(ServiceState { api })).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse {
        status: "ok",
        dataset_version: state.api.dataset_info().version.clone(),
    }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn dataset_summary(
    State(state): State<ServiceState>,
) -> Json<ServiceEnvelope<DatasetSummary>> {
    Json(envelope(state.api.summary()))
}

async fn filters(State(state): State<ServiceState>) -> Json<ServiceEnvelope<Catalog>> {
    Json(envelope(state.api.catalog().clone()))
}

/// Bare JSON array of chains, as the feed consumes it. Query parameters never cause an error:
/// each one degrades on its own, and repeated keys keep their first value.
async fn evolutions(
    State(state): State<ServiceState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let query = PageQuery::from_pairs(pairs);
    let chains = state.api.query_page(&query);
    (
        [
            (DATASET_VERSION_HEADER, state.api.dataset_info().version.clone()),
            (SERVICE_CONTRACT_HEADER, SERVICE_CONTRACT_VERSION.to_string()),
        ],
        Json(chains),
    )
}

async fn not_found(uri: Uri) -> ServiceError {
    ServiceError::new(StatusCode::NOT_FOUND, format!("no route for {}", uri.path()))
}
