//! medscan - medication label identification and reconciliation server.

mod cache;
mod config;
mod error;
mod extract;
mod lexicon;
mod pipeline;
mod recognition;
mod reconcile;
mod resolver;
mod schema;
mod selector;
mod sources;
mod variants;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache::MedicationCache;
use config::ScanConfig;
use error::ScanError;
use extract::CandidateExtractor;
use pipeline::ScanPipeline;
use recognition::RecognitionEngine;
use reconcile::Reconciler;
use resolver::SourceResolver;
use schema::{ReconciledRecord, ScanResponse};
use sources::{
    fallback::FallbackSource, medlineplus::MedlinePlusSource, ndc::NdcDirectorySource,
    openfda::OpenFdaSource, rxnorm::RxNormSource, MedicationSource,
};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<ScanPipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medscan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ScanConfig::from_env();
    info!("config: {:?}", config);

    // One shared HTTP client for every source adapter.
    let client = reqwest::Client::new();

    let sources: Vec<Arc<dyn MedicationSource>> = vec![
        Arc::new(OpenFdaSource::new(client.clone())),
        Arc::new(RxNormSource::new(client.clone())),
        Arc::new(NdcDirectorySource::new(client.clone())),
        Arc::new(MedlinePlusSource::new(client.clone())),
    ];
    info!("{} authoritative sources registered", sources.len());

    let fallback: Option<Arc<dyn MedicationSource>> =
        match FallbackSource::from_env(client, &config.fallback_model) {
            Ok(source) => {
                info!("generative fallback enabled (model {})", config.fallback_model);
                Some(Arc::new(source))
            }
            Err(e) => {
                warn!("generative fallback disabled: {}", e);
                None
            }
        };

    let resolver = SourceResolver::new(
        MedicationCache::new(config.cache_ttl),
        sources,
        Reconciler::new(fallback, config.source_timeout),
        config.source_timeout,
    );
    let pipeline = ScanPipeline::new(
        RecognitionEngine::tesseract(),
        CandidateExtractor::new(config.max_candidates),
        Arc::new(resolver),
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/scan", post(scan_image))
        .route("/medications/{name}", get(lookup_medication))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server listening on http://0.0.0.0:3000");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upload a label/box photo and get the identified medications back.
async fn scan_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    let mut image_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("image") {
            image_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read image: {}", e)))?
                .to_vec();
            break;
        }
    }

    if image_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No image uploaded".to_string()));
    }

    info!("received image ({} bytes)", image_data.len());

    let response = state.pipeline.scan(&image_data).await.map_err(|e| {
        error!("scan failed: {}", e);
        match e {
            ScanError::Preprocessing(_) | ScanError::RecognitionExhausted { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
        }
    })?;

    info!(
        "scan {} complete: {} medications",
        response.scan_id,
        response.medications.len()
    );
    Ok(Json(response))
}

/// Resolve one medication name directly, without an image.
async fn lookup_medication(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ReconciledRecord>, StatusCode> {
    state
        .pipeline
        .lookup(&name)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
