use anyhow::Context as _;
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use relay_flow::Graph;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::llm::{CompletionService, RigCompletionService};
use crate::models::{
    ExtractQuery, ExtractionRequest, MetricExtraction, ResultEnvelope, TranslationRequest,
    TranslationResponse, UploadedDocument,
};
use crate::pdf::{LopdfReader, PdfReader};
use crate::prompt::Category;
use crate::translation::{MarianTranslator, Translator};
use crate::workflow::{
    build_extraction_workflow, build_translation_workflow, run_metric_extraction, run_translation,
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Multipart field carrying the uploaded report
const FILE_FIELD: &str = "file";

type ApiResult<T> = Result<Json<T>, ServiceError>;

#[derive(Clone)]
pub struct AppState {
    pub extraction_graph: Arc<Graph>,
    pub translation_graph: Arc<Graph>,
    pub translator: Arc<dyn Translator>,
}

impl AppState {
    pub fn new(
        pdf_reader: Arc<dyn PdfReader>,
        llm: Arc<dyn CompletionService>,
        llm_timeout: Duration,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            extraction_graph: Arc::new(build_extraction_workflow(pdf_reader, llm, llm_timeout)),
            translation_graph: Arc::new(build_translation_workflow(translator.clone())),
            translator,
        }
    }
}

/// Wire the production collaborators from configuration and build the router.
pub async fn create_app(config: &AppConfig) -> anyhow::Result<Router> {
    let llm = RigCompletionService::new(
        config.llm.provider,
        &config.llm.api_key,
        config.llm.model.clone(),
        config.llm.temperature,
    );
    info!(provider = %config.llm.provider, model = %config.llm.model, "LLM client configured");

    let translation = config.translation.clone();
    let translator = tokio::task::spawn_blocking(move || {
        MarianTranslator::load(
            &translation.models_dir,
            &translation.languages,
            translation.intra_threads,
        )
    })
    .await
    .context("loading translation models")?;
    if translator.supported_languages().is_empty() {
        warn!("No translation models loaded; every translate request will be rejected");
    }

    let state = AppState::new(
        Arc::new(LopdfReader),
        Arc::new(llm),
        config.llm.timeout,
        Arc::new(translator),
    );

    Ok(build_router(state, &config.cors_origins, config.max_upload_bytes))
}

pub fn build_router(state: AppState, cors_origins: &[String], max_upload_bytes: usize) -> Router {
    let routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/extract-health-metrics", post(extract_health_metrics))
        .route("/translate", post(translate));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Tags every request with a fresh correlation id and runs it inside a span carrying it
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.tag()).collect();

    Json(json!({
        "service": "Lab Report Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Health metric extraction from PDF lab reports and result translation",
        "categories": categories,
        "languages": state.translator.supported_languages(),
        "endpoints": {
            "POST /extract-health-metrics?type=<category>": "Extract health metrics from a PDF upload (field 'file')",
            "POST /translate": "Translate insights, recommendations and risk",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn extract_health_metrics(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ResultEnvelope<MetricExtraction>> {
    let category = query
        .category
        .unwrap_or_else(|| Category::default().tag().to_string());

    let multipart = multipart.map_err(|e| ServiceError::InvalidPayload(e.body_text()))?;
    let document = read_upload(multipart).await?;

    info!(
        category = %category,
        filename = document.as_ref().map(|d| d.filename.as_str()),
        bytes = document.as_ref().map(|d| d.bytes.len()),
        "Received health metric extraction request"
    );

    let extraction = run_metric_extraction(
        &state.extraction_graph,
        ExtractionRequest { document, category },
    )
    .await?;

    Ok(Json(ResultEnvelope::ok(extraction)))
}

/// Pull the `file` field out of the form; other fields are drained and ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedDocument>, ServiceError> {
    let mut document = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(FILE_FIELD) || document.is_some() {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;

        document = Some(UploadedDocument {
            filename,
            bytes: Arc::from(bytes.as_ref()),
        });
    }

    Ok(document)
}

/// Body-limit overruns surface as a 413 multipart error while streaming the form
fn multipart_error(e: MultipartError) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %e.body_text(), "Upload exceeds the body limit");
        ServiceError::PayloadTooLarge
    } else {
        ServiceError::InvalidPayload(e.body_text())
    }
}

async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslationRequest>, JsonRejection>,
) -> ApiResult<TranslationResponse> {
    let Json(request) = payload.map_err(|e| ServiceError::InvalidPayload(e.body_text()))?;

    info!(
        lang = %request.lang_code,
        insights = request.insights.len(),
        recommendations = request.recommendations.len(),
        "Received translation request"
    );

    let response = run_translation(&state.translation_graph, request).await?;
    Ok(Json(response))
}
