use std::path::PathBuf;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    error::RagError,
    export::{FilterView, QueryReport, SourceView},
    ingest,
    models::{FacetSelection, IndexStats},
    rag::{QueryOutcome, QueryRequest, Stage},
    vector_store::VectorStore,
};

const NO_RESULTS_MESSAGE: &str = "No relevant documents found in the index.";

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct IngestPayload {
    path: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    query: String,
    #[serde(default)]
    doc_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// "Nada relevante" y "respuesta generada" son ambos 200; sólo los fallos
/// del sistema usan códigos de error.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Answered(QueryReport),
    NoResults {
        query: String,
        message: String,
        filters: FilterView,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
    stage: Stage,
    detail: String,
    /// Fuentes recuperadas antes de fallar la generación.
    sources: Vec<SourceView>,
}

#[derive(Debug, Serialize)]
pub struct FacetGroup {
    doc_type: String,
    titles: Vec<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/facets", get(facets_handler))
        .route("/api/index-stats", get(index_stats_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<ErrorBody>)> {
    let facets = FacetSelection::new(payload.doc_type.as_deref(), payload.title.as_deref());
    let request = QueryRequest::new(payload.query.trim(), facets);

    match state.pipeline.run(&request).await {
        Ok(outcome) => Ok(Json(outcome_response(&request, outcome))),
        Err(err) => Err(error_response(&err)),
    }
}

fn outcome_response(request: &QueryRequest, outcome: QueryOutcome) -> QueryResponse {
    match outcome {
        QueryOutcome::Answered { result, predicate } => {
            let filters = FilterView::new(&request.facets, predicate.as_ref());
            QueryResponse::Answered(QueryReport::new(&request.text, filters, &result))
        }
        QueryOutcome::NoRelevantDocuments { predicate } => QueryResponse::NoResults {
            query: request.text.clone(),
            message: NO_RESULTS_MESSAGE.to_string(),
            filters: FilterView::new(&request.facets, predicate.as_ref()),
        },
    }
}

fn error_response(err: &RagError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        RagError::InvalidQuery => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!("Error al procesar la consulta RAG: {err}");
    }
    (
        status,
        Json(ErrorBody {
            error: err.user_message().to_string(),
            stage: err.stage(),
            detail: err.to_string(),
            sources: err.sources().iter().map(SourceView::from).collect(),
        }),
    )
}

#[axum::debug_handler]
async fn facets_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<FacetGroup>>, StatusCode> {
    let catalog = state.store.catalog().await.map_err(|e| {
        error!("Error consultando el catálogo de facetas: {e:#}");
        StatusCode::BAD_GATEWAY
    })?;

    let groups = catalog
        .doc_types()
        .map(|doc_type| FacetGroup {
            doc_type: doc_type.to_string(),
            titles: catalog.titles(doc_type).map(str::to_string).collect(),
        })
        .collect();
    Ok(Json(groups))
}

#[axum::debug_handler]
async fn index_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<IndexStats>, StatusCode> {
    state.store.stats().await.map(Json).map_err(|e| {
        error!("Error en las estadísticas del índice: {e:#}");
        StatusCode::BAD_GATEWAY
    })
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngestPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let root_dir = PathBuf::from(&payload.path);
    if !root_dir.is_dir() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "La ruta proporcionada no es un directorio válido."})),
        ));
    }

    {
        let mut status = state.status.lock().map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Estado de ingesta no disponible."})),
            )
        })?;
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una ingesta en curso."})),
            ));
        }
        status.is_busy = true;
        status.message = "Iniciando indexación...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let result = ingest::ingest_directory(
            &state.store,
            state.embedder.as_ref(),
            &root_dir,
            state.status.clone(),
        )
        .await;

        if let Ok(mut status) = state.status.lock() {
            status.is_busy = false;
            status.progress = 0.0;
            match result {
                Ok(summary) => {
                    status.message = format!("¡Indexación completada! {}", summary);
                }
                Err(err) => {
                    status.message = format!("Error en la indexación: {}", err);
                    error!("Error de ingesta: {}", err);
                }
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state
        .status
        .lock()
        .map(|s| s.clone())
        .unwrap_or_default();
    Json(status)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}
