// Módulos de la aplicación
mod answer;
mod api;
mod app_state;
mod citations;
mod config;
mod context;
mod diversify;
mod embedder;
mod error;
mod export;
mod filter;
mod ingest;
mod llm;
mod models;
mod neo4j_client;
mod rag;
mod retriever;
mod vector_store;

#[cfg(test)]
mod test_support;

use crate::answer::GroundedAnswerer;
use crate::app_state::{AppState, Status};
use crate::embedder::{Embedder, RigEmbedder};
use crate::llm::RigCompletion;
use crate::rag::RagPipeline;
use crate::vector_store::Neo4jStore;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Conectar a Neo4j y asegurar esquemas
    let graph = neo4j_client::connect_from_config(&cfg)
        .await
        .context("Error conectando a Neo4j")?;
    neo4j_client::ensure_schema(&graph)
        .await
        .context("Error asegurando el esquema de Neo4j")?;
    neo4j_client::ensure_vector_index(&graph, &cfg.vector_index_name, cfg.embedding_dimensions)
        .await
        .context("Error asegurando el índice vectorial")?;
    let store = Neo4jStore::new(Arc::new(graph), cfg.vector_index_name.clone(), cfg.embedding_dimensions);

    // 4. Inicializar clientes de embeddings y chat (una única vez)
    let embedder: Arc<dyn Embedder> = Arc::new(
        RigEmbedder::from_config(&cfg).context("Error inicializando el cliente de embeddings")?,
    );
    let completion = RigCompletion::from_config(&cfg).context("Error inicializando el cliente LLM")?;
    let pipeline = RagPipeline::new(
        embedder.clone(),
        Arc::new(store.clone()),
        Arc::new(completion),
        GroundedAnswerer::new()?,
        cfg.retrieval.clone(),
    );
    info!(
        provider = ?cfg.llm_provider,
        chat_model = %cfg.llm_chat_model,
        top_k = cfg.retrieval.top_k,
        per_source_cap = cfg.retrieval.per_source_cap,
        fetch = cfg.retrieval.fetch_count(),
        "Pipeline RAG inicializado"
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        pipeline,
        store,
        embedder,
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = cfg.server_addr.clone();
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
