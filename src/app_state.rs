use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{embedder::Embedder, rag::RagPipeline, vector_store::Neo4jStore};

/// Estado compartido por los handlers. Los clientes externos se crean una vez
/// al arrancar y sólo se leen; las consultas no comparten datos entre sí.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RagPipeline,
    pub store: Neo4jStore,
    pub embedder: Arc<dyn Embedder>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado de la ingesta en segundo plano.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
