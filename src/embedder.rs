//! Generación de embeddings. El pipeline sólo conoce el trait `Embedder`;
//! la implementación de producción usa los modelos de embeddings de Rig.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::embeddings::EmbeddingModel as _;

use crate::config::AppConfig;

/// Convierte texto en vectores de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensión de los vectores producidos (debe coincidir con el índice).
    fn dimensions(&self) -> usize;

    /// Calcula embeddings para una lista de textos, en el mismo orden.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la query"))?;
        check_dimensions(&vector, self.dimensions())?;
        Ok(vector)
    }
}

/// Un vector vacío o de otra dimensión produciría similitudes sin sentido.
pub fn check_dimensions(vector: &[f64], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(anyhow!(
            "Embedding de dimensión {} (se esperaba {})",
            vector.len(),
            expected
        ));
    }
    Ok(())
}

/// Embeddings de OpenAI a través de Rig. El cliente se crea una vez y se reutiliza.
#[derive(Clone)]
pub struct RigEmbedder {
    client: rig::providers::openai::Client,
    model: String,
    dimensions: usize,
}

impl RigEmbedder {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};

        let model = if cfg.llm_embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL.to_string()
        } else {
            cfg.llm_embedding_model.clone()
        };

        Ok(Self {
            client: openai::Client::new(&cfg.openai_api_key),
            model,
            dimensions: cfg.embedding_dimensions,
        })
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_model = self.client.embedding_model(&self.model);
        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        embeddings
            .into_iter()
            .map(|e| {
                check_dimensions(&e.vec, self.dimensions)?;
                Ok(e.vec)
            })
            .collect()
    }
}
