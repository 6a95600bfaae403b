//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + recuperación).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Groq,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "groq" => Ok(Self::Groq),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Modelo de chat por defecto de cada proveedor.
    pub fn default_chat_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Groq => "llama-3.3-70b-versatile",
        }
    }
}

/// Parámetros del pipeline de recuperación. Son superficie de configuración,
/// no constantes ocultas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalSettings {
    /// Número final de pasajes mostrados y enviados al LLM.
    pub top_k: usize,
    /// Máximo de pasajes admitidos por documento fuente.
    pub per_source_cap: usize,
    /// Multiplicador de `top_k` para la sobre-consulta al vector store.
    pub overfetch_factor: usize,
    /// Techo absoluto de la sobre-consulta.
    pub overfetch_ceiling: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            per_source_cap: 2,
            overfetch_factor: 3,
            overfetch_ceiling: 25,
        }
    }
}

impl RetrievalSettings {
    /// Número de resultados a pedir al vector store.
    pub fn fetch_count(&self) -> usize {
        self.top_k
            .saturating_mul(self.overfetch_factor)
            .min(self.overfetch_ceiling)
            .max(self.top_k)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 || self.per_source_cap == 0 || self.overfetch_factor == 0 {
            bail!("RAG_TOP_K, RAG_PER_SOURCE_CAP y RAG_OVERFETCH_FACTOR deben ser >= 1");
        }
        if self.overfetch_ceiling < self.top_k {
            bail!(
                "RAG_OVERFETCH_CEILING ({}) no puede ser menor que RAG_TOP_K ({})",
                self.overfetch_ceiling,
                self.top_k
            );
        }
        Ok(())
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub openai_api_key: String,
    pub groq_api_key: Option<String>,

    pub vector_index_name: String,
    pub embedding_dimensions: usize,
    pub retrieval: RetrievalSettings,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let neo4j_uri = env::var("NEO4J_URI")
            .map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?;
        let neo4j_user = env::var("NEO4J_USER")
            .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?;
        let neo4j_password = env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model = env::var("LLM_CHAT_MODEL")
            .unwrap_or_else(|_| llm_provider.default_chat_model().to_string());

        // Los embeddings siempre se calculan con OpenAI, sea cual sea el proveedor de chat.
        let openai_api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("Falta OPENAI_API_KEY en el entorno"))?;
        let groq_api_key = env::var("GROQ_API_KEY").ok();
        if llm_provider == LlmProvider::Groq && groq_api_key.is_none() {
            bail!("LLM_PROVIDER=groq requiere GROQ_API_KEY en el entorno");
        }

        let vector_index_name = env::var("VECTOR_INDEX_NAME")
            .unwrap_or_else(|_| "chunkEmbeddingIndex".to_string());
        let embedding_dimensions = parse_env_or("EMBEDDING_DIMENSIONS", 1536)?;

        let defaults = RetrievalSettings::default();
        let retrieval = RetrievalSettings {
            top_k: parse_env_or("RAG_TOP_K", defaults.top_k)?,
            per_source_cap: parse_env_or("RAG_PER_SOURCE_CAP", defaults.per_source_cap)?,
            overfetch_factor: parse_env_or("RAG_OVERFETCH_FACTOR", defaults.overfetch_factor)?,
            overfetch_ceiling: parse_env_or("RAG_OVERFETCH_CEILING", defaults.overfetch_ceiling)?,
        };
        retrieval.validate()?;
        if embedding_dimensions == 0 {
            bail!("EMBEDDING_DIMENSIONS debe ser >= 1");
        }

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            openai_api_key,
            groq_api_key,
            vector_index_name,
            embedding_dimensions,
            retrieval,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
