use thiserror::Error;

use crate::models::SourceRecord;
use crate::rag::Stage;

/// Fallos de una consulta. "Nada relevante" no es un error: se representa con
/// `QueryOutcome::NoRelevantDocuments`.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("La consulta está vacía")]
    InvalidQuery,

    #[error("Error generando el embedding de la consulta: {0:#}")]
    Embedding(#[source] anyhow::Error),

    #[error("Error consultando el vector store: {0:#}")]
    Retrieval(#[source] anyhow::Error),

    /// La recuperación tuvo éxito; las fuentes se conservan para mostrarlas.
    #[error("Error generando la respuesta: {cause:#}")]
    Generation {
        sources: Vec<SourceRecord>,
        #[source]
        cause: anyhow::Error,
    },
}

impl RagError {
    /// Etapa del pipeline en la que se produjo el fallo.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidQuery => Stage::Idle,
            Self::Embedding(_) => Stage::Embedding,
            Self::Retrieval(_) => Stage::Retrieving,
            Self::Generation { .. } => Stage::Generating,
        }
    }

    /// Mensaje para el usuario final, sin detalles de infraestructura.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "Please enter a question.",
            Self::Embedding(_) | Self::Retrieval(_) => {
                "Search error: the document index could not be queried. Please try again later."
            }
            Self::Generation { .. } => {
                "The answer could not be generated. The retrieved sources are listed below."
            }
        }
    }

    /// Fuentes recuperadas antes del fallo, si las hay.
    pub fn sources(&self) -> &[SourceRecord] {
        match self {
            Self::Generation { sources, .. } => sources,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn embedding_and_retrieval_share_the_search_message() {
        let embedding = RagError::Embedding(anyhow!("timeout"));
        let retrieval = RagError::Retrieval(anyhow!("auth"));
        assert_eq!(embedding.user_message(), retrieval.user_message());
        assert_eq!(embedding.stage(), Stage::Embedding);
        assert_eq!(retrieval.stage(), Stage::Retrieving);
        assert!(retrieval.sources().is_empty());
    }

    #[test]
    fn display_includes_the_cause_chain() {
        let err = RagError::Retrieval(anyhow!("connection refused").context("neo4j"));
        assert_eq!(
            err.to_string(),
            "Error consultando el vector store: neo4j: connection refused"
        );
    }
}
