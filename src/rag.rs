//! Consulta RAG fundamentada sobre el corpus indexado.
//!
//! Flujo por petición (secuencial, sin estado compartido entre consultas):
//!   1. Embedding de la consulta.
//!   2. Catálogo de facetas → predicado de filtrado.
//!   3. Búsqueda vectorial con sobre-consulta.
//!   4. Diversificación por fuente y truncado a `top_k`.
//!   5. Ensamblado del contexto numerado (sin contexto → fin sin generar).
//!   6. Generación restringida al contexto con citas `[Source N]`.
//!
//! Cualquier fallo corta la cadena y se devuelve como `RagError`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::answer::{CompletionBackend, GroundedAnswerer};
use crate::config::RetrievalSettings;
use crate::context::{assemble, AssembledContext};
use crate::diversify::diversify;
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::filter::{build_predicate, FilterPredicate};
use crate::models::{AnswerResult, FacetSelection, Hit};
use crate::retriever::retrieve;
use crate::vector_store::VectorStore;

/// Estados de una petición. `EmptyContext` y `Packaged` son terminales; los
/// fallos llevan a `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Embedding,
    Retrieving,
    Diversifying,
    Assembling,
    EmptyContext,
    Generating,
    Packaged,
    Errored,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Diversifying => "diversifying",
            Self::Assembling => "assembling",
            Self::EmptyContext => "empty_context",
            Self::Generating => "generating",
            Self::Packaged => "packaged",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Consulta de usuario: texto libre y facetas opcionales.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    pub facets: FacetSelection,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, facets: FacetSelection) -> Self {
        Self {
            text: text.into(),
            facets,
        }
    }
}

/// Resultado terminal de una consulta que no falló.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Answered {
        result: AnswerResult,
        predicate: Option<FilterPredicate>,
    },
    NoRelevantDocuments {
        predicate: Option<FilterPredicate>,
    },
}

/// Pipeline con sus colaboradores inyectados. Los clientes son de larga vida
/// y de sólo lectura; cada llamada a `run` posee sus propios datos.
#[derive(Clone)]
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    backend: Arc<dyn CompletionBackend>,
    answerer: Arc<GroundedAnswerer>,
    settings: RetrievalSettings,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn CompletionBackend>,
        answerer: GroundedAnswerer,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            backend,
            answerer: Arc::new(answerer),
            settings,
        }
    }

    /// Ejecuta la consulta completa.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryOutcome, RagError> {
        let result = self.run_stages(request).await;
        match &result {
            Ok(QueryOutcome::Answered { result, .. }) => {
                info!(stage = %Stage::Packaged, sources = result.sources.len(), "Consulta respondida");
            }
            Ok(QueryOutcome::NoRelevantDocuments { .. }) => {
                info!(stage = %Stage::EmptyContext, "Sin documentos relevantes; no se genera respuesta");
            }
            Err(err) => {
                warn!(stage = %Stage::Errored, failed_at = %err.stage(), error = %err, "Consulta fallida");
            }
        }
        result
    }

    async fn run_stages(&self, request: &QueryRequest) -> Result<QueryOutcome, RagError> {
        let query = request.text.trim();
        if query.is_empty() {
            return Err(RagError::InvalidQuery);
        }

        let vector = self.embed(query).await?;
        let predicate = self.predicate(&request.facets).await?;
        let hits = self.retrieve(&vector, predicate.as_ref()).await?;
        let capped = self.diversify(hits);

        let Some(assembled) = self.assemble(capped) else {
            return Ok(QueryOutcome::NoRelevantDocuments { predicate });
        };

        let result = self.generate(assembled, query).await?;
        Ok(QueryOutcome::Answered { result, predicate })
    }

    async fn embed(&self, query: &str) -> Result<Vec<f64>, RagError> {
        debug!(stage = %Stage::Embedding, "Calculando embedding de la consulta");
        self.embedder.embed(query).await.map_err(RagError::Embedding)
    }

    async fn predicate(
        &self,
        facets: &FacetSelection,
    ) -> Result<Option<FilterPredicate>, RagError> {
        if facets.selected_type().is_none() {
            return Ok(None);
        }
        let catalog = self.store.catalog().await.map_err(RagError::Retrieval)?;
        Ok(build_predicate(facets, &catalog))
    }

    async fn retrieve(
        &self,
        vector: &[f64],
        predicate: Option<&FilterPredicate>,
    ) -> Result<Vec<Hit>, RagError> {
        debug!(stage = %Stage::Retrieving, filter = ?predicate.map(|p| p.to_string()), "Buscando pasajes");
        retrieve(self.store.as_ref(), vector, predicate, &self.settings)
            .await
            .map_err(RagError::Retrieval)
    }

    fn diversify(&self, hits: Vec<Hit>) -> Vec<Hit> {
        let raw = hits.len();
        let capped = diversify(hits, self.settings.per_source_cap, self.settings.top_k);
        debug!(stage = %Stage::Diversifying, raw, kept = capped.len(), "Pasajes diversificados");
        capped
    }

    fn assemble(&self, hits: Vec<Hit>) -> Option<AssembledContext> {
        debug!(stage = %Stage::Assembling, hits = hits.len(), "Ensamblando contexto");
        assemble(hits)
    }

    async fn generate(
        &self,
        assembled: AssembledContext,
        query: &str,
    ) -> Result<AnswerResult, RagError> {
        debug!(stage = %Stage::Generating, model = self.backend.model(), "Generando respuesta");
        match self
            .answerer
            .answer(self.backend.as_ref(), &assembled, query)
            .await
        {
            Ok(answer) => Ok(AnswerResult {
                answer,
                sources: assembled.sources,
            }),
            Err(cause) => Err(RagError::Generation {
                sources: assembled.sources,
                cause,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::CitationParser;
    use crate::test_support::{hit_match, FakeCompletion, FakeEmbedder, InMemoryStore};
    use std::collections::HashSet;

    fn pipeline(
        embedder: FakeEmbedder,
        store: Arc<InMemoryStore>,
        backend: Arc<FakeCompletion>,
    ) -> RagPipeline {
        RagPipeline::new(
            Arc::new(embedder),
            store,
            backend,
            GroundedAnswerer::new().unwrap(),
            RetrievalSettings::default(),
        )
    }

    fn kantor_corpus() -> Vec<crate::models::StoreMatch> {
        vec![
            hit_match("c1", "Books", "Interbehavioral Psychology", 0.92),
            hit_match("c2", "Books", "Interbehavioral Psychology", 0.90),
            hit_match("c3", "Books", "Interbehavioral Psychology", 0.89),
            hit_match("c4", "Articles", "The Operational Principle", 0.85),
            hit_match("c5", "Books", "Principles of Psychology", 0.80),
            hit_match("c6", "Articles", "Interbehavioral Analysis", 0.70),
        ]
    }

    #[tokio::test]
    async fn scenario_a_empty_predicate_skips_generation() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying("unused"));
        let rag = pipeline(FakeEmbedder { fail: false }, store.clone(), backend.clone());

        let request = QueryRequest::new(
            "What is interbehavioral psychology?",
            FacetSelection::new(Some("Reviews"), Some("Interbehavioral Psychology")),
        );
        let outcome = rag.run(&request).await.unwrap();

        match outcome {
            QueryOutcome::NoRelevantDocuments { predicate } => {
                assert_eq!(
                    predicate.map(|p| p.to_string()),
                    Some("doc_type = \"Reviews\"".to_string())
                );
            }
            other => panic!("expected NoRelevantDocuments, got {other:?}"),
        }
        assert_eq!(store.query_count(), 1);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn scenario_b_dominant_source_is_capped() {
        let mut corpus = Vec::new();
        for i in 0..15 {
            corpus.push(hit_match(&format!("d{i}"), "Books", "Dominant", 0.99 - i as f64 * 0.001));
        }
        for i in 0..10 {
            corpus.push(hit_match(&format!("o{i}"), "Articles", &format!("Other {i}"), 0.90 - i as f64 * 0.01));
        }
        let store = Arc::new(InMemoryStore::new(corpus));
        let backend = Arc::new(FakeCompletion::replying("See [Source 1]."));
        let rag = pipeline(FakeEmbedder { fail: false }, store.clone(), backend);

        let outcome = rag
            .run(&QueryRequest::new("fields", FacetSelection::default()))
            .await
            .unwrap();

        let QueryOutcome::Answered { result, predicate } = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(predicate, None);
        assert_eq!(store.last_top_k(), Some(25));
        assert_eq!(result.sources.len(), 10);
        assert_eq!(result.sources.iter().filter(|s| s.hit.title == "Dominant").count(), 2);
        let distinct: HashSet<_> = result.sources.iter().map(|s| s.hit.title.as_str()).collect();
        assert!(distinct.len() >= 5);
        let indices: Vec<usize> = result.sources.iter().map(|s| s.index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn scenario_c_answer_cites_assembled_sources() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying(
            "Interbehavioral psychology studies the interaction of organism and stimulus object [Source 1], \
             framed as a field [Source 3].",
        ));
        let rag = pipeline(FakeEmbedder { fail: false }, store, backend.clone());

        let outcome = rag
            .run(&QueryRequest::new("What is interbehavioral psychology?", FacetSelection::default()))
            .await
            .unwrap();

        let QueryOutcome::Answered { result, .. } = outcome else {
            panic!("expected an answer");
        };
        let parser = CitationParser::new().unwrap();
        let cited = parser.cited_indices(&result.answer);
        assert!(!cited.is_empty());
        assert!(parser.unresolved(&result.answer, result.sources.len()).is_empty());
        // c3 queda fuera por el límite de 2 pasajes por fuente.
        let ids: Vec<_> = result.sources.iter().map(|s| s.hit.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c4", "c5", "c6"]);
        assert!(backend.last_user_message().unwrap().contains("[Source 5] Interbehavioral Analysis"));
    }

    #[tokio::test]
    async fn known_title_narrows_to_that_document() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying("[Source 1]"));
        let rag = pipeline(FakeEmbedder { fail: false }, store, backend);

        let request = QueryRequest::new(
            "operationism",
            FacetSelection::new(Some("Articles"), Some("The Operational Principle")),
        );
        let QueryOutcome::Answered { result, predicate } = rag.run(&request).await.unwrap() else {
            panic!("expected an answer");
        };

        assert!(matches!(predicate, Some(FilterPredicate::All(ref terms)) if terms.len() == 2));
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].hit.title, "The Operational Principle");
    }

    #[tokio::test]
    async fn retrieved_sources_are_stable_across_runs() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying("[Source 1]"));
        let rag = pipeline(FakeEmbedder { fail: false }, store, backend);
        let request = QueryRequest::new("fields", FacetSelection::new(Some("Books"), None));

        let ids = |outcome: QueryOutcome| match outcome {
            QueryOutcome::Answered { result, .. } => result
                .sources
                .into_iter()
                .map(|s| s.hit.id)
                .collect::<Vec<_>>(),
            QueryOutcome::NoRelevantDocuments { .. } => Vec::new(),
        };

        let first = ids(rag.run(&request).await.unwrap());
        let second = ids(rag.run(&request).await.unwrap());
        assert_eq!(first, vec!["c1", "c2", "c5"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_retrieval() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying("unused"));
        let rag = pipeline(FakeEmbedder { fail: true }, store.clone(), backend.clone());

        let err = rag
            .run(&QueryRequest::new("fields", FacetSelection::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(store.query_count(), 0);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_is_distinct_from_empty_result() {
        let store = Arc::new(InMemoryStore::failing());
        let backend = Arc::new(FakeCompletion::replying("unused"));
        let rag = pipeline(FakeEmbedder { fail: false }, store, backend.clone());

        let err = rag
            .run(&QueryRequest::new("fields", FacetSelection::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Retrieval(_)));
        assert_eq!(err.stage(), Stage::Retrieving);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn generation_failure_keeps_sources() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::failing());
        let rag = pipeline(FakeEmbedder { fail: false }, store, backend.clone());

        let err = rag
            .run(&QueryRequest::new("fields", FacetSelection::default()))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Generating);
        assert_eq!(err.sources().len(), 5);
        assert_eq!(backend.calls(), 1, "no silent retry");
    }

    #[test]
    fn blank_query_is_rejected() {
        let store = Arc::new(InMemoryStore::new(kantor_corpus()));
        let backend = Arc::new(FakeCompletion::replying("unused"));
        let rag = pipeline(FakeEmbedder { fail: false }, store.clone(), backend);

        let err = tokio_test::block_on(rag.run(&QueryRequest::new("   ", FacetSelection::default())))
            .unwrap_err();

        assert!(matches!(err, RagError::InvalidQuery));
        assert_eq!(store.query_count(), 0);
    }
}
