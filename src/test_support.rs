//! Dobles de prueba en memoria para los colaboradores externos del pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::answer::CompletionBackend;
use crate::embedder::Embedder;
use crate::filter::{FilterPredicate, MetadataField};
use crate::models::{FacetCatalog, Hit, IndexStats, StoreMatch};
use crate::vector_store::VectorStore;

pub const TEST_DIMENSIONS: usize = 4;

/// Evalúa un predicado contra un par (tipo, título), como haría el `WHERE`
/// que genera `FilterPredicate::to_cypher`.
pub fn predicate_matches(predicate: &FilterPredicate, doc_type: &str, title: &str) -> bool {
    match predicate {
        FilterPredicate::Equals { field: MetadataField::DocType, value } => value == doc_type,
        FilterPredicate::Equals { field: MetadataField::Title, value } => value == title,
        FilterPredicate::All(terms) => terms.iter().all(|t| predicate_matches(t, doc_type, title)),
    }
}

/// Coincidencia con metadatos canónicos y un texto derivado del id. Cada
/// título corresponde a un documento distinto.
pub fn hit_match(id: &str, doc_type: &str, title: &str, score: f64) -> StoreMatch {
    hit_match_in_source(id, &format!("doc:{title}"), doc_type, title, score)
}

/// Como `hit_match`, pero con la identidad de documento explícita.
pub fn hit_match_in_source(
    id: &str,
    source_id: &str,
    doc_type: &str,
    title: &str,
    score: f64,
) -> StoreMatch {
    let metadata: HashMap<String, Value> = [
        ("text", format!("Passage {id} from {title}.")),
        ("source_id", source_id.to_string()),
        ("title", title.to_string()),
        ("filename", format!("{title}.pdf")),
        ("doc_type", doc_type.to_string()),
        ("page", "1".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Value::String(v)))
    .collect();

    StoreMatch {
        id: id.to_string(),
        score,
        metadata,
    }
}

pub fn hit(id: &str, title: &str, score: f64) -> Hit {
    Hit::from_match(hit_match(id, "Books", title, score))
}

pub fn hit_in_source(id: &str, source_id: &str, title: &str, score: f64) -> Hit {
    Hit::from_match(hit_match_in_source(id, source_id, "Books", title, score))
}

/// Embedder determinista: la dimensión es fija y el vector depende sólo del texto.
pub struct FakeEmbedder {
    pub fail: bool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if self.fail {
            return Err(anyhow!("embedding backend unavailable"));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let len = t.len() as f64;
                vec![len, len / 2.0, 1.0, 0.0]
            })
            .collect())
    }
}

/// Vector store en memoria con corpus congelado.
pub struct InMemoryStore {
    matches: Vec<StoreMatch>,
    fail: bool,
    last_top_k: Mutex<Option<usize>>,
    queries: AtomicUsize,
}

impl InMemoryStore {
    pub fn new(matches: Vec<StoreMatch>) -> Self {
        Self {
            matches,
            fail: false,
            last_top_k: Mutex::new(None),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn last_top_k(&self) -> Option<usize> {
        *self.last_top_k.lock().unwrap()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn query(
        &self,
        _vector: &[f64],
        predicate: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<StoreMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_top_k.lock().unwrap() = Some(top_k);
        if self.fail {
            return Err(anyhow!("connection refused"));
        }

        let mut selected: Vec<StoreMatch> = self
            .matches
            .iter()
            .filter(|m| {
                let hit = Hit::from_match((*m).clone());
                predicate.map_or(true, |p| predicate_matches(p, &hit.doc_type, &hit.title))
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.score.total_cmp(&a.score));
        selected.truncate(top_k);
        Ok(selected)
    }

    async fn catalog(&self) -> Result<FacetCatalog> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        Ok(self
            .matches
            .iter()
            .map(|m| {
                let hit = Hit::from_match(m.clone());
                (hit.doc_type, hit.title)
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let catalog = self.catalog().await?;
        let documents = catalog
            .doc_types()
            .map(|t| catalog.titles(t).count())
            .sum::<usize>();
        Ok(IndexStats {
            documents: documents as i64,
            chunks: self.matches.len() as i64,
            doc_types: catalog.doc_types().count() as i64,
            dimensions: TEST_DIMENSIONS,
        })
    }
}

/// Backend de chat que responde citando las fuentes del prompt, o falla.
pub struct FakeCompletion {
    reply: Option<String>,
    calls: AtomicUsize,
    last_user_message: Mutex<Option<String>>,
}

impl FakeCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_message(&self) -> Option<String> {
        self.last_user_message.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeCompletion {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_message.lock().unwrap() = Some(user.to_string());
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("429 Too Many Requests"))
    }
}
