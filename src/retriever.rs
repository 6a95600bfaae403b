//! Recuperación: consulta de similitud con sobre-consulta para que, tras
//! limitar pasajes por fuente, sigan quedando `top_k` fuentes distintas.

use std::cmp::Ordering;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::RetrievalSettings;
use crate::filter::FilterPredicate;
use crate::models::Hit;
use crate::vector_store::VectorStore;

/// Devuelve los pasajes ordenados por relevancia descendente. Una lista vacía
/// es un resultado válido ("nada relevante"), no un error.
pub async fn retrieve(
    store: &dyn VectorStore,
    vector: &[f64],
    predicate: Option<&FilterPredicate>,
    settings: &RetrievalSettings,
) -> Result<Vec<Hit>> {
    let fetch = settings.fetch_count();
    let matches = store.query(vector, predicate, fetch).await?;
    let raw = matches.len();

    let mut hits: Vec<Hit> = matches
        .into_iter()
        .map(Hit::from_match)
        .filter(|hit| !hit.text.trim().is_empty())
        .collect();
    if hits.len() < raw {
        warn!(dropped = raw - hits.len(), "Pasajes sin texto descartados");
    }

    // El orden estable conserva el orden del store en caso de empate.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    debug!(requested = fetch, returned = hits.len(), "Recuperación completada");
    Ok(hits)
}
