//! Integración con Neo4j como vector store para los `:Chunk`.
//!
//! API pública:
//!   - trait `VectorStore` (consulta por similitud, catálogo de facetas, estadísticas).
//!   - `Neo4jStore`, su implementación sobre el índice vectorial de Neo4j, que
//!     además persiste documentos durante la ingesta.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph, Query, Row};
use serde_json::Value;
use tracing::{debug, info};

use crate::filter::{FilterPredicate, MetadataField};
use crate::models::{fields, ChunkNode, DocumentNode, FacetCatalog, IndexStats, StoreMatch};

/// Almacén de vecinos más cercanos con filtrado por metadatos.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Devuelve hasta `top_k` coincidencias ordenadas por score descendente,
    /// restringidas por `predicate` si existe.
    async fn query(
        &self,
        vector: &[f64],
        predicate: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<StoreMatch>>;

    /// Tipos de documento y títulos presentes en el corpus.
    async fn catalog(&self) -> Result<FacetCatalog>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Columnas comunes que devuelven las consultas de similitud. Todas se leen
/// como texto y se normalizan en `Hit::from_match`.
const RETURN_COLUMNS: &str = "RETURN elementId(c) AS id, score,
       c.source_id AS source_id,
       c.text AS text,
       c.filename AS filename,
       c.title AS title,
       c.doc_type AS doc_type,
       c.type AS legacy_type,
       toString(c.page) AS page,
       toString(c.year) AS year
ORDER BY score DESC";

#[derive(Clone)]
pub struct Neo4jStore {
    graph: Arc<Graph>,
    index_name: String,
    dimensions: usize,
}

impl Neo4jStore {
    pub fn new(graph: Arc<Graph>, index_name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            graph,
            index_name: index_name.into(),
            dimensions,
        }
    }

    /// Persiste un documento y sus chunks en una única transacción. Cada chunk
    /// lleva copiados los metadatos canónicos del documento. Los chunks de una
    /// ingesta anterior del mismo documento se borran antes de escribir.
    pub async fn write_document(&self, doc: &DocumentNode, chunks: &[ChunkNode]) -> Result<()> {
        let tx = self.graph.start_txn().await?;

        tx.run(
            query(
                "MATCH (:Document {id: $id})-[:HAS_CHUNK]->(old:Chunk)
                 DETACH DELETE old",
            )
            .param("id", doc.id.clone()),
        )
        .await?;

        let year_clause = if doc.year.is_some() { ", d.year = $year" } else { "" };
        let mut doc_query = query(&format!(
            "MERGE (d:Document {{id: $id}})
             SET d.title = $title, d.filename = $filename, d.doc_type = $doc_type,
                 d.source = $source, d.ingested_at = datetime($ingested_at){year_clause}"
        ))
        .param("id", doc.id.clone())
        .param("title", doc.title.clone())
        .param("filename", doc.filename.clone())
        .param("doc_type", doc.doc_type.clone())
        .param("source", doc.source.clone())
        .param("ingested_at", doc.ingested_at.clone());
        if let Some(year) = doc.year {
            doc_query = doc_query.param("year", i64::from(year));
        }
        tx.run(doc_query).await?;

        let chunk_year_clause = if doc.year.is_some() { ", c.year = $year" } else { "" };
        for chunk in chunks {
            let mut chunk_query = query(&format!(
                "MERGE (c:Chunk {{id: $id}})
                 SET c.index = $index, c.text = $text, c.embedding = $embedding,
                     c.page = $page, c.title = $title, c.filename = $filename,
                     c.doc_type = $doc_type, c.source_id = $doc_id{chunk_year_clause}
                 WITH c MATCH (d:Document {{id: $doc_id}}) MERGE (d)-[:HAS_CHUNK]->(c)"
            ))
            .param("id", chunk.id.clone())
            .param("index", chunk.index)
            .param("text", chunk.text.clone())
            .param("embedding", chunk.embedding.clone())
            .param("page", chunk.page.clone())
            .param("title", doc.title.clone())
            .param("filename", doc.filename.clone())
            .param("doc_type", doc.doc_type.clone())
            .param("doc_id", chunk.document_id.clone());
            if let Some(year) = doc.year {
                chunk_query = chunk_query.param("year", i64::from(year));
            }
            tx.run(chunk_query).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn similarity_query(
        &self,
        vector: &[f64],
        predicate: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Query {
        let (cypher, params) = similarity_cypher(predicate);
        let mut q = query(&cypher)
            .param("k", top_k as i64)
            .param("embedding", vector.to_vec());
        if predicate.is_none() {
            q = q.param("index_name", self.index_name.clone());
        }
        for (name, value) in params {
            q = q.param(&name, value);
        }
        q
    }
}

/// Texto Cypher de la búsqueda por similitud y sus parámetros de filtro.
///
/// Sin predicado se usa el índice aproximado. Con predicado se hace un
/// recorrido exacto restringido por el `WHERE`: filtrar después del índice
/// podría devolver menos resultados de los que existen. Ambas variantes
/// esperan `$k` y `$embedding`; la aproximada además `$index_name`.
fn similarity_cypher(predicate: Option<&FilterPredicate>) -> (String, Vec<(String, String)>) {
    match predicate {
        None => (
            format!(
                "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                 YIELD node AS c, score
                 {RETURN_COLUMNS}"
            ),
            Vec::new(),
        ),
        Some(predicate) => {
            let (clause, params) = predicate.to_cypher("c");
            (
                format!(
                    "MATCH (c:Chunk)
                     WHERE c.embedding IS NOT NULL AND {clause}
                     WITH c, vector.similarity.cosine(c.embedding, $embedding) AS score
                     {RETURN_COLUMNS}
                     LIMIT $k"
                ),
                params,
            )
        }
    }
}

#[async_trait]
impl VectorStore for Neo4jStore {
    async fn query(
        &self,
        vector: &[f64],
        predicate: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<StoreMatch>> {
        if vector.len() != self.dimensions {
            return Err(anyhow!(
                "Vector de dimensión {} para un índice de {} dimensiones",
                vector.len(),
                self.dimensions
            ));
        }

        let mut cursor = self
            .graph
            .execute(self.similarity_query(vector, predicate, top_k))
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            output.push(row_to_match(&row)?);
        }

        debug!(matches = output.len(), filtered = predicate.is_some(), "Búsqueda vectorial completada");
        Ok(output)
    }

    async fn catalog(&self) -> Result<FacetCatalog> {
        let cypher = format!(
            "MATCH (c:Chunk)
             WITH DISTINCT {} AS doc_type, {} AS title
             WHERE doc_type IS NOT NULL AND title IS NOT NULL
             RETURN doc_type, title",
            MetadataField::DocType.cypher_expr("c"),
            MetadataField::Title.cypher_expr("c"),
        );
        let mut cursor = self.graph.execute(query(&cypher)).await?;

        let mut catalog = FacetCatalog::default();
        while let Some(row) = cursor.next().await? {
            if let (Some(doc_type), Some(title)) =
                (row.get::<String>("doc_type"), row.get::<String>("title"))
            {
                catalog.insert(doc_type, title);
            }
        }
        Ok(catalog)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let cypher = format!(
            "MATCH (c:Chunk)
             RETURN count(c) AS chunks,
                    count(DISTINCT {}) AS documents,
                    count(DISTINCT {}) AS doc_types",
            MetadataField::Title.cypher_expr("c"),
            MetadataField::DocType.cypher_expr("c"),
        );
        let mut cursor = self.graph.execute(query(&cypher)).await?;
        let row = cursor
            .next()
            .await?
            .ok_or_else(|| anyhow!("Neo4j no devolvió estadísticas"))?;

        let stats = IndexStats {
            documents: row.get("documents").unwrap_or(0),
            chunks: row.get("chunks").unwrap_or(0),
            doc_types: row.get("doc_types").unwrap_or(0),
            dimensions: self.dimensions,
        };
        info!(?stats, "Estadísticas del índice consultadas");
        Ok(stats)
    }
}

/// Convierte una fila a `(id, score, metadatos)` con las claves tal cual las
/// guarda el índice. La normalización ocurre después, en un único sitio.
fn row_to_match(row: &Row) -> Result<StoreMatch> {
    let id: String = row
        .get("id")
        .ok_or_else(|| anyhow!("Falta campo 'id' en resultado de Neo4j"))?;
    let score: f64 = row
        .get("score")
        .ok_or_else(|| anyhow!("Falta campo 'score' en resultado de Neo4j"))?;

    let columns = [
        ("source_id", fields::SOURCE_ID),
        ("text", fields::TEXT),
        ("filename", fields::FILENAME),
        ("title", fields::TITLE),
        ("doc_type", fields::DOC_TYPE),
        ("legacy_type", fields::LEGACY_TYPE),
        ("page", fields::PAGE),
        ("year", fields::YEAR),
    ];
    let metadata: HashMap<String, Value> = columns
        .into_iter()
        .filter_map(|(column, key)| {
            row.get::<String>(column)
                .map(|value| (key.to_string(), Value::String(value)))
        })
        .collect();

    Ok(StoreMatch { id, score, metadata })
}
