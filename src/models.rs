//! Modelos de dominio: pasajes recuperados, fuentes citables, facetas y
//! registros que se escriben en el grafo durante la ingesta.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

/// Claves canónicas de metadatos de un `:Chunk`. Toda lectura y escritura
/// pasa por estos nombres.
pub mod fields {
    pub const TEXT: &str = "text";
    pub const FILENAME: &str = "filename";
    pub const TITLE: &str = "title";
    pub const DOC_TYPE: &str = "doc_type";
    pub const PAGE: &str = "page";
    pub const YEAR: &str = "year";
    /// Id estable del `:Document` al que pertenece el chunk.
    pub const SOURCE_ID: &str = "source_id";

    /// Clave heredada de variantes anteriores del índice (`type` en vez de `doc_type`).
    pub const LEGACY_TYPE: &str = "type";
}

pub const UNKNOWN_TITLE: &str = "Unknown";
pub const UNKNOWN_TYPE: &str = "Unknown";
pub const UNKNOWN_PAGE: &str = "?";

/// Una coincidencia cruda del vector store: (id, score, mapa de metadatos).
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMatch {
    pub id: String,
    pub score: f64,
    pub metadata: HashMap<String, Value>,
}

/// Un pasaje recuperado para una consulta. Vive sólo durante la petición.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub id: String,
    /// Identidad del documento fuente. En índices antiguos sin `source_id`
    /// se usa el título.
    pub source_id: String,
    /// Título visible del documento (o nombre de fichero si falta).
    pub title: String,
    pub doc_type: String,
    pub page: String,
    pub score: f64,
    pub text: String,
    pub year: Option<i32>,
}

impl Hit {
    /// Normaliza los metadatos de una coincidencia al esquema canónico.
    pub fn from_match(m: StoreMatch) -> Self {
        let meta = &m.metadata;
        let title = string_field(meta, fields::TITLE)
            .or_else(|| string_field(meta, fields::FILENAME))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let doc_type = string_field(meta, fields::DOC_TYPE)
            .or_else(|| string_field(meta, fields::LEGACY_TYPE))
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
        let page = string_field(meta, fields::PAGE).unwrap_or_else(|| UNKNOWN_PAGE.to_string());
        let text = string_field(meta, fields::TEXT).unwrap_or_default();
        let year = meta.get(fields::YEAR).and_then(year_value);
        let source_id = string_field(meta, fields::SOURCE_ID).unwrap_or_else(|| title.clone());

        Self {
            id: m.id,
            source_id,
            title,
            doc_type,
            page,
            score: m.score,
            text,
            year,
        }
    }
}

/// Lee un campo como texto no vacío. Los números se convierten a su forma decimal.
fn string_field(meta: &HashMap<String, Value>, key: &str) -> Option<String> {
    match meta.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(|f| {
                if f.fract() == 0.0 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            }),
        },
        _ => None,
    }
}

fn year_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

/// Un `Hit` con su índice de cita (1-based) asignado al ensamblar el contexto.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub index: usize,
    #[serde(flatten)]
    pub hit: Hit,
}

/// Respuesta final: texto generado y fuentes que puede citar, en orden.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<SourceRecord>,
}

/// Facetas elegidas por el usuario. `None` equivale a "todas".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetSelection {
    pub doc_type: Option<String>,
    pub title: Option<String>,
}

impl FacetSelection {
    pub fn new(doc_type: Option<&str>, title: Option<&str>) -> Self {
        Self {
            doc_type: normalize_facet(doc_type),
            title: normalize_facet(title),
        }
    }

    /// Tipo seleccionado, ignorando los valores comodín ("All", vacío).
    pub fn selected_type(&self) -> Option<&str> {
        facet_value(self.doc_type.as_deref())
    }

    /// Título seleccionado. Sin tipo no hay título seleccionable.
    pub fn selected_title(&self) -> Option<&str> {
        self.selected_type()?;
        facet_value(self.title.as_deref())
    }
}

fn normalize_facet(value: Option<&str>) -> Option<String> {
    facet_value(value).map(str::to_string)
}

fn facet_value(value: Option<&str>) -> Option<&str> {
    let v = value?.trim();
    const WILDCARDS: [&str; 4] = ["all", "*", "all types", "all titles"];
    if v.is_empty() || WILDCARDS.iter().any(|w| v.eq_ignore_ascii_case(w)) {
        None
    } else {
        Some(v)
    }
}

/// Catálogo de facetas disponible en el corpus: tipo → títulos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetCatalog {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl FacetCatalog {
    pub fn insert(&mut self, doc_type: impl Into<String>, title: impl Into<String>) {
        self.types.entry(doc_type.into()).or_default().insert(title.into());
    }

    pub fn contains_title(&self, doc_type: &str, title: &str) -> bool {
        self.types
            .get(doc_type)
            .is_some_and(|titles| titles.contains(title))
    }

    pub fn doc_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn titles(&self, doc_type: &str) -> impl Iterator<Item = &str> {
        self.types
            .get(doc_type)
            .into_iter()
            .flat_map(|titles| titles.iter().map(String::as_str))
    }
}

impl<T: Into<String>, U: Into<String>> FromIterator<(T, U)> for FacetCatalog {
    fn from_iter<I: IntoIterator<Item = (T, U)>>(iter: I) -> Self {
        let mut catalog = Self::default();
        for (doc_type, title) in iter {
            catalog.insert(doc_type, title);
        }
        catalog
    }
}

/// Estadísticas del índice, equivalentes al "describe index stats" del panel de depuración.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub doc_types: i64,
    pub dimensions: usize,
}

/// Representa un nodo (:Document) en Neo4j.
#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub doc_type: String,
    pub year: Option<i32>,
    pub source: String,
    pub ingested_at: String,
}

/// Representa un nodo (:Chunk) en Neo4j, con los metadatos canónicos copiados
/// del documento para poder filtrar sin recorrer relaciones.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    pub id: String,
    pub document_id: String,
    pub index: i64,
    pub page: String,
    pub text: String,
    pub embedding: Vec<f64>,
}
