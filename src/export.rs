//! Empaquetado del resultado: estructura para mostrar y documento de texto
//! plano exportable. El formato es determinista.

use std::fmt::Write as _;

use serde::Serialize;

use crate::filter::FilterPredicate;
use crate::models::{AnswerResult, FacetSelection, SourceRecord};

const EXCERPT_CHARS: usize = 300;
const SEPARATOR_WIDTH: usize = 80;

/// Una fuente tal como se muestra en la lista desplegable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceView {
    pub index: usize,
    pub title: String,
    pub doc_type: String,
    pub page: String,
    pub year: Option<i32>,
    pub score: f64,
    /// Relevancia como porcentaje, p. ej. "87.3%".
    pub relevance: String,
    pub excerpt: String,
    pub text: String,
}

impl From<&SourceRecord> for SourceView {
    fn from(source: &SourceRecord) -> Self {
        let hit = &source.hit;
        Self {
            index: source.index,
            title: hit.title.clone(),
            doc_type: hit.doc_type.clone(),
            page: hit.page.clone(),
            year: hit.year,
            score: hit.score,
            relevance: relevance_percent(hit.score),
            excerpt: excerpt(&hit.text, EXCERPT_CHARS),
            text: hit.text.clone(),
        }
    }
}

/// Filtros activos en forma legible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterView {
    pub doc_type: String,
    pub title: String,
    /// Predicado efectivamente aplicado (puede ser más amplio que la selección).
    pub applied: Option<String>,
}

impl FilterView {
    pub fn new(selection: &FacetSelection, predicate: Option<&FilterPredicate>) -> Self {
        Self {
            doc_type: selection.selected_type().unwrap_or("All").to_string(),
            title: selection.selected_title().unwrap_or("All").to_string(),
            applied: predicate.map(ToString::to_string),
        }
    }
}

/// Resultado estructurado para la capa de presentación.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub filters: FilterView,
    pub answer: String,
    pub sources: Vec<SourceView>,
    pub export: String,
}

impl QueryReport {
    pub fn new(query: &str, filters: FilterView, result: &AnswerResult) -> Self {
        Self {
            query: query.to_string(),
            export: export_document(query, &filters, result),
            answer: result.answer.clone(),
            sources: result.sources.iter().map(SourceView::from).collect(),
            filters,
        }
    }
}

/// Score × 100 acotado a [0, 100] con un decimal.
pub fn relevance_percent(score: f64) -> String {
    let pct = if score.is_finite() { (score * 100.0).clamp(0.0, 100.0) } else { 0.0 };
    format!("{pct:.1}%")
}

/// Primeros `max_chars` caracteres (no bytes), con "..." si se corta.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// Documento exportable con secciones QUERY, FILTERS, ANSWER y SOURCES.
pub fn export_document(query: &str, filters: &FilterView, result: &AnswerResult) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let mut out = String::new();

    section(&mut out, "QUERY");
    let _ = writeln!(out, "{}\n", query.trim());

    section(&mut out, "FILTERS");
    let _ = writeln!(out, "Document type: {}", filters.doc_type);
    let _ = writeln!(out, "Title: {}", filters.title);
    if let Some(applied) = &filters.applied {
        let _ = writeln!(out, "Applied filter: {applied}");
    }
    out.push('\n');

    section(&mut out, "ANSWER");
    let _ = writeln!(out, "{}\n", result.answer.trim());

    section(&mut out, "SOURCES");
    for source in &result.sources {
        let hit = &source.hit;
        let _ = writeln!(out, "{separator}");
        let _ = writeln!(out, "[Source {}]", source.index);
        let _ = writeln!(out, "Type: {}", hit.doc_type);
        let _ = writeln!(out, "Title: {}", hit.title);
        let _ = writeln!(out, "Page: {}", hit.page);
        if let Some(year) = hit.year {
            let _ = writeln!(out, "Year: {year}");
        }
        let _ = writeln!(out, "Relevance: {}", relevance_percent(hit.score));
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", hit.text.trim());
    }
    let _ = writeln!(out, "{separator}");

    out
}

fn section(out: &mut String, name: &str) {
    let _ = writeln!(out, "{name}\n{}", "=".repeat(name.len()));
}
