//! Ingesta de un directorio del corpus en Neo4j, generando el grafo
//! Document → Chunk con embeddings y metadatos canónicos por chunk.
//!
//! Convenciones del corpus:
//!   - el tipo de documento es la primera carpeta bajo la raíz (`Books/`, `Articles/`, ...);
//!   - el título es el nombre del fichero sin extensión, con `_` y `-` como espacios;
//!   - el año es el primer número de cuatro cifras entre 1900 y 2099 del nombre;
//!   - la identidad del documento es su ruta relativa a la raíz, de modo que
//!     reingerir el mismo fichero reemplaza sus chunks en vez de duplicarlos.

use std::{
    fs,
    path::{Component, Path},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use chrono::Utc;
use mime_guess::MimeGuess;
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    embedder::Embedder,
    models::{ChunkNode, DocumentNode},
    vector_store::Neo4jStore,
};

const MAX_CHUNK_CHARS: usize = 1200;
const EMBED_BATCH: usize = 64;
const UNCATEGORIZED: &str = "Uncategorized";

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub pages_read: usize,
    pub chunks_created: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} páginas y {} chunks creados.",
            self.files_scanned, self.files_ingested, self.files_skipped, self.pages_read, self.chunks_created
        )
    }
}

/// Metadatos que se deducen de la ruta de un fichero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub doc_type: String,
    pub title: String,
    pub filename: String,
    pub year: Option<i32>,
    /// Ruta relativa a la raíz con separadores `/`.
    pub source_key: String,
}

impl FileDescriptor {
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let components: Vec<_> = relative.components().collect();
        let source_key = components
            .iter()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        let doc_type = match components.as_slice() {
            [Component::Normal(dir), _, ..] => dir.to_string_lossy().trim().to_string(),
            _ => UNCATEGORIZED.to_string(),
        };

        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.clone());

        let year = find_year(&stem);
        let title = clean_title(&stem);

        Self {
            doc_type,
            title: if title.is_empty() { stem } else { title },
            filename,
            year,
            source_key,
        }
    }

    /// Id estable del `:Document`: el mismo fichero produce siempre el mismo id.
    pub fn document_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, self.source_key.as_bytes())
    }
}

fn chunk_id(document_id: &Uuid, index: usize) -> Uuid {
    Uuid::new_v5(document_id, index.to_string().as_bytes())
}

/// Primer número de exactamente cuatro cifras en [1900, 2099].
fn find_year(stem: &str) -> Option<i32> {
    stem.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|y| (1900..=2099).contains(y))
}

/// Sustituye los separadores de estilo fichero por espacios. El año se
/// conserva: dos ediciones del mismo texto deben poder distinguirse.
fn clean_title(stem: &str) -> String {
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn set_status(status_arc: &Arc<Mutex<Status>>, message: String, progress: f32) {
    if let Ok(mut status) = status_arc.lock() {
        status.message = message;
        status.progress = progress;
    }
}

/// Recorre recursivamente un directorio, extrae el texto página a página,
/// genera chunks con embeddings y los persiste en Neo4j.
pub async fn ingest_directory(
    store: &Neo4jStore,
    embedder: &dyn Embedder,
    root: &Path,
    status_arc: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    if !root.is_dir() {
        return Err(anyhow!(
            "La ruta no es un directorio: {}",
            root.display()
        ));
    }

    let mut summary = IngestionSummary::default();
    let file_entries: Vec<_> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();

    let total_files = file_entries.len().max(1) as f32;

    for (index, entry) in file_entries.iter().enumerate() {
        summary.files_scanned += 1;
        let path = entry.path();
        let filename_str = path.file_name().unwrap_or_default().to_string_lossy();
        let progress = (index + 1) as f32 / total_files;

        set_status(
            &status_arc,
            format!("[{}/{}] Procesando: {}...", index + 1, file_entries.len(), filename_str),
            progress,
        );

        match ingest_file(store, embedder, root, path).await {
            Ok(Some((pages, chunks))) => {
                summary.files_ingested += 1;
                summary.pages_read += pages;
                summary.chunks_created += chunks;
            }
            Ok(None) => {
                summary.files_skipped += 1;
                set_status(
                    &status_arc,
                    format!("[{}/{}] Omitido: {}", index + 1, file_entries.len(), filename_str),
                    progress,
                );
            }
            Err(err) => {
                summary.files_skipped += 1;
                error!("Error ingiriendo {}: {err:#}", path.display());
                set_status(
                    &status_arc,
                    format!("ERROR en {}: {}", path.display(), err),
                    progress,
                );
            }
        }
    }

    info!("{summary}");
    Ok(summary)
}

/// Devuelve `(páginas, chunks)` ingeridos, o `None` si el fichero se omite.
async fn ingest_file(
    store: &Neo4jStore,
    embedder: &dyn Embedder,
    root: &Path,
    path: &Path,
) -> Result<Option<(usize, usize)>> {
    let Some(pages) = read_pages(path) else {
        return Ok(None);
    };

    let descriptor = FileDescriptor::from_path(root, path);
    let document_id = descriptor.document_id();
    let page_chunks = chunk_pages(&pages, MAX_CHUNK_CHARS);
    if page_chunks.is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", path.display());
        return Ok(None);
    }

    let doc = DocumentNode {
        id: document_id.to_string(),
        title: descriptor.title,
        filename: descriptor.filename,
        doc_type: descriptor.doc_type,
        year: descriptor.year,
        source: path.to_string_lossy().to_string(),
        ingested_at: Utc::now().to_rfc3339(),
    };

    let mut chunks = Vec::with_capacity(page_chunks.len());
    for batch in page_chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                vectors.len(),
                batch.len()
            ));
        }
        for ((page, text), embedding) in batch.iter().zip(vectors) {
            chunks.push(ChunkNode {
                id: chunk_id(&document_id, chunks.len()).to_string(),
                document_id: doc.id.clone(),
                index: chunks.len() as i64,
                page: page.clone(),
                text: text.clone(),
                embedding,
            });
        }
    }

    store.write_document(&doc, &chunks).await?;

    info!(
        "Ingerido {} [{} / {}] con {} páginas y {} chunks.",
        path.display(),
        doc.doc_type,
        doc.title,
        pages.len(),
        chunks.len()
    );
    Ok(Some((pages.len(), chunks.len())))
}

/// Texto por página. Los ficheros de texto plano cuentan como una única página.
fn read_pages(path: &Path) -> Option<Vec<String>> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    if extension == "pdf" {
        return match pdf_extract::extract_text_by_pages(path) {
            Ok(pages) => Some(pages),
            Err(e) => {
                warn!("No se pudo extraer texto del PDF {}: {}. Saltando fichero.", path.display(), e);
                None
            }
        };
    }

    let is_text = MimeGuess::from_path(path)
        .first()
        .is_some_and(|m| m.type_() == mime_guess::mime::TEXT);
    if !is_text {
        info!("Saltando fichero con extensión no soportada ('.{}'): {}", extension, path.display());
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => Some(vec![content]),
        Err(_) => {
            warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
            None
        }
    }
}

/// Divide cada página en chunks y les asigna su número de página (1-based).
fn chunk_pages(pages: &[String], max_chars: usize) -> Vec<(String, String)> {
    pages
        .iter()
        .enumerate()
        .flat_map(|(i, page)| {
            split_into_chunks(page, max_chars)
                .into_iter()
                .map(move |chunk| ((i + 1).to_string(), chunk))
        })
        .collect()
}

fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        if paragraph.is_empty() { continue; }
        if current.len() + paragraph.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if paragraph.len() > max_chars {
            chunks.extend(split_long_paragraph(&paragraph, max_chars));
            continue;
        }
        if !current.is_empty() { current.push_str("\n\n"); }
        current.push_str(&paragraph);
    }
    if !current.is_empty() { chunks.push(current); }
    chunks
}

/// Corta un párrafo demasiado largo por palabras.
fn split_long_paragraph(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split(' ') {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() { current.push(' '); }
        current.push_str(word);
    }
    if !current.is_empty() { pieces.push(current); }
    pieces
}
