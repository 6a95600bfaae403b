//! Extracción de marcas de cita `[Source N]` de una respuesta generada.

use anyhow::{Context, Result};
use regex::Regex;

/// Reconoce `[Source 3]`, `[Source 1, 2]` y `[Source 1, Source 4]`.
#[derive(Debug, Clone)]
pub struct CitationParser {
    marker: Regex,
    number: Regex,
}

impl CitationParser {
    pub fn new() -> Result<Self> {
        let marker = Regex::new(r"(?i)\[\s*Sources?\s+(\d+(?:\s*(?:,|and|&)\s*(?:Sources?\s+)?\d+)*)\s*\]")
            .context("failed to compile citation marker regex")?;
        let number = Regex::new(r"\d+").context("failed to compile citation number regex")?;
        Ok(Self { marker, number })
    }

    /// Índices citados, en orden de aparición y sin repetir.
    pub fn cited_indices(&self, answer: &str) -> Vec<usize> {
        let mut indices = Vec::new();
        for caps in self.marker.captures_iter(answer) {
            for n in self.number.find_iter(&caps[1]) {
                if let Ok(index) = n.as_str().parse::<usize>() {
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
            }
        }
        indices
    }

    /// Índices citados que no corresponden a ninguna fuente `1..=source_count`.
    pub fn unresolved(&self, answer: &str, source_count: usize) -> Vec<usize> {
        self.cited_indices(answer)
            .into_iter()
            .filter(|&i| i == 0 || i > source_count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_and_grouped_markers() {
        let parser = CitationParser::new().unwrap();
        let answer = "Kantor defines the field [Source 2]. Others agree [Source 1, 3] \
                      and [sources 4 and Source 2].";
        assert_eq!(parser.cited_indices(answer), vec![2, 1, 3, 4]);
    }

    #[test]
    fn ignores_text_without_markers() {
        let parser = CitationParser::new().unwrap();
        assert!(parser.cited_indices("No citations, see Source 2 maybe.").is_empty());
    }

    #[test]
    fn reports_out_of_range_citations() {
        let parser = CitationParser::new().unwrap();
        let answer = "[Source 1] [Source 0] [Source 7]";
        assert_eq!(parser.unresolved(answer, 5), vec![0, 7]);
        assert!(parser.unresolved("[Source 5]", 5).is_empty());
    }
}
