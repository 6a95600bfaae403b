//! Ensamblado del contexto citable: bloques numerados, lista de referencias
//! y registros de fuente comparten exactamente la misma numeración.

use crate::models::{Hit, SourceRecord};

/// Resultado del ensamblado. Los tres componentes están alineados por índice.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub context: String,
    pub references: String,
    pub sources: Vec<SourceRecord>,
}

/// Numera los pasajes desde 1 en el orden recibido. Sin pasajes no hay
/// contexto (`None`) y no debe pedirse ninguna generación.
pub fn assemble(hits: Vec<Hit>) -> Option<AssembledContext> {
    if hits.is_empty() {
        return None;
    }

    let sources: Vec<SourceRecord> = hits
        .into_iter()
        .enumerate()
        .map(|(i, hit)| SourceRecord { index: i + 1, hit })
        .collect();

    let context = sources
        .iter()
        .map(context_block)
        .collect::<Vec<_>>()
        .join("\n\n");
    let references = sources
        .iter()
        .map(reference_line)
        .collect::<Vec<_>>()
        .join("\n");

    Some(AssembledContext {
        context,
        references,
        sources,
    })
}

fn context_block(source: &SourceRecord) -> String {
    format!(
        "[Source {}] {} (page {})\n{}",
        source.index,
        source.hit.title,
        source.hit.page,
        source.hit.text.trim()
    )
}

fn reference_line(source: &SourceRecord) -> String {
    format!(
        "Source {}: {}, page {}",
        source.index, source.hit.title, source.hit.page
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hit;

    #[test]
    fn empty_hits_produce_no_context() {
        assert_eq!(assemble(Vec::new()), None);
    }

    #[test]
    fn outputs_share_numbering() {
        let hits = vec![
            hit("a", "Principles of Psychology", 0.9),
            hit("b", "Interbehavioral Psychology", 0.8),
            hit("c", "Principles of Psychology", 0.7),
        ];

        let assembled = assemble(hits).unwrap();

        let blocks: Vec<&str> = assembled
            .context
            .lines()
            .filter(|l| l.starts_with("[Source "))
            .collect();
        let refs: Vec<&str> = assembled.references.lines().collect();
        assert_eq!(blocks.len(), assembled.sources.len());
        assert_eq!(refs.len(), assembled.sources.len());

        for (i, source) in assembled.sources.iter().enumerate() {
            assert_eq!(source.index, i + 1);
            assert_eq!(
                blocks[i],
                format!("[Source {}] {} (page 1)", i + 1, source.hit.title)
            );
            assert_eq!(refs[i], format!("Source {}: {}, page 1", i + 1, source.hit.title));
        }
    }

    #[test]
    fn context_preserves_hit_order_and_text() {
        let assembled = assemble(vec![hit("x", "A", 0.5), hit("y", "B", 0.4)]).unwrap();
        assert_eq!(
            assembled.context,
            "[Source 1] A (page 1)\nPassage x from A.\n\n[Source 2] B (page 1)\nPassage y from B."
        );
        assert_eq!(assembled.references, "Source 1: A, page 1\nSource 2: B, page 1");
    }
}
