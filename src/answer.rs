//! Generación fundamentada: el modelo sólo puede usar el contexto ensamblado
//! y debe citar con la misma numeración `[Source N]`.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::citations::CitationParser;
use crate::context::AssembledContext;

/// Servicio de chat visto como caja negra: instrucción de sistema + mensaje
/// de usuario → texto.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub const SYSTEM_PROMPT: &str = r#"You are a scholar specializing in J.R. Kantor's interbehavioral psychology.
Answer the question using ONLY the information contained in the numbered context passages.
Every claim must be cited with the bracketed marker of the passage it comes from, exactly in the form [Source N], where N is the number shown in the context and in the source list. Do not cite numbers that are not in the source list.
If the context does not contain the information needed to answer, say explicitly that the provided documents do not cover it. Do not use outside knowledge and do not invent sources, quotations or page numbers."#;

/// Construye los mensajes y delega en el backend. Una sola petición, sin
/// reintentos ni respuesta de respaldo sin contexto.
pub struct GroundedAnswerer {
    citations: CitationParser,
}

impl GroundedAnswerer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            citations: CitationParser::new()?,
        })
    }

    /// Mensaje de usuario: contexto numerado, lista de fuentes y pregunta.
    pub fn user_message(assembled: &AssembledContext, query: &str) -> String {
        format!(
            "Context:\n{}\n\nSources:\n{}\n\nQuestion: {}",
            assembled.context, assembled.references, query
        )
    }

    /// Devuelve el texto generado tal cual. Las citas fuera de rango sólo se registran.
    pub async fn answer(
        &self,
        backend: &dyn CompletionBackend,
        assembled: &AssembledContext,
        query: &str,
    ) -> Result<String> {
        let user = Self::user_message(assembled, query);
        debug!(model = backend.model(), sources = assembled.sources.len(), "Enviando petición de generación");

        let answer = backend.complete(SYSTEM_PROMPT, &user).await?;

        let unresolved = self.citations.unresolved(&answer, assembled.sources.len());
        if !unresolved.is_empty() {
            warn!(?unresolved, "La respuesta cita fuentes inexistentes");
        }
        if self.citations.cited_indices(&answer).is_empty() {
            debug!("La respuesta no contiene citas [Source N]");
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assemble;
    use crate::test_support::{hit, FakeCompletion};

    #[test]
    fn system_prompt_enforces_grounding() {
        assert!(SYSTEM_PROMPT.contains("ONLY"));
        assert!(SYSTEM_PROMPT.contains("[Source N]"));
        assert!(SYSTEM_PROMPT.contains("do not cover it"));
    }

    #[tokio::test]
    async fn sends_context_sources_and_question() {
        let assembled = assemble(vec![hit("a", "Principles of Psychology", 0.9)]).unwrap();
        let backend = FakeCompletion::replying("The field is the unit [Source 1].");
        let answerer = GroundedAnswerer::new().unwrap();

        let answer = answerer
            .answer(&backend, &assembled, "What is a psychological field?")
            .await
            .unwrap();

        assert_eq!(answer, "The field is the unit [Source 1].");
        assert_eq!(backend.calls(), 1);
        let user = backend.last_user_message().unwrap();
        assert!(user.starts_with("Context:\n[Source 1] Principles of Psychology (page 1)"));
        assert!(user.contains("Sources:\nSource 1: Principles of Psychology, page 1"));
        assert!(user.ends_with("Question: What is a psychological field?"));
    }

    #[tokio::test]
    async fn backend_errors_are_not_retried() {
        let assembled = assemble(vec![hit("a", "A", 0.9)]).unwrap();
        let backend = FakeCompletion::failing();
        let answerer = GroundedAnswerer::new().unwrap();

        let result = answerer.answer(&backend, &assembled, "q").await;

        assert!(result.is_err());
        assert_eq!(backend.calls(), 1);
    }
}
