//! Abstracción sobre Rig para trabajar con distintos proveedores de chat.
//! Soporta OpenAI y Groq; los embeddings viven en `embedder`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;

use crate::answer::CompletionBackend;
use crate::config::{AppConfig, LlmProvider};

#[derive(Clone)]
enum ChatClient {
    OpenAI(rig::providers::openai::Client),
    Groq(rig::providers::groq::Client),
}

/// Cliente de chat de larga vida, creado una vez al arrancar.
#[derive(Clone)]
pub struct RigCompletion {
    client: ChatClient,
    chat_model: String,
}

impl RigCompletion {
    /// Construye el cliente a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        use rig::providers::{groq, openai};

        let client = match cfg.llm_provider {
            LlmProvider::OpenAI => ChatClient::OpenAI(openai::Client::new(&cfg.openai_api_key)),
            LlmProvider::Groq => {
                let key = cfg
                    .groq_api_key
                    .as_deref()
                    .ok_or_else(|| anyhow!("Falta GROQ_API_KEY para el proveedor groq"))?;
                ChatClient::Groq(groq::Client::new(key))
            }
        };

        // Modelo de chat por defecto si no se ha configurado otro
        let chat_model = if cfg.llm_chat_model.is_empty() {
            cfg.llm_provider.default_chat_model().to_string()
        } else {
            cfg.llm_chat_model.clone()
        };

        Ok(Self { client, chat_model })
    }
}

#[async_trait]
impl CompletionBackend for RigCompletion {
    fn model(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let answer = match &self.client {
            ChatClient::OpenAI(client) => {
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(system)
                    .temperature(0.0)
                    .build();
                agent.prompt(user).await?
            }
            ChatClient::Groq(client) => {
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(system)
                    .temperature(0.0)
                    .build();
                agent.prompt(user).await?
            }
        };

        if answer.trim().is_empty() {
            return Err(anyhow!("El modelo {} devolvió una respuesta vacía", self.chat_model));
        }
        Ok(answer)
    }
}
