//! Static provider catalog and the single construction point for adapters

use chorus_core::ProviderCredentials;
use reqwest::Client;
use serde::Serialize;

use crate::error::LlmError;
use crate::provider::{Adapter, AnthropicAdapter, GeminiAdapter, OpenAiAdapter, WorkflowAdapter};

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolVariant {
    #[serde(rename = "openai_compatible")]
    #[strum(serialize = "openai_compatible")]
    OpenAiCompatible,
    Anthropic,
    Gemini,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

/// Immutable description of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub variant: ProtocolVariant,
    pub default_endpoint: &'static str,
    pub models: &'static [ModelDescriptor],
}

impl ProviderDefinition {
    pub fn model(&self, id: &str) -> Option<&'static ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }
}

const fn model(id: &'static str, label: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        id,
        label,
        description: None,
    }
}

const fn described(id: &'static str, label: &'static str, description: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        id,
        label,
        description: Some(description),
    }
}

static CATALOG: &[ProviderDefinition] = &[
    ProviderDefinition {
        id: "openai",
        name: "OpenAI",
        variant: ProtocolVariant::OpenAiCompatible,
        default_endpoint: "https://api.openai.com/v1",
        models: &[
            model("gpt-4o", "GPT-4o"),
            model("gpt-4o-mini", "GPT-4o mini"),
            described("o3-mini", "o3-mini", "Small reasoning model"),
        ],
    },
    ProviderDefinition {
        id: "deepseek",
        name: "DeepSeek",
        variant: ProtocolVariant::OpenAiCompatible,
        default_endpoint: "https://api.deepseek.com/v1",
        models: &[
            model("deepseek-chat", "DeepSeek V3"),
            described("deepseek-reasoner", "DeepSeek R1", "Streams reasoning_content"),
        ],
    },
    ProviderDefinition {
        id: "moonshot",
        name: "Moonshot",
        variant: ProtocolVariant::OpenAiCompatible,
        default_endpoint: "https://api.moonshot.cn/v1",
        models: &[
            model("moonshot-v1-8k", "Moonshot v1 8k"),
            model("moonshot-v1-32k", "Moonshot v1 32k"),
            model("kimi-k2-0711-preview", "Kimi K2"),
        ],
    },
    ProviderDefinition {
        id: "qwen",
        name: "Qwen",
        variant: ProtocolVariant::OpenAiCompatible,
        default_endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        models: &[
            model("qwen-plus", "Qwen Plus"),
            model("qwen-max", "Qwen Max"),
            described("qwq-plus", "QwQ Plus", "Reasoning model, honours enable_thinking"),
        ],
    },
    ProviderDefinition {
        id: "openrouter",
        name: "OpenRouter",
        variant: ProtocolVariant::OpenAiCompatible,
        default_endpoint: "https://openrouter.ai/api/v1",
        models: &[
            model("openai/gpt-4o", "GPT-4o via OpenRouter"),
            model("anthropic/claude-sonnet-4", "Claude Sonnet 4 via OpenRouter"),
            model("google/gemini-2.5-flash", "Gemini 2.5 Flash via OpenRouter"),
        ],
    },
    ProviderDefinition {
        id: "anthropic",
        name: "Anthropic",
        variant: ProtocolVariant::Anthropic,
        default_endpoint: "https://api.anthropic.com/v1",
        models: &[
            model("claude-opus-4-20250514", "Claude Opus 4"),
            model("claude-sonnet-4-20250514", "Claude Sonnet 4"),
            model("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
        ],
    },
    ProviderDefinition {
        id: "gemini",
        name: "Google Gemini",
        variant: ProtocolVariant::Gemini,
        default_endpoint: "https://generativelanguage.googleapis.com/v1beta",
        models: &[
            model("gemini-2.5-pro", "Gemini 2.5 Pro"),
            model("gemini-2.5-flash", "Gemini 2.5 Flash"),
        ],
    },
    ProviderDefinition {
        id: "dify",
        name: "Dify",
        variant: ProtocolVariant::Workflow,
        default_endpoint: "https://api.dify.ai/v1",
        models: &[described(
            "dify-app",
            "Dify app",
            "The app behind the API key decides the model",
        )],
    },
];

/// Looks up provider definitions and builds adapters for them
///
/// Cheap to clone; every adapter shares the registry's HTTP client.
#[derive(Clone, Default)]
pub struct Registry {
    client: Client,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn lookup(&self, provider_id: &str) -> Option<&'static ProviderDefinition> {
        CATALOG.iter().find(|d| d.id == provider_id)
    }

    /// Every known provider, in catalog order
    pub fn definitions(&self) -> &'static [ProviderDefinition] {
        CATALOG
    }

    /// Build the adapter for `provider_id` with caller-supplied credentials
    pub fn instantiate(&self, provider_id: &str, credentials: &ProviderCredentials) -> Result<Adapter, LlmError> {
        let definition = self
            .lookup(provider_id)
            .ok_or_else(|| LlmError::UnsupportedProvider(provider_id.to_owned()))?;

        let client = self.client.clone();

        let adapter = match definition.variant {
            ProtocolVariant::OpenAiCompatible => {
                Adapter::OpenAiCompatible(OpenAiAdapter::new(definition, credentials, client)?)
            }
            ProtocolVariant::Anthropic => Adapter::Anthropic(AnthropicAdapter::new(definition, credentials, client)?),
            ProtocolVariant::Gemini => Adapter::Gemini(GeminiAdapter::new(definition, credentials, client)?),
            ProtocolVariant::Workflow => Adapter::Workflow(WorkflowAdapter::new(definition, credentials, client)?),
        };

        Ok(adapter)
    }
}
