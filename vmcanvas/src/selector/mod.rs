//! Natural-language machine selection
//!
//! Picks one of the predefined machines for a free-text request. Selection
//! never fails from the caller's point of view: any error, or an answer that
//! does not name a listed machine, falls back to the first predefined machine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use crate::errors::AppError;
use crate::models::catalog::{predefined_machines, PredefinedMachine};
use crate::models::machine::Application;
use crate::storage::settings::SelectorSettings;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 10;

#[async_trait]
pub trait MachineSelector: Send + Sync {
    async fn select(&self, prompt: &str) -> PredefinedMachine;
}

/// Selector backed by the Anthropic messages API
pub struct AnthropicSelector {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<SecretString>,
    machines: Vec<PredefinedMachine>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicSelector {
    /// Build from settings, reading the key from the configured environment
    /// variable. A missing key is not an error; every selection then falls
    /// back.
    pub fn new(settings: &SelectorSettings) -> Result<Self, AppError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        if api_key.is_none() {
            warn!(
                "{} is not set; machine selection will use the default machine",
                settings.api_key_env
            );
        }
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(
        settings: &SelectorSettings,
        api_key: Option<SecretString>,
    ) -> Result<Self, AppError> {
        let endpoint = Url::parse(&settings.base_url)
            .and_then(|base| base.join("v1/messages"))
            .map_err(|e| {
                AppError::ConfigError(format!("Invalid selector URL {}: {}", settings.base_url, e))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;

        let machines = predefined_machines();
        if machines.is_empty() {
            return Err(AppError::ConfigError(
                "No predefined machines to select from".to_string(),
            ));
        }

        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
            api_key,
            machines,
        })
    }

    fn fallback(&self) -> PredefinedMachine {
        self.machines[0].clone()
    }

    async fn ask(&self, prompt: &str) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::SelectorError("API key not configured".to_string()))?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: build_prompt(&self.machines, prompt),
            }],
        };

        debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Selector request failed: {} - {}", status, body);
            return Err(AppError::SelectorError(status.to_string()));
        }

        let message: MessagesResponse = response.json().await?;
        match message.content.into_iter().next() {
            Some(ContentBlock { kind, text: Some(text) }) if kind == "text" => Ok(text),
            _ => Err(AppError::SelectorError(
                "Unexpected response type".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MachineSelector for AnthropicSelector {
    async fn select(&self, prompt: &str) -> PredefinedMachine {
        match self.ask(prompt).await {
            Ok(answer) => match parse_choice(&answer, self.machines.len()) {
                Some(index) => self.machines[index].clone(),
                None => {
                    warn!("Selector returned {:?}, using the default machine", answer);
                    self.fallback()
                }
            },
            Err(e) => {
                warn!("Machine selection failed, using the default machine: {}", e);
                self.fallback()
            }
        }
    }
}

/// Zero-based index for a 1-based answer such as `"2"` or `" 2."`
pub fn parse_choice(answer: &str, count: usize) -> Option<usize> {
    let digits: String = answer
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let choice: usize = digits.parse().ok()?;
    (1..=count).contains(&choice).then(|| choice - 1)
}

pub fn build_prompt(machines: &[PredefinedMachine], request: &str) -> String {
    let listing = machines
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let application = match m.application {
                Application::None => "No application".to_string(),
                other => other.to_string(),
            };
            format!(
                "{}. {}\n   - Description: {}\n   - Region: {} ({})\n   - Instance Size: {}\n   - Application: {}",
                i + 1,
                m.name,
                m.description,
                m.region.display_name(),
                m.region,
                m.instance_size,
                application
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an expert system administrator helping users select the best VM configuration for their needs.\n\n\
         Here are the available predefined machine configurations:\n\n\
         {listing}\n\n\
         The user has requested: \"{request}\"\n\n\
         Based on the user's request, select the BEST matching machine from the list above. Consider:\n\
         - The user's stated requirements and use case\n\
         - Geographic location preferences (if mentioned)\n\
         - Performance needs (instance size)\n\
         - Specific applications they need\n\n\
         Respond with ONLY the number (1, 2, etc.) of the best matching machine. No explanation needed."
    )
}
