use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::Credential;
use crate::error::{Error, ErrorDetails};
use crate::http::VerdictHttpClient;
use crate::providers::{CompletionProvider, ProviderCompletion, handle_provider_error};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const PROVIDER_NAME: &str = "Groq";
pub const PROVIDER_TYPE: &str = "groq";

/// Fixed completion token budget for the Groq call.
const MAX_TOKENS: u32 = 500;

#[derive(Debug)]
pub struct GroqProvider {
    model_name: String,
    credentials: GroqCredentials,
}

impl GroqProvider {
    pub fn new(model_name: String, credentials: GroqCredentials) -> Self {
        GroqProvider {
            model_name,
            credentials,
        }
    }
}

#[derive(Clone, Debug)]
pub enum GroqCredentials {
    Static(SecretString),
    None,
}

impl From<Credential> for GroqCredentials {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::Static(api_key) => GroqCredentials::Static(api_key),
            Credential::Missing => GroqCredentials::None,
        }
    }
}

impl GroqCredentials {
    pub fn get_api_key(&self) -> Result<&SecretString, Error> {
        match self {
            GroqCredentials::Static(api_key) => Ok(api_key),
            GroqCredentials::None => Err(Error::new(ErrorDetails::ApiKeyMissing {
                provider_name: PROVIDER_NAME.to_string(),
            })),
        }
    }
}

impl CompletionProvider for GroqProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        http_client: &VerdictHttpClient,
    ) -> Result<ProviderCompletion, Error> {
        let api_key = self.credentials.get_api_key()?;
        let request_body = GroqRequest {
            model: &self.model_name,
            messages: vec![
                GroqRequestMessage::System {
                    content: system_prompt,
                },
                GroqRequestMessage::User {
                    content: user_prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
        };

        let start_time = Instant::now();
        let res = http_client
            .post(GROQ_API_URL)
            .bearer_auth(api_key.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::InferenceServer {
                    message: format!("Error sending request: {e}"),
                    provider_type: PROVIDER_TYPE.to_string(),
                })
            })?;
        let status = res.status();
        let raw_response = res.text().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceServer {
                message: format!("Error parsing text response: {e}"),
                provider_type: PROVIDER_TYPE.to_string(),
            })
        })?;
        let latency = start_time.elapsed();
        tracing::info!("Groq API call took {}ms", latency.as_millis());

        if !status.is_success() {
            return Err(handle_provider_error(status, &raw_response, PROVIDER_TYPE));
        }

        let response: GroqResponse = serde_json::from_str(&raw_response).map_err(|e| {
            Error::new(ErrorDetails::InferenceServer {
                message: format!("Error parsing JSON response: {e}"),
                provider_type: PROVIDER_TYPE.to_string(),
            })
        })?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                Error::new(ErrorDetails::InferenceServer {
                    message: "Response has no message content in the first choice".to_string(),
                    provider_type: PROVIDER_TYPE.to_string(),
                })
            })?;

        Ok(ProviderCompletion {
            model_label: self.model_name.clone(),
            text,
            latency,
        })
    }
}

#[derive(Debug, Serialize)]
struct GroqRequest<'a> {
    model: &'a str,
    messages: Vec<GroqRequestMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum GroqRequestMessage<'a> {
    System { content: &'a str },
    User { content: &'a str },
}

#[derive(Debug, Deserialize)]
struct GroqResponse {
    choices: Vec<GroqResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct GroqResponseChoice {
    message: GroqResponseMessage,
}

#[derive(Debug, Deserialize)]
struct GroqResponseMessage {
    content: Option<String>,
}
