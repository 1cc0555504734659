use std::time::Duration;

use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use crate::config::Credential;
use crate::error::{Error, ErrorDetails};
use crate::http::VerdictHttpClient;
use crate::providers::{CompletionProvider, ProviderCompletion, handle_provider_error};

lazy_static! {
    static ref TOGETHER_INFERENCE_URL: Url = {
        #[expect(clippy::expect_used)]
        Url::parse("https://api.together.xyz/inference").expect("Failed to parse TOGETHER_INFERENCE_URL")
    };
}

const PROVIDER_NAME: &str = "Together";
pub const PROVIDER_TYPE: &str = "together";

/// The only caller-imposed timeout in the system; the other providers rely on
/// the transport's defaults.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.7;
const MAX_TOKENS: u32 = 512;

#[derive(Debug)]
pub struct TogetherProvider {
    model_name: String,
    model_label: String,
    credentials: TogetherCredentials,
}

impl TogetherProvider {
    pub fn new(model_name: String, model_label: String, credentials: TogetherCredentials) -> Self {
        TogetherProvider {
            model_name,
            model_label,
            credentials,
        }
    }
}

#[derive(Clone, Debug)]
pub enum TogetherCredentials {
    Static(SecretString),
    None,
}

impl From<Credential> for TogetherCredentials {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::Static(api_key) => TogetherCredentials::Static(api_key),
            Credential::Missing => TogetherCredentials::None,
        }
    }
}

impl TogetherCredentials {
    pub fn get_api_key(&self) -> Result<&SecretString, Error> {
        match self {
            TogetherCredentials::Static(api_key) => Ok(api_key),
            TogetherCredentials::None => Err(Error::new(ErrorDetails::ApiKeyMissing {
                provider_name: PROVIDER_NAME.to_string(),
            })),
        }
    }
}

impl CompletionProvider for TogetherProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        http_client: &VerdictHttpClient,
    ) -> Result<ProviderCompletion, Error> {
        let api_key = self.credentials.get_api_key()?;
        let request_body = TogetherRequest {
            model: &self.model_name,
            prompt: format!("{system_prompt} {user_prompt}"),
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
        };

        let start_time = Instant::now();
        let res = http_client
            .post(TOGETHER_INFERENCE_URL.clone())
            .bearer_auth(api_key.expose_secret())
            .timeout(REQUEST_TIMEOUT)
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
        tracing::info!("Together AI API call took {}ms", latency.as_millis());

        if !status.is_success() {
            return Err(handle_provider_error(status, &raw_response, PROVIDER_TYPE));
        }

        let raw_json: Value = serde_json::from_str(&raw_response).map_err(|e| {
            Error::new(ErrorDetails::InferenceServer {
                message: format!("Error parsing JSON response: {e}"),
                provider_type: PROVIDER_TYPE.to_string(),
            })
        })?;
        let text = extract_completion_text(&raw_json)?;

        Ok(ProviderCompletion {
            model_label: self.model_label.clone(),
            text: text.to_string(),
            latency,
        })
    }
}

/// The one explicit contract check in the system: the response body MUST
/// contain a string at `choices[0].text`. A missing `choices` field, an empty
/// array, and a non-string `text` are all the same error class.
fn extract_completion_text(raw_json: &Value) -> Result<&str, Error> {
    raw_json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::new(ErrorDetails::UnexpectedResponseShape {
                message: "'choices[0].text' is missing or not a string".to_string(),
                provider_type: PROVIDER_TYPE.to_string(),
            })
        })
}

#[derive(Debug, Serialize)]
struct TogetherRequest<'a> {
    model: &'a str,
    prompt: String,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}
