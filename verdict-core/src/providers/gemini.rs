use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

use crate::config::Credential;
use crate::error::{Error, ErrorDetails};
use crate::http::VerdictHttpClient;
use crate::providers::{CompletionProvider, ProviderCompletion, handle_provider_error};

const PROVIDER_NAME: &str = "Google AI Studio Gemini";
pub const PROVIDER_TYPE: &str = "google_ai_studio_gemini";

/// Fixed output token budget and sampling temperature for the provider call
/// (the judge uses the model's defaults instead).
const MAX_OUTPUT_TOKENS: u32 = 500;
const TEMPERATURE: f64 = 0.9;

/// Builds the non-streaming `generateContent` URL for a Gemini model.
pub(crate) fn generate_content_url(model_name: &str) -> Result<Url, Error> {
    Url::parse(&format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model_name}:generateContent",
    ))
    .map_err(|e| {
        Error::new(ErrorDetails::Config {
            message: format!("Failed to parse request URL: {e}"),
        })
    })
}

#[derive(Debug)]
pub struct GeminiProvider {
    model_name: String,
    request_url: Url,
    credentials: GeminiCredentials,
}

impl GeminiProvider {
    pub fn new(model_name: String, credentials: GeminiCredentials) -> Result<Self, Error> {
        let request_url = generate_content_url(&model_name)?;
        Ok(GeminiProvider {
            model_name,
            request_url,
            credentials,
        })
    }
}

#[derive(Clone, Debug)]
pub enum GeminiCredentials {
    Static(SecretString),
    None,
}

impl From<Credential> for GeminiCredentials {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::Static(api_key) => GeminiCredentials::Static(api_key),
            Credential::Missing => GeminiCredentials::None,
        }
    }
}

impl GeminiCredentials {
    pub fn get_api_key(&self) -> Result<&SecretString, Error> {
        match self {
            GeminiCredentials::Static(api_key) => Ok(api_key),
            GeminiCredentials::None => Err(Error::new(ErrorDetails::ApiKeyMissing {
                provider_name: PROVIDER_NAME.to_string(),
            })),
        }
    }
}

impl CompletionProvider for GeminiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        http_client: &VerdictHttpClient,
    ) -> Result<ProviderCompletion, Error> {
        let api_key = self.credentials.get_api_key()?;
        // The prompt is rewritten to ask for an expanded answer before sending.
        let prompt = format!(
            "{system_prompt} Provide a detailed explanation of the following: {user_prompt}. \
             Include classifications, examples, and additional context where applicable."
        );
        let (text, latency) = generate_content(
            http_client,
            &self.request_url,
            api_key,
            &prompt,
            Some(GeminiGenerationConfig {
                temperature: Some(TEMPERATURE),
                max_output_tokens: Some(MAX_OUTPUT_TOKENS),
            }),
        )
        .await?;
        tracing::info!("Gemini API call took {}ms", latency.as_millis());

        Ok(ProviderCompletion {
            model_label: self.model_name.clone(),
            text,
            latency,
        })
    }
}

/// Sends one `generateContent` call and extracts the first candidate's text.
///
/// Shared by the provider adapter and the judge evaluator.
pub(crate) async fn generate_content(
    http_client: &VerdictHttpClient,
    request_url: &Url,
    api_key: &SecretString,
    prompt: &str,
    generation_config: Option<GeminiGenerationConfig>,
) -> Result<(String, Duration), Error> {
    let request_body = GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart { text: prompt }],
        }],
        generation_config,
    };
    let mut url = request_url.clone();
    url.query_pairs_mut()
        .append_pair("key", api_key.expose_secret());

    let start_time = Instant::now();
    let res = http_client
        .post(url)
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

    if !status.is_success() {
        return Err(handle_provider_error(status, &raw_response, PROVIDER_TYPE));
    }

    let response: GeminiResponse = serde_json::from_str(&raw_response).map_err(|e| {
        Error::new(ErrorDetails::InferenceServer {
            message: format!("Error parsing JSON response: {e}"),
            provider_type: PROVIDER_TYPE.to_string(),
        })
    })?;
    let text = extract_candidate_text(response).ok_or_else(|| {
        Error::new(ErrorDetails::InferenceServer {
            message: "Response has no text in the first candidate".to_string(),
            provider_type: PROVIDER_TYPE.to_string(),
        })
    })?;
    Ok((text, latency))
}

fn extract_candidate_text(response: GeminiResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_generate_content_url() {
        let url = generate_content_url("gemini-1.5-flash").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_gemini_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: "hello" }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: Some(0.9),
                max_output_tokens: Some(500),
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{"parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.9, "maxOutputTokens": 500}
            })
        );
    }

    #[test]
    fn test_extract_candidate_text() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "part one. "}, {"text": "part two."}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(
            extract_candidate_text(response).as_deref(),
            Some("part one. part two.")
        );
    }

    #[test]
    fn test_extract_candidate_text_empty_response() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(extract_candidate_text(response), None);

        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert_eq!(extract_candidate_text(response), None);
    }
}
