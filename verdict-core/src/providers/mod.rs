use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{Error, ErrorDetails};
use crate::http::VerdictHttpClient;

pub mod gemini;
pub mod groq;
pub mod together;

/// A provider reply normalized to a common shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderCompletion {
    pub model_label: String,
    pub text: String,
    pub latency: Duration,
}

impl ProviderCompletion {
    pub fn time_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// The common contract over the three transport shapes: given a system prompt
/// and a user prompt, return the completion text and the call latency, or fail.
pub trait CompletionProvider {
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        http_client: &VerdictHttpClient,
    ) -> impl Future<Output = Result<ProviderCompletion, Error>> + Send;
}

/// Splits non-2xx provider responses into client-attributable and server
/// errors based on the status code.
pub(super) fn handle_provider_error(
    response_code: StatusCode,
    response_body: &str,
    provider_type: &str,
) -> Error {
    match response_code {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::TOO_MANY_REQUESTS => ErrorDetails::InferenceClient {
            status_code: Some(response_code),
            message: response_body.to_string(),
            provider_type: provider_type.to_string(),
        }
        .into(),
        _ => ErrorDetails::InferenceServer {
            message: response_body.to_string(),
            provider_type: provider_type.to_string(),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_provider_error() {
        let error = handle_provider_error(StatusCode::UNAUTHORIZED, "bad key", "groq");
        match error.get_details() {
            ErrorDetails::InferenceClient {
                status_code,
                message,
                provider_type,
            } => {
                assert_eq!(*status_code, Some(StatusCode::UNAUTHORIZED));
                assert_eq!(message, "bad key");
                assert_eq!(provider_type, "groq");
            }
            _ => panic!("Expected InferenceClient variant"),
        }

        let error = handle_provider_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", "together");
        match error.get_details() {
            ErrorDetails::InferenceServer { provider_type, .. } => {
                assert_eq!(provider_type, "together");
            }
            _ => panic!("Expected InferenceServer variant"),
        }
    }

    #[test]
    fn test_time_ms() {
        let completion = ProviderCompletion {
            model_label: "llama3-70b-8192".to_string(),
            text: "hi".to_string(),
            latency: Duration::from_millis(1234),
        };
        assert_eq!(completion.time_ms(), 1234);
    }
}
