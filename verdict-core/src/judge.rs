use url::Url;

use crate::error::{Error, ErrorDetails};
use crate::http::VerdictHttpClient;
use crate::providers::gemini::{self, GeminiCredentials};

const JUDGE_MODEL_NAME: &str = "gemini-1.5-flash";

/// Neutral fallback used when the judge's reply cannot be parsed or the judge
/// call itself fails.
pub const DEFAULT_JUDGE_SCORE: f64 = 3.0;

const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 5;

/// The outcome of one judge evaluation.
///
/// Parse failures and out-of-range replies are distinguished rather than
/// silently coerced, so callers can decide whether a defaulted score matters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JudgeVerdict {
    /// Parsed and already within [1, 5].
    Scored(f64),
    /// Parsed but clamped into [1, 5].
    Clamped(f64),
    /// Unparsable reply or failed judge call.
    Defaulted,
}

impl JudgeVerdict {
    /// The effective score to store and aggregate.
    pub fn score(self) -> f64 {
        match self {
            JudgeVerdict::Scored(score) | JudgeVerdict::Clamped(score) => score,
            JudgeVerdict::Defaulted => DEFAULT_JUDGE_SCORE,
        }
    }
}

/// Scores candidate responses with Gemini acting as judge.
#[derive(Debug)]
pub struct Judge {
    request_url: Url,
    credentials: GeminiCredentials,
}

impl Judge {
    pub fn new(credentials: GeminiCredentials) -> Result<Self, Error> {
        let request_url = gemini::generate_content_url(JUDGE_MODEL_NAME)?;
        Ok(Judge {
            request_url,
            credentials,
        })
    }

    /// Scores a candidate response on [1, 5].
    ///
    /// Judge failures are fully absorbed: transport or parse problems yield
    /// `JudgeVerdict::Defaulted` and a warning, never an error to the caller.
    pub async fn evaluate(
        &self,
        user_prompt: &str,
        response_text: &str,
        model_label: &str,
        http_client: &VerdictHttpClient,
    ) -> JudgeVerdict {
        match self
            .try_evaluate(user_prompt, response_text, model_label, http_client)
            .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                // The underlying error was logged when it was constructed.
                tracing::warn!(
                    "Judge call failed for {model_label}; using default score {DEFAULT_JUDGE_SCORE}"
                );
                JudgeVerdict::Defaulted
            }
        }
    }

    async fn try_evaluate(
        &self,
        user_prompt: &str,
        response_text: &str,
        model_label: &str,
        http_client: &VerdictHttpClient,
    ) -> Result<JudgeVerdict, Error> {
        let api_key = self.credentials.get_api_key().map_err(|_| {
            Error::new(ErrorDetails::JudgeEvaluation {
                message: "Judge credentials are missing".to_string(),
            })
        })?;
        let evaluation_prompt = grading_prompt(user_prompt, response_text, model_label);
        let (reply, latency) = gemini::generate_content(
            http_client,
            &self.request_url,
            api_key,
            &evaluation_prompt,
            None,
        )
        .await?;
        tracing::info!(
            "Judge evaluation for {model_label} took {}ms",
            latency.as_millis()
        );
        Ok(parse_verdict(&reply))
    }
}

fn grading_prompt(user_prompt: &str, response_text: &str, model_label: &str) -> String {
    format!(
        "You are an expert AI model evaluator. Rate the following AI response on a scale of 1-5 \
         (where 5 is best), considering accuracy, relevance, and clarity.\n\n\
         Original prompt: \"{user_prompt}\"\n\
         Response from {model_label}: \"{response_text}\"\n\n\
         Provide only a single number (1-5) as your response."
    )
}

/// Parses the leading integer of the judge's reply and clamps it into [1, 5].
/// A reply with no leading integer defaults.
fn parse_verdict(reply: &str) -> JudgeVerdict {
    let trimmed = reply.trim();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    match trimmed[..end].parse::<i64>() {
        Ok(score) => {
            let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
            if clamped == score {
                JudgeVerdict::Scored(clamped as f64)
            } else {
                JudgeVerdict::Clamped(clamped as f64)
            }
        }
        Err(_) => JudgeVerdict::Defaulted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_in_range() {
        assert_eq!(parse_verdict("4"), JudgeVerdict::Scored(4.0));
        assert_eq!(parse_verdict(" 5\n"), JudgeVerdict::Scored(5.0));
        assert_eq!(parse_verdict("1"), JudgeVerdict::Scored(1.0));
        // A trailing explanation after the number still parses.
        assert_eq!(parse_verdict("4/5"), JudgeVerdict::Scored(4.0));
        assert_eq!(parse_verdict("3 out of 5"), JudgeVerdict::Scored(3.0));
    }

    #[test]
    fn test_parse_verdict_clamped() {
        assert_eq!(parse_verdict("9"), JudgeVerdict::Clamped(5.0));
        assert_eq!(parse_verdict("0"), JudgeVerdict::Clamped(1.0));
        assert_eq!(parse_verdict("-2"), JudgeVerdict::Clamped(1.0));
        assert_eq!(parse_verdict("100"), JudgeVerdict::Clamped(5.0));
    }

    #[test]
    fn test_parse_verdict_defaulted() {
        assert_eq!(parse_verdict("not a number"), JudgeVerdict::Defaulted);
        assert_eq!(parse_verdict(""), JudgeVerdict::Defaulted);
        assert_eq!(parse_verdict("-"), JudgeVerdict::Defaulted);
        assert_eq!(parse_verdict("five"), JudgeVerdict::Defaulted);
    }

    #[test]
    fn test_verdict_score() {
        assert_eq!(JudgeVerdict::Scored(4.0).score(), 4.0);
        assert_eq!(JudgeVerdict::Clamped(5.0).score(), 5.0);
        assert_eq!(JudgeVerdict::Defaulted.score(), 3.0);
    }

    #[test]
    fn test_grading_prompt() {
        let prompt = grading_prompt("What is Rust?", "A language.", "llama3-70b-8192");
        assert!(prompt.contains("Original prompt: \"What is Rust?\""));
        assert!(prompt.contains("Response from llama3-70b-8192: \"A language.\""));
        assert!(prompt.contains("Provide only a single number (1-5)"));
    }
}
