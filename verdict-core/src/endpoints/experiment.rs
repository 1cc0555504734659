use axum::debug_handler;
use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    CompletedExperimentRun, ExperimentQueries, ExperimentRow, NewResultRow, TestCaseRow,
};
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::{AppState, AppStateData};
use crate::judge::JudgeVerdict;
use crate::providers::{CompletionProvider, ProviderCompletion};

const LIVE_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Placeholder completions used when one or more provider API keys are
/// missing: (model label, simulated latency in ms, score).
const MOCK_COMPLETIONS: [(&str, u64, f64); 3] = [
    ("mock-llama3-70b-8192", 150, 4.0),
    ("mock-gemini-1.5-flash", 200, 3.5),
    ("mock-mixtral-8x7b-instruct-v0.1", 180, 3.8),
];

#[derive(Debug, Deserialize)]
pub struct RunOnePromptParams {
    #[serde(rename = "userPrompt")]
    pub user_prompt: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOnePromptResponse {
    pub experiment_id: Uuid,
    pub experiment_run_id: Uuid,
    pub test_case_id: Uuid,
    pub responses: Vec<ScoredResponse>,
    pub aggregate_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResponse {
    pub model: String,
    pub response_text: String,
    pub time_ms: u64,
    pub score: f64,
}

#[debug_handler(state = AppStateData)]
pub async fn run_one_prompt_handler(
    State(state): AppState,
    Json(params): Json<RunOnePromptParams>,
) -> Result<Json<RunOnePromptResponse>, Error> {
    let user_prompt = params
        .user_prompt
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| {
            Error::new(ErrorDetails::InvalidRequest {
                message: "Missing 'userPrompt' in request body".to_string(),
            })
        })?;
    let response = run_one_prompt(&state, &state.postgres, &user_prompt).await?;
    Ok(Json(response))
}

/// Runs one prompt end to end: fans it out to all three providers, scores each
/// reply with the judge, and persists the run atomically.
///
/// If any provider credential is missing, the whole request takes the mock
/// path and persists canned data instead of calling any provider.
pub async fn run_one_prompt(
    state: &AppStateData,
    db: &impl ExperimentQueries,
    user_prompt: &str,
) -> Result<RunOnePromptResponse, Error> {
    if state.config.any_provider_credential_missing() {
        tracing::warn!("One or more provider API keys are missing; generating mock data");
        return run_mock_experiment(db, user_prompt).await;
    }
    tracing::info!("All provider API keys found; running live experiment");

    let experiment = ExperimentRow {
        id: Uuid::now_v7(),
        name: "Real Experiment".to_string(),
        system_prompt: LIVE_SYSTEM_PROMPT.to_string(),
        model_name: "multi-model".to_string(),
    };
    let test_case = TestCaseRow {
        id: Uuid::now_v7(),
        user_message: user_prompt.to_string(),
        expected_output: "Expected output TBD".to_string(),
        grader_type: "auto".to_string(),
    };
    db.insert_experiment(experiment.clone()).await?;
    db.insert_test_case(test_case.clone()).await?;

    let started_at = Utc::now();

    // All three provider calls run concurrently; the first failure aborts the
    // whole request.
    let (groq, gemini, together) = tokio::try_join!(
        state
            .groq
            .complete(&experiment.system_prompt, user_prompt, &state.http_client),
        state
            .gemini
            .complete(&experiment.system_prompt, user_prompt, &state.http_client),
        state
            .together
            .complete(&experiment.system_prompt, user_prompt, &state.http_client),
    )?;

    // Judging starts only after every provider has replied.
    let (groq_verdict, gemini_verdict, together_verdict) = futures::join!(
        state
            .judge
            .evaluate(user_prompt, &groq.text, &groq.model_label, &state.http_client),
        state.judge.evaluate(
            user_prompt,
            &gemini.text,
            &gemini.model_label,
            &state.http_client
        ),
        state.judge.evaluate(
            user_prompt,
            &together.text,
            &together.model_label,
            &state.http_client
        ),
    );

    let responses = vec![
        to_scored_response(groq, groq_verdict),
        to_scored_response(gemini, gemini_verdict),
        to_scored_response(together, together_verdict),
    ];

    let (run_id, aggregate_score) = persist_run(
        db,
        experiment.id,
        test_case.id,
        "Real Run",
        started_at,
        &responses,
        |model| format!("Graded by Gemini for {model}"),
    )
    .await?;

    Ok(RunOnePromptResponse {
        experiment_id: experiment.id,
        experiment_run_id: run_id,
        test_case_id: test_case.id,
        responses,
        aggregate_score,
    })
}

async fn run_mock_experiment(
    db: &impl ExperimentQueries,
    user_prompt: &str,
) -> Result<RunOnePromptResponse, Error> {
    let experiment = ExperimentRow {
        id: Uuid::now_v7(),
        name: "Mock Experiment".to_string(),
        system_prompt: "Mock system prompt".to_string(),
        model_name: "mock-model".to_string(),
    };
    let test_case = TestCaseRow {
        id: Uuid::now_v7(),
        user_message: user_prompt.to_string(),
        expected_output: "Mock expected output".to_string(),
        grader_type: "mock-grader".to_string(),
    };
    db.insert_experiment(experiment.clone()).await?;
    db.insert_test_case(test_case.clone()).await?;

    let started_at = Utc::now();
    let responses: Vec<ScoredResponse> = MOCK_COMPLETIONS
        .iter()
        .map(|(model, time_ms, score)| ScoredResponse {
            model: model.to_string(),
            response_text: format!("Mock: {user_prompt}"),
            time_ms: *time_ms,
            score: *score,
        })
        .collect();

    let (run_id, aggregate_score) = persist_run(
        db,
        experiment.id,
        test_case.id,
        "Mock Run",
        started_at,
        &responses,
        |model| format!("Mock grader details for {model}"),
    )
    .await?;

    Ok(RunOnePromptResponse {
        experiment_id: experiment.id,
        experiment_run_id: run_id,
        test_case_id: test_case.id,
        responses,
        aggregate_score,
    })
}

/// Writes the run and its results in one transaction, so a completed run is
/// only ever visible together with all of its results.
async fn persist_run(
    db: &impl ExperimentQueries,
    experiment_id: Uuid,
    test_case_id: Uuid,
    run_name: &str,
    started_at: DateTime<Utc>,
    responses: &[ScoredResponse],
    grader_details: impl Fn(&str) -> String,
) -> Result<(Uuid, f64), Error> {
    let aggregate_score = mean_score(responses);
    let run_id = Uuid::now_v7();
    let results = responses
        .iter()
        .map(|response| NewResultRow {
            id: Uuid::now_v7(),
            experiment_run_id: run_id,
            test_case_id,
            llm_response: response.response_text.clone(),
            score: Some(response.score),
            grader_details: grader_details(&response.model),
        })
        .collect();
    let run = CompletedExperimentRun {
        id: run_id,
        experiment_id,
        run_name: run_name.to_string(),
        started_at,
        completed_at: Utc::now(),
        aggregate_score,
    };
    db.persist_completed_run(run, results).await?;
    Ok((run_id, aggregate_score))
}

fn to_scored_response(completion: ProviderCompletion, verdict: JudgeVerdict) -> ScoredResponse {
    let time_ms = completion.time_ms();
    ScoredResponse {
        model: completion.model_label,
        response_text: completion.text,
        time_ms,
        score: verdict.score(),
    }
}

fn mean_score(responses: &[ScoredResponse]) -> f64 {
    responses.iter().map(|response| response.score).sum::<f64>() / responses.len() as f64
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::config::{Config, Credential};
    use crate::db::MockExperimentQueries;
    use crate::db::postgres::PostgresConnectionInfo;

    fn config_with_missing_credentials() -> Config {
        Config {
            groq_api_key: Credential::Missing,
            gemini_api_key: Credential::Missing,
            together_api_key: Credential::Missing,
            postgres_url: None,
        }
    }

    fn test_state() -> AppStateData {
        AppStateData::new_with_postgres(
            Arc::new(config_with_missing_credentials()),
            PostgresConnectionInfo::new_disabled(),
        )
        .unwrap()
    }

    // Compile-level check that the handler's state type is `AppStateData`
    // rather than the unit state a bare route would infer.
    #[test]
    fn test_handler_routes_with_app_state() {
        let _router: axum::Router = axum::Router::new()
            .route(
                "/experiment/runOnePrompt",
                axum::routing::post(run_one_prompt_handler),
            )
            .with_state(test_state());
    }

    #[tokio::test]
    async fn test_missing_user_prompt_is_rejected() {
        let state = test_state();
        let error = run_one_prompt_handler(
            State(state),
            Json(RunOnePromptParams { user_prompt: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.to_string(),
            "Missing 'userPrompt' in request body".to_string()
        );
    }

    #[tokio::test]
    async fn test_empty_user_prompt_is_rejected() {
        let state = test_state();
        let error = run_one_prompt_handler(
            State(state),
            Json(RunOnePromptParams {
                user_prompt: Some(String::new()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mock_path_persists_and_reports_canned_data() {
        let state = test_state();
        let mut db = MockExperimentQueries::new();
        db.expect_insert_experiment()
            .withf(|experiment| {
                experiment.name == "Mock Experiment"
                    && experiment.system_prompt == "Mock system prompt"
                    && experiment.model_name == "mock-model"
            })
            .times(1)
            .returning(|_| Ok(()));
        db.expect_insert_test_case()
            .withf(|test_case| {
                test_case.user_message == "What is Rust?"
                    && test_case.expected_output == "Mock expected output"
                    && test_case.grader_type == "mock-grader"
            })
            .times(1)
            .returning(|_| Ok(()));
        db.expect_persist_completed_run()
            .withf(|run, results| {
                run.run_name == "Mock Run"
                    && run.aggregate_score == (4.0 + 3.5 + 3.8) / 3.0
                    && results.len() == 3
                    && results.iter().all(|result| {
                        result.experiment_run_id == run.id
                            && result.llm_response == "Mock: What is Rust?"
                    })
                    && results[0].grader_details
                        == "Mock grader details for mock-llama3-70b-8192"
                    && results[1].score == Some(3.5)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let response = run_one_prompt(&state, &db, "What is Rust?").await.unwrap();

        assert_eq!(response.responses.len(), 3);
        assert_eq!(response.responses[0].model, "mock-llama3-70b-8192");
        assert_eq!(response.responses[1].model, "mock-gemini-1.5-flash");
        assert_eq!(
            response.responses[2].model,
            "mock-mixtral-8x7b-instruct-v0.1"
        );
        assert_eq!(response.responses[0].time_ms, 150);
        assert_eq!(response.responses[1].time_ms, 200);
        assert_eq!(response.responses[2].time_ms, 180);
        assert_eq!(response.responses[0].response_text, "Mock: What is Rust?");
        assert_eq!(response.aggregate_score, (4.0 + 3.5 + 3.8) / 3.0);
    }

    #[tokio::test]
    async fn test_mock_path_propagates_persistence_failures() {
        let state = test_state();
        let mut db = MockExperimentQueries::new();
        db.expect_insert_experiment().times(1).returning(|_| {
            Err(Error::new(ErrorDetails::PostgresQuery {
                message: "connection reset".to_string(),
            }))
        });

        let error = run_one_prompt(&state, &db, "What is Rust?")
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_mean_score() {
        let responses: Vec<ScoredResponse> = MOCK_COMPLETIONS
            .iter()
            .map(|(model, time_ms, score)| ScoredResponse {
                model: model.to_string(),
                response_text: String::new(),
                time_ms: *time_ms,
                score: *score,
            })
            .collect();
        assert_eq!(mean_score(&responses), (4.0 + 3.5 + 3.8) / 3.0);
    }

    #[test]
    fn test_to_scored_response() {
        let completion = ProviderCompletion {
            model_label: "llama3-70b-8192".to_string(),
            text: "Rust is a systems language.".to_string(),
            latency: Duration::from_millis(321),
        };
        let scored = to_scored_response(completion, JudgeVerdict::Scored(4.0));
        assert_eq!(scored.model, "llama3-70b-8192");
        assert_eq!(scored.time_ms, 321);
        assert_eq!(scored.score, 4.0);
    }

    #[test]
    fn test_response_serialization_is_camel_case() {
        let scored = ScoredResponse {
            model: "llama3-70b-8192".to_string(),
            response_text: "hi".to_string(),
            time_ms: 150,
            score: 4.0,
        };
        assert_eq!(
            serde_json::to_value(&scored).unwrap(),
            json!({
                "model": "llama3-70b-8192",
                "responseText": "hi",
                "timeMs": 150,
                "score": 4.0,
            })
        );
    }
}
