use std::collections::HashMap;

use axum::debug_handler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};

use crate::db::{ExperimentQueries, StoredResultRow};
use crate::error::Error;
use crate::gateway_util::{AppState, AppStateData};

/// Known model labels, scanned in fixed priority order; the first label found
/// as a substring of the grader details wins.
const KNOWN_MODEL_LABELS: [&str; 3] = [
    "llama3-70b-8192",
    "gemini-1.5-flash",
    "mixtral-8x7b-instruct-v0.1",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateScoresResponse {
    pub aggregate_scores: HashMap<String, f64>,
}

#[debug_handler(state = AppStateData)]
pub async fn aggregate_scores_handler(
    State(state): AppState,
) -> Result<Json<AggregateScoresResponse>, (StatusCode, Json<Value>)> {
    match fetch_aggregate_scores(&state.postgres).await {
        Ok(aggregate_scores) => Ok(Json(AggregateScoresResponse { aggregate_scores })),
        Err(_) => {
            // The underlying error was logged when it was constructed.
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to calculate aggregate scores for LLMs"})),
            ))
        }
    }
}

pub async fn fetch_aggregate_scores(
    db: &impl ExperimentQueries,
) -> Result<HashMap<String, f64>, Error> {
    let results = db.get_all_results().await?;
    Ok(compute_aggregate_scores(&results))
}

/// Reattributes each stored result to a model by scanning its grader details,
/// then averages the scores per model. Results with no recognizable model or
/// no score are skipped.
fn compute_aggregate_scores(results: &[StoredResultRow]) -> HashMap<String, f64> {
    let mut totals: HashMap<&'static str, (f64, u64)> = HashMap::new();
    for result in results {
        let Some(model_label) = result
            .grader_details
            .as_deref()
            .and_then(classify_model_label)
        else {
            tracing::warn!(
                "Skipping result {} with unattributable grader details {:?}",
                result.id,
                result.grader_details
            );
            continue;
        };
        let Some(score) = result.score else {
            tracing::warn!("Skipping result {} with no score", result.id);
            continue;
        };
        let entry = totals.entry(model_label).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|(label, (total, count))| (label.to_string(), total / count as f64))
        .collect()
}

fn classify_model_label(grader_details: &str) -> Option<&'static str> {
    let lowercased = grader_details.to_lowercase();
    KNOWN_MODEL_LABELS
        .iter()
        .copied()
        .find(|label| lowercased.contains(*label))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::config::{Config, Credential};
    use crate::db::MockExperimentQueries;
    use crate::db::postgres::PostgresConnectionInfo;
    use crate::error::ErrorDetails;

    // Compile-level check that the handler's state type is `AppStateData`
    // rather than the unit state a bare route would infer.
    #[test]
    fn test_handler_routes_with_app_state() {
        let config = Config {
            groq_api_key: Credential::Missing,
            gemini_api_key: Credential::Missing,
            together_api_key: Credential::Missing,
            postgres_url: None,
        };
        let state = AppStateData::new_with_postgres(
            Arc::new(config),
            PostgresConnectionInfo::new_disabled(),
        )
        .unwrap();
        let _router: axum::Router = axum::Router::new()
            .route(
                "/llm/aggregateScores",
                axum::routing::get(aggregate_scores_handler),
            )
            .with_state(state);
    }

    fn result_row(score: Option<f64>, grader_details: Option<&str>) -> StoredResultRow {
        StoredResultRow {
            id: Uuid::now_v7(),
            score,
            grader_details: grader_details.map(str::to_string),
        }
    }

    #[test]
    fn test_compute_aggregate_scores_empty() {
        assert!(compute_aggregate_scores(&[]).is_empty());
    }

    #[test]
    fn test_compute_aggregate_scores_averages_per_model() {
        let results = vec![
            result_row(Some(4.0), Some("Graded by Gemini for llama3-70b-8192")),
            result_row(Some(2.0), Some("Graded by Gemini for llama3-70b-8192")),
            result_row(Some(3.5), Some("Graded by Gemini for gemini-1.5-flash")),
            result_row(
                Some(3.8),
                Some("Mock grader details for mock-mixtral-8x7b-instruct-v0.1"),
            ),
        ];
        let scores = compute_aggregate_scores(&results);
        assert_eq!(scores.len(), 3);
        assert_eq!(scores["llama3-70b-8192"], 3.0);
        assert_eq!(scores["gemini-1.5-flash"], 3.5);
        assert_eq!(scores["mixtral-8x7b-instruct-v0.1"], 3.8);
    }

    #[test]
    fn test_compute_aggregate_scores_skips_unusable_rows() {
        let results = vec![
            result_row(Some(4.0), Some("Graded by a human")),
            result_row(None, Some("Graded by Gemini for llama3-70b-8192")),
            result_row(Some(4.0), None),
        ];
        assert!(compute_aggregate_scores(&results).is_empty());
    }

    #[test]
    fn test_classify_model_label_priority_and_case() {
        // Earlier labels win when several match.
        assert_eq!(
            classify_model_label("llama3-70b-8192 vs gemini-1.5-flash"),
            Some("llama3-70b-8192")
        );
        assert_eq!(
            classify_model_label("Graded by Gemini for LLAMA3-70B-8192"),
            Some("llama3-70b-8192")
        );
        assert_eq!(classify_model_label("some other model"), None);
    }

    #[tokio::test]
    async fn test_fetch_aggregate_scores() {
        let mut db = MockExperimentQueries::new();
        db.expect_get_all_results().times(1).returning(|| {
            Ok(vec![StoredResultRow {
                id: Uuid::now_v7(),
                score: Some(4.0),
                grader_details: Some("Graded by Gemini for llama3-70b-8192".to_string()),
            }])
        });
        let scores = fetch_aggregate_scores(&db).await.unwrap();
        assert_eq!(scores["llama3-70b-8192"], 4.0);
    }

    #[tokio::test]
    async fn test_fetch_aggregate_scores_propagates_query_errors() {
        let mut db = MockExperimentQueries::new();
        db.expect_get_all_results().times(1).returning(|| {
            Err(Error::new(ErrorDetails::PostgresQuery {
                message: "relation does not exist".to_string(),
            }))
        });
        assert!(fetch_aggregate_scores(&db).await.is_err());
    }
}
