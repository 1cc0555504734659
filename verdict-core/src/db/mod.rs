use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::error::Error;

pub mod postgres;

/// One experiment definition. Created once per incoming request, immutable
/// after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRow {
    pub id: Uuid,
    pub name: String,
    pub system_prompt: String,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseRow {
    pub id: Uuid,
    pub user_message: String,
    pub expected_output: String,
    pub grader_type: String,
}

/// A finished run, written together with its results in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedExperimentRun {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub run_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub aggregate_score: f64,
}

/// One provider response with its judge score. Created once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResultRow {
    pub id: Uuid,
    pub experiment_run_id: Uuid,
    pub test_case_id: Uuid,
    pub llm_response: String,
    pub score: Option<f64>,
    pub grader_details: String,
}

/// The slice of a stored result the aggregate reporter needs.
///
/// `grader_details` is the only durable link between a result and the
/// provider that produced it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredResultRow {
    pub id: Uuid,
    pub score: Option<f64>,
    pub grader_details: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentQueries: Send + Sync {
    async fn insert_experiment(&self, experiment: ExperimentRow) -> Result<(), Error>;

    async fn insert_test_case(&self, test_case: TestCaseRow) -> Result<(), Error>;

    /// Writes the run, its result rows, and the completion update atomically:
    /// a failure on any step rolls the whole write back, so a stored run
    /// always carries all of its results and its aggregate score.
    async fn persist_completed_run(
        &self,
        run: CompletedExperimentRun,
        results: Vec<NewResultRow>,
    ) -> Result<(), Error>;

    async fn get_all_results(&self) -> Result<Vec<StoredResultRow>, Error>;
}
