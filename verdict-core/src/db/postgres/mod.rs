use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::db::{
    CompletedExperimentRun, ExperimentQueries, ExperimentRow, NewResultRow, StoredResultRow,
    TestCaseRow,
};
use crate::error::{Error, ErrorDetails};

#[derive(Clone, Debug)]
pub enum PostgresConnectionInfo {
    Enabled { pool: PgPool },
    Disabled,
}

impl PostgresConnectionInfo {
    /// Connects to Postgres and runs any pending embedded migrations.
    pub async fn new(postgres_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new().connect(postgres_url).await.map_err(|e| {
            Error::new(ErrorDetails::PostgresConnection {
                message: e.to_string(),
            })
        })?;
        sqlx::migrate!("src/db/postgres/migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::PostgresMigration {
                    message: e.to_string(),
                })
            })?;
        Ok(Self::Enabled { pool })
    }

    pub fn new_with_pool(pool: PgPool) -> Self {
        Self::Enabled { pool }
    }

    pub fn new_disabled() -> Self {
        Self::Disabled
    }

    fn get_pool_result(&self) -> Result<&PgPool, Error> {
        match self {
            Self::Enabled { pool } => Ok(pool),
            Self::Disabled => Err(Error::new(ErrorDetails::PostgresConnection {
                message: "Postgres connection is disabled (DATABASE_URL is not set)".to_string(),
            })),
        }
    }
}

#[async_trait]
impl ExperimentQueries for PostgresConnectionInfo {
    async fn insert_experiment(&self, experiment: ExperimentRow) -> Result<(), Error> {
        let pool = self.get_pool_result()?;
        sqlx::query(
            r"
            INSERT INTO verdict.experiments (id, name, system_prompt, model_name)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(experiment.id)
        .bind(&experiment.name)
        .bind(&experiment.system_prompt)
        .bind(&experiment.model_name)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn insert_test_case(&self, test_case: TestCaseRow) -> Result<(), Error> {
        let pool = self.get_pool_result()?;
        sqlx::query(
            r"
            INSERT INTO verdict.test_cases (id, user_message, expected_output, grader_type)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(test_case.id)
        .bind(&test_case.user_message)
        .bind(&test_case.expected_output)
        .bind(&test_case.grader_type)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn persist_completed_run(
        &self,
        run: CompletedExperimentRun,
        results: Vec<NewResultRow>,
    ) -> Result<(), Error> {
        let pool = self.get_pool_result()?;
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO verdict.experiment_runs (id, experiment_id, run_name, started_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(run.id)
        .bind(run.experiment_id)
        .bind(&run.run_name)
        .bind(run.started_at)
        .execute(&mut *tx)
        .await?;

        for result in &results {
            sqlx::query(
                r"
                INSERT INTO verdict.results
                    (id, experiment_run_id, test_case_id, llm_response, score, grader_details)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(result.id)
            .bind(result.experiment_run_id)
            .bind(result.test_case_id)
            .bind(&result.llm_response)
            .bind(result.score)
            .bind(&result.grader_details)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
            UPDATE verdict.experiment_runs
            SET completed_at = $2, aggregate_score = $3
            WHERE id = $1
            ",
        )
        .bind(run.id)
        .bind(run.completed_at)
        .bind(run.aggregate_score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_all_results(&self) -> Result<Vec<StoredResultRow>, Error> {
        let pool = self.get_pool_result()?;
        let rows = sqlx::query_as(
            r"
            SELECT id, score, grader_details FROM verdict.results
            ",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_disabled_connection_rejects_queries() {
        let connection = PostgresConnectionInfo::new_disabled();
        let error = connection.get_all_results().await.unwrap_err();
        match error.get_details() {
            ErrorDetails::PostgresConnection { message } => {
                assert!(message.contains("disabled"));
            }
            _ => panic!("Expected PostgresConnection variant"),
        }

        let error = connection
            .insert_experiment(ExperimentRow {
                id: Uuid::now_v7(),
                name: "Real Experiment".to_string(),
                system_prompt: "You are a helpful AI assistant.".to_string(),
                model_name: "multi-model".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            error.get_details(),
            ErrorDetails::PostgresConnection { .. }
        ));
    }
}
