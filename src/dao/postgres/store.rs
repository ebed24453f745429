use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{
    PgPool, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::{PgDaoError, PgResult};
use crate::dao::{
    answer_store::AnswerStore,
    models::{ActorTotals, AnswerRecord, AttemptRow, NewAttempt, QuestionPositionRow, VoteAggregateRow},
    storage::StorageResult,
};

const MAX_CONNECTIONS: u32 = 8;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema statements applied at connection time. The quiz and question
/// tables are owned by the CRUD surface; create-if-absent keeps a
/// standalone deployment bootable.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS answers (
        attempt_id UUID NOT NULL,
        actor_id UUID NOT NULL,
        question_id UUID NOT NULL,
        quiz_id UUID NOT NULL,
        option_index INT NOT NULL,
        is_correct BOOLEAN NOT NULL,
        time_left INT NOT NULL,
        score INT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (actor_id, question_id)
    )",
    "CREATE INDEX IF NOT EXISTS answers_quiz_idx ON answers (quiz_id)",
    "CREATE TABLE IF NOT EXISTS quiz_attempts (
        id UUID PRIMARY KEY,
        quiz_id UUID NOT NULL,
        actor_id UUID NOT NULL,
        display_name TEXT NOT NULL,
        total_score BIGINT NOT NULL,
        correct_count BIGINT NOT NULL,
        total_questions BIGINT NOT NULL,
        is_first_attempt BOOLEAN NOT NULL,
        completed_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS quiz_attempts_quiz_idx
        ON quiz_attempts (quiz_id, is_first_attempt)",
    "CREATE TABLE IF NOT EXISTS quiz_questions (
        question_id UUID PRIMARY KEY,
        quiz_id UUID NOT NULL,
        position INT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS quiz_questions_quiz_idx ON quiz_questions (quiz_id)",
    "CREATE TABLE IF NOT EXISTS quizzes (
        id UUID PRIMARY KEY,
        expires_at TIMESTAMPTZ NOT NULL
    )",
];

#[derive(Clone)]
/// Postgres-backed [`AnswerStore`] built on a shared connection pool.
pub struct PostgresAnswerStore {
    pool: PgPool,
}

impl PostgresAnswerStore {
    /// Establish a connection pool and ensure the schema is present.
    pub async fn connect(database_url: &str) -> PgResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(PgDaoError::Connect)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> PgResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(PgDaoError::EnsureSchema)?;
        }
        Ok(())
    }

    async fn insert_answers(&self, answers: Vec<AnswerRecord>) -> PgResult<u64> {
        if answers.is_empty() {
            return Ok(0);
        }

        let count = answers.len();
        let mut builder = QueryBuilder::new(
            "INSERT INTO answers \
             (attempt_id, actor_id, question_id, quiz_id, option_index, is_correct, time_left, score) ",
        );
        builder.push_values(answers.iter(), |mut row, answer| {
            row.push_bind(answer.attempt_id)
                .push_bind(answer.actor_id)
                .push_bind(answer.question_id)
                .push_bind(answer.quiz_id)
                .push_bind(answer.option_index)
                .push_bind(answer.is_correct)
                .push_bind(answer.time_left)
                .push_bind(answer.score);
        });
        builder.push(" ON CONFLICT (actor_id, question_id) DO NOTHING");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| PgDaoError::InsertAnswers { count, source })?;

        Ok(result.rows_affected())
    }

    async fn has_answer(&self, actor_id: Uuid, question_id: Uuid) -> PgResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM answers WHERE actor_id = $1 AND question_id = $2) AS found",
        )
        .bind(actor_id)
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryAnswer {
            actor_id,
            question_id,
            source,
        })?;

        row.try_get("found").map_err(|source| PgDaoError::QueryAnswer {
            actor_id,
            question_id,
            source,
        })
    }

    async fn vote_aggregates(&self, quiz_id: Uuid) -> PgResult<Vec<VoteAggregateRow>> {
        let rows = sqlx::query(
            "SELECT question_id, option_index, COUNT(*) AS votes
             FROM answers WHERE quiz_id = $1
             GROUP BY question_id, option_index",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryAnswers { quiz_id, source })?;

        rows.into_iter()
            .map(|row| {
                Ok(VoteAggregateRow {
                    question_id: row.try_get("question_id")?,
                    option_index: row.try_get("option_index")?,
                    votes: row.try_get("votes")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|source| PgDaoError::QueryAnswers { quiz_id, source })
    }

    async fn question_positions(&self, quiz_id: Uuid) -> PgResult<Vec<QuestionPositionRow>> {
        let rows = sqlx::query(
            "SELECT question_id, position FROM quiz_questions
             WHERE quiz_id = $1 ORDER BY position",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryQuestions { quiz_id, source })?;

        rows.into_iter()
            .map(|row| {
                Ok(QuestionPositionRow {
                    question_id: row.try_get("question_id")?,
                    position: row.try_get("position")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|source| PgDaoError::QueryQuestions { quiz_id, source })
    }

    async fn question_count(&self, quiz_id: Uuid) -> PgResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM quiz_questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| PgDaoError::QueryQuestions { quiz_id, source })?;

        row.try_get("total")
            .map_err(|source| PgDaoError::QueryQuestions { quiz_id, source })
    }

    async fn actor_totals(&self, quiz_id: Uuid, actor_id: Uuid) -> PgResult<ActorTotals> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(score), 0)::BIGINT AS score_sum,
                    COUNT(*) FILTER (WHERE is_correct) AS correct_count
             FROM answers WHERE quiz_id = $1 AND actor_id = $2",
        )
        .bind(quiz_id)
        .bind(actor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryAnswers { quiz_id, source })?;

        let totals = ActorTotals {
            score_sum: row
                .try_get("score_sum")
                .map_err(|source| PgDaoError::QueryAnswers { quiz_id, source })?,
            correct_count: row
                .try_get("correct_count")
                .map_err(|source| PgDaoError::QueryAnswers { quiz_id, source })?,
        };
        Ok(totals)
    }

    async fn find_attempt(&self, quiz_id: Uuid, actor_id: Uuid) -> PgResult<Option<AttemptRow>> {
        let row = sqlx::query(
            "SELECT actor_id, display_name, total_score, completed_at
             FROM quiz_attempts WHERE quiz_id = $1 AND actor_id = $2
             ORDER BY completed_at ASC LIMIT 1",
        )
        .bind(quiz_id)
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryAttempts { quiz_id, source })?;

        row.map(|row| attempt_from_row(&row))
            .transpose()
            .map_err(|source| PgDaoError::QueryAttempts { quiz_id, source })
    }

    async fn record_attempt(&self, attempt: NewAttempt) -> PgResult<AttemptRow> {
        let quiz_id = attempt.quiz_id;
        let row = sqlx::query(
            "INSERT INTO quiz_attempts
             (id, quiz_id, actor_id, display_name, total_score, correct_count, total_questions, is_first_attempt)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING actor_id, display_name, total_score, completed_at",
        )
        .bind(attempt.id)
        .bind(attempt.quiz_id)
        .bind(attempt.actor_id)
        .bind(&attempt.display_name)
        .bind(attempt.total_score)
        .bind(attempt.correct_count)
        .bind(attempt.total_questions)
        .bind(attempt.is_first_attempt)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| PgDaoError::RecordAttempt { quiz_id, source })?;

        attempt_from_row(&row).map_err(|source| PgDaoError::RecordAttempt { quiz_id, source })
    }

    async fn first_attempts(&self, quiz_id: Uuid) -> PgResult<Vec<AttemptRow>> {
        let rows = sqlx::query(
            "SELECT actor_id, display_name, total_score, completed_at
             FROM quiz_attempts WHERE quiz_id = $1 AND is_first_attempt
             ORDER BY total_score DESC, completed_at ASC",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| PgDaoError::QueryAttempts { quiz_id, source })?;

        rows.iter()
            .map(attempt_from_row)
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|source| PgDaoError::QueryAttempts { quiz_id, source })
    }

    async fn quiz_expiry(&self, quiz_id: Uuid) -> PgResult<Option<OffsetDateTime>> {
        let row = sqlx::query("SELECT expires_at FROM quizzes WHERE id = $1")
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| PgDaoError::QueryQuiz { quiz_id, source })?;

        row.map(|row| row.try_get("expires_at"))
            .transpose()
            .map_err(|source| PgDaoError::QueryQuiz { quiz_id, source })
    }

    async fn ping(&self) -> PgResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PgDaoError::HealthPing)?;
        Ok(())
    }
}

fn attempt_from_row(row: &PgRow) -> Result<AttemptRow, sqlx::Error> {
    Ok(AttemptRow {
        actor_id: row.try_get("actor_id")?,
        display_name: row.try_get("display_name")?,
        total_score: row.try_get("total_score")?,
        completed_at: row.try_get("completed_at")?,
    })
}

impl AnswerStore for PostgresAnswerStore {
    fn insert_answers(&self, answers: Vec<AnswerRecord>) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.insert_answers(answers).await.map_err(Into::into) })
    }

    fn has_answer(
        &self,
        actor_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .has_answer(actor_id, question_id)
                .await
                .map_err(Into::into)
        })
    }

    fn vote_aggregates(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteAggregateRow>>> {
        let store = self.clone();
        Box::pin(async move { store.vote_aggregates(quiz_id).await.map_err(Into::into) })
    }

    fn question_positions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionPositionRow>>> {
        let store = self.clone();
        Box::pin(async move { store.question_positions(quiz_id).await.map_err(Into::into) })
    }

    fn question_count(&self, quiz_id: Uuid) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move { store.question_count(quiz_id).await.map_err(Into::into) })
    }

    fn actor_totals(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<ActorTotals>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .actor_totals(quiz_id, actor_id)
                .await
                .map_err(Into::into)
        })
    }

    fn find_attempt(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptRow>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_attempt(quiz_id, actor_id)
                .await
                .map_err(Into::into)
        })
    }

    fn record_attempt(&self, attempt: NewAttempt) -> BoxFuture<'static, StorageResult<AttemptRow>> {
        let store = self.clone();
        Box::pin(async move { store.record_attempt(attempt).await.map_err(Into::into) })
    }

    fn first_attempts(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AttemptRow>>> {
        let store = self.clone();
        Box::pin(async move { store.first_attempts(quiz_id).await.map_err(Into::into) })
    }

    fn quiz_expiry(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<OffsetDateTime>>> {
        let store = self.clone();
        Box::pin(async move { store.quiz_expiry(quiz_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        // The sqlx pool re-establishes broken connections on acquire, so a
        // successful ping doubles as a reconnect.
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
