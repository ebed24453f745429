use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

/// Result alias for Postgres DAO operations.
pub type PgResult<T> = Result<T, PgDaoError>;

/// Errors raised by the Postgres answer store.
#[derive(Debug, Error)]
pub enum PgDaoError {
    #[error("failed to connect to Postgres")]
    Connect(#[source] sqlx::Error),
    #[error("failed to ensure schema")]
    EnsureSchema(#[source] sqlx::Error),
    #[error("failed to insert answer batch of {count}")]
    InsertAnswers {
        count: usize,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to query answers for quiz {quiz_id}")]
    QueryAnswers {
        quiz_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to look up answer of actor {actor_id} to question {question_id}")]
    QueryAnswer {
        actor_id: Uuid,
        question_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to query questions for quiz {quiz_id}")]
    QueryQuestions {
        quiz_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to query attempts for quiz {quiz_id}")]
    QueryAttempts {
        quiz_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to record attempt for quiz {quiz_id}")]
    RecordAttempt {
        quiz_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to query quiz {quiz_id}")]
    QueryQuiz {
        quiz_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("health ping failed")]
    HealthPing(#[source] sqlx::Error),
}

impl From<PgDaoError> for StorageError {
    fn from(err: PgDaoError) -> Self {
        let message = err.to_string();
        match err {
            PgDaoError::Connect(source) | PgDaoError::HealthPing(source) => {
                StorageError::unavailable(message, source)
            }
            PgDaoError::EnsureSchema(source)
            | PgDaoError::InsertAnswers { source, .. }
            | PgDaoError::QueryAnswers { source, .. }
            | PgDaoError::QueryAnswer { source, .. }
            | PgDaoError::QueryQuestions { source, .. }
            | PgDaoError::QueryAttempts { source, .. }
            | PgDaoError::RecordAttempt { source, .. }
            | PgDaoError::QueryQuiz { source, .. } => StorageError::query(message, source),
        }
    }
}
