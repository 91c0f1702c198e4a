use quiz_core::model::{AttemptId, SessionId};

use super::SqliteRepository;
use super::mapping::{attempt_id_from_i64, conn, id_i64, map_attempt_row};
use crate::repository::{
    AttemptRepository, AttemptSubmission, NewAttempt, QuestionAttempt, StorageError,
};

const ATTEMPT_COLUMNS: &str = r"
    id, session_id, question_file, question_name, question_prefix, seed,
    attempt_number, started_at, submitted_at, score, max_score, is_correct
";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<QuestionAttempt, StorageError> {
        let session_id = id_i64("session_id", attempt.session_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let exists = sqlx::query("SELECT 1 FROM learning_sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let previous: i64 = sqlx::query_scalar(
            r"
                SELECT COALESCE(MAX(attempt_number), 0)
                FROM question_attempts
                WHERE session_id = ?1 AND question_prefix = ?2
            ",
        )
        .bind(session_id)
        .bind(&attempt.question_prefix)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let attempt_number = u32::try_from(previous + 1)
            .map_err(|_| StorageError::Serialization("attempt_number overflow".into()))?;

        let res = sqlx::query(
            r"
                INSERT INTO question_attempts (
                    session_id, question_file, question_name, question_prefix,
                    seed, attempt_number, started_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(session_id)
        .bind(&attempt.question_file)
        .bind(attempt.question_name.as_deref())
        .bind(&attempt.question_prefix)
        .bind(attempt.seed)
        .bind(i64::from(attempt_number))
        .bind(attempt.started_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        Ok(QuestionAttempt {
            id: attempt_id_from_i64(res.last_insert_rowid())?,
            session_id: attempt.session_id,
            question_file: attempt.question_file,
            question_name: attempt.question_name,
            question_prefix: attempt.question_prefix,
            seed: attempt.seed,
            attempt_number,
            started_at: attempt.started_at,
            submitted_at: None,
            score: None,
            max_score: None,
            is_correct: None,
        })
    }

    async fn submit_attempt(
        &self,
        id: AttemptId,
        submission: AttemptSubmission,
    ) -> Result<QuestionAttempt, StorageError> {
        let res = sqlx::query(
            r"
                UPDATE question_attempts
                SET submitted_at = ?2, score = ?3, max_score = ?4, is_correct = ?5
                WHERE id = ?1
            ",
        )
        .bind(id_i64("attempt_id", id.value())?)
        .bind(submission.submitted_at)
        .bind(submission.score)
        .bind(submission.max_score)
        .bind(submission.is_correct)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.get_attempt(id).await
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<QuestionAttempt, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM question_attempts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("attempt_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }

    async fn list_attempts(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<QuestionAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM question_attempts WHERE session_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("session_id", session_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }

    async fn latest_attempt(
        &self,
        session_id: SessionId,
        question_prefix: &str,
    ) -> Result<Option<QuestionAttempt>, StorageError> {
        let sql = format!(
            r"
                SELECT {ATTEMPT_COLUMNS}
                FROM question_attempts
                WHERE session_id = ?1 AND question_prefix = ?2
                ORDER BY attempt_number DESC
                LIMIT 1
            "
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("session_id", session_id.value())?)
            .bind(question_prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }
}
