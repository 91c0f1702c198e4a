use chrono::{DateTime, Utc};
use quiz_core::model::SessionId;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_session_row, session_id_from_i64};
use crate::repository::{LearningSession, LearningSessionRepository, NewSession, StorageError};

#[async_trait::async_trait]
impl LearningSessionRepository for SqliteRepository {
    async fn start_session(&self, session: NewSession) -> Result<LearningSession, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO learning_sessions (anonymous_id, page_url, user_agent, session_start)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(&session.anonymous_id)
        .bind(session.page_url.as_deref())
        .bind(session.user_agent.as_deref())
        .bind(session.started_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(LearningSession {
            id: session_id_from_i64(res.last_insert_rowid())?,
            anonymous_id: session.anonymous_id,
            page_url: session.page_url,
            user_agent: session.user_agent,
            started_at: session.started_at,
            ended_at: None,
        })
    }

    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let session_id = id_i64("session_id", id.value())?;
        let res = sqlx::query(
            r"
                UPDATE learning_sessions
                SET session_end = ?2
                WHERE id = ?1 AND session_end IS NULL
            ",
        )
        .bind(session_id)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            // Distinguish a missing session from one that already ended.
            self.get_session(id).await?;
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<LearningSession, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, anonymous_id, page_url, user_agent, session_start, session_end
                FROM learning_sessions
                WHERE id = ?1
            ",
        )
        .bind(id_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }
}
