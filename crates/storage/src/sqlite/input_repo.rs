use quiz_core::model::AttemptId;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, input_id_from_i64, map_input_row, session_id_from_i64};
use crate::repository::{InputRecord, InputRepository, NewInput, StorageError};

#[async_trait::async_trait]
impl InputRepository for SqliteRepository {
    async fn track_input(&self, input: NewInput) -> Result<InputRecord, StorageError> {
        let attempt_id = id_i64("attempt_id", input.attempt_id.value())?;
        let session_id = id_i64("session_id", input.session_id.value())?;

        let owner: Option<i64> =
            sqlx::query_scalar("SELECT session_id FROM question_attempts WHERE id = ?1")
                .bind(attempt_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?;
        match owner {
            None => return Err(StorageError::NotFound),
            Some(owner) if session_id_from_i64(owner)? != input.session_id => {
                return Err(StorageError::Conflict);
            }
            Some(_) => {}
        }

        let res = sqlx::query(
            r"
                INSERT INTO input_tracking (
                    attempt_id, session_id, input_name, input_value, input_type,
                    is_final_answer, validation_result, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(attempt_id)
        .bind(session_id)
        .bind(&input.input_name)
        .bind(&input.input_value)
        .bind(&input.input_type)
        .bind(input.is_final_answer)
        .bind(input.validation_result.as_deref())
        .bind(input.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(InputRecord {
            id: input_id_from_i64(res.last_insert_rowid())?,
            attempt_id: input.attempt_id,
            session_id: input.session_id,
            input_name: input.input_name,
            input_value: input.input_value,
            input_type: input.input_type,
            is_final_answer: input.is_final_answer,
            validation_result: input.validation_result,
            recorded_at: input.recorded_at,
        })
    }

    async fn list_inputs(&self, attempt_id: AttemptId) -> Result<Vec<InputRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, attempt_id, session_id, input_name, input_value, input_type,
                    is_final_answer, validation_result, recorded_at
                FROM input_tracking
                WHERE attempt_id = ?1
                ORDER BY recorded_at ASC, id ASC
            ",
        )
        .bind(id_i64("attempt_id", attempt_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_input_row(&row)?);
        }
        Ok(out)
    }
}
