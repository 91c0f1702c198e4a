use quiz_core::model::{AttemptId, InputId, SessionId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{InputRecord, LearningSession, QuestionAttempt, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

pub(crate) fn input_id_from_i64(v: i64) -> Result<InputId, StorageError> {
    Ok(InputId::new(i64_to_u64("input_id", v)?))
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<LearningSession, StorageError> {
    Ok(LearningSession {
        id: session_id_from_i64(row.try_get("id").map_err(ser)?)?,
        anonymous_id: row.try_get("anonymous_id").map_err(ser)?,
        page_url: row.try_get("page_url").map_err(ser)?,
        user_agent: row.try_get("user_agent").map_err(ser)?,
        started_at: row.try_get("session_start").map_err(ser)?,
        ended_at: row.try_get("session_end").map_err(ser)?,
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<QuestionAttempt, StorageError> {
    let attempt_number: i64 = row.try_get("attempt_number").map_err(ser)?;
    let attempt_number = u32::try_from(attempt_number).map_err(|_| {
        StorageError::Serialization(format!("invalid attempt_number: {attempt_number}"))
    })?;

    Ok(QuestionAttempt {
        id: attempt_id_from_i64(row.try_get("id").map_err(ser)?)?,
        session_id: session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        question_file: row.try_get("question_file").map_err(ser)?,
        question_name: row.try_get("question_name").map_err(ser)?,
        question_prefix: row.try_get("question_prefix").map_err(ser)?,
        seed: row.try_get("seed").map_err(ser)?,
        attempt_number,
        started_at: row.try_get("started_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
        max_score: row.try_get("max_score").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
    })
}

pub(crate) fn map_input_row(row: &SqliteRow) -> Result<InputRecord, StorageError> {
    Ok(InputRecord {
        id: input_id_from_i64(row.try_get("id").map_err(ser)?)?,
        attempt_id: attempt_id_from_i64(row.try_get("attempt_id").map_err(ser)?)?,
        session_id: session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        input_name: row.try_get("input_name").map_err(ser)?,
        input_value: row.try_get("input_value").map_err(ser)?,
        input_type: row.try_get("input_type").map_err(ser)?,
        is_final_answer: row.try_get("is_final_answer").map_err(ser)?,
        validation_result: row.try_get("validation_result").map_err(ser)?,
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
    })
}
