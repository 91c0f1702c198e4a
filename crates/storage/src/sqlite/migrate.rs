use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs versioned migrations for the attempt-tracking schema.
///
/// Version 1 creates learning sessions, question attempts, input tracking and
/// their lookup indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    tracing::info!(version = 1, "applying tracking schema migration");
    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS learning_sessions (
                id INTEGER PRIMARY KEY,
                anonymous_id TEXT NOT NULL,
                page_url TEXT,
                user_agent TEXT,
                session_start TEXT NOT NULL,
                session_end TEXT
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS question_attempts (
                id INTEGER PRIMARY KEY,
                session_id INTEGER NOT NULL,
                question_file TEXT NOT NULL,
                question_name TEXT,
                question_prefix TEXT NOT NULL,
                seed INTEGER,
                attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
                started_at TEXT NOT NULL,
                submitted_at TEXT,
                score REAL,
                max_score REAL,
                is_correct INTEGER,
                UNIQUE (session_id, question_prefix, attempt_number),
                FOREIGN KEY (session_id) REFERENCES learning_sessions(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS input_tracking (
                id INTEGER PRIMARY KEY,
                attempt_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL,
                input_name TEXT NOT NULL,
                input_value TEXT NOT NULL,
                input_type TEXT NOT NULL,
                is_final_answer INTEGER NOT NULL DEFAULT 0,
                validation_result TEXT,
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (attempt_id) REFERENCES question_attempts(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES learning_sessions(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_question_attempts_session_prefix
                ON question_attempts (session_id, question_prefix, attempt_number);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_input_tracking_attempt
                ON input_tracking (attempt_id, recorded_at);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
