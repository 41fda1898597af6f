pub mod connection;

use sqlx::SqlitePool;

use crate::error::Result;

/// Database operations for the question store
pub mod questions {
    use bellhop_types::Question;

    use super::*;

    pub async fn insert(pool: &SqlitePool, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, session_id, title, body, context, thread_id,
                answer, answered_at, created_at, timeout_minutes, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.session_id)
        .bind(&question.title)
        .bind(&question.body)
        .bind(&question.context)
        .bind(&question.thread_id)
        .bind(&question.answer)
        .bind(&question.answered_at)
        .bind(&question.created_at)
        .bind(question.timeout_minutes)
        .bind(&question.status)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<Question>> {
        let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(question)
    }

    /// Load every pending question, oldest first. The recovery path.
    pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT * FROM questions WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(questions)
    }

    /// Record the chat thread a question was delivered into.
    pub async fn set_thread(pool: &SqlitePool, id: &str, thread_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE questions SET thread_id = ? WHERE id = ?")
            .bind(thread_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a terminal transition. The `status = 'pending'` guard makes the
    /// write a no-op when another transition already won.
    pub async fn mark_terminal(
        pool: &SqlitePool,
        id: &str,
        status: &str,
        answer: Option<&str>,
        answered_at: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE questions
            SET status = ?, answer = ?, answered_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(answer)
        .bind(answered_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every terminal row. Run at startup so the store never
    /// accumulates resolved questions across restarts.
    pub async fn prune_terminal(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM questions WHERE status != 'pending'")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
