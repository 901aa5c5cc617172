//! Completed book records.

use crate::error::{DatabaseError, JobError};
use crate::types::{JobId, Status, UserId};
use crate::{Error, Result};

use super::{Book, Database, NewBook};

const BOOK_COLUMNS: &str =
    "id, user_id, book_id, title, author, archive_path, chapter_count, job_id, created_at";

impl Database {
    /// Mark a `zipping` job completed and register its book in one transaction.
    ///
    /// If the job was deleted (or moved) in the meantime nothing is written and
    /// [`JobError::NotFound`] / [`JobError::InvalidTransition`] is returned, so a
    /// book never appears for a job that no longer exists.
    pub async fn complete_job_with_book(&self, id: JobId, book: &NewBook) -> Result<()> {
        let archive_path = book.archive_path.to_string_lossy().into_owned();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, progress = 100, output_path = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(Status::Completed.to_i32())
        .bind(&archive_path)
        .bind(now)
        .bind(id)
        .bind(Status::Zipping.to_i32())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete job: {}",
                e
            )))
        })?;

        if updated.rows_affected() == 0 {
            drop(tx);
            return Err(match self.get_job(id).await? {
                None => Error::Job(JobError::NotFound { id }),
                Some(job) => Error::Job(JobError::InvalidTransition {
                    id,
                    from: job.status(),
                    to: Status::Completed,
                }),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO books (
                user_id, book_id, title, author, archive_path, chapter_count, job_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book.user_id)
        .bind(&book.book_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&archive_path)
        .bind(i64::from(book.chapter_count))
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert book: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit job completion: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a user's completed book
    pub async fn get_book(&self, user_id: UserId, book_id: &str) -> Result<Option<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE user_id = ? AND book_id = ?",
            BOOK_COLUMNS
        );
        sqlx::query_as::<_, Book>(&sql)
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get book: {}",
                    e
                )))
            })
    }

    /// Whether a completed book exists for (user, book)
    pub async fn book_exists(&self, user_id: UserId, book_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE user_id = ? AND book_id = ?")
                .bind(user_id)
                .bind(book_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check book: {}",
                        e
                    )))
                })?;

        Ok(count > 0)
    }

    /// List a user's completed books, oldest first
    pub async fn list_books(&self, user_id: UserId) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE user_id = ? ORDER BY id ASC",
            BOOK_COLUMNS
        );
        sqlx::query_as::<_, Book>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list books: {}",
                    e
                )))
            })
    }

    /// Delete a book record, returning the removed row
    pub async fn delete_book(&self, user_id: UserId, book_id: &str) -> Result<Option<Book>> {
        let sql = format!(
            "DELETE FROM books WHERE user_id = ? AND book_id = ? RETURNING {}",
            BOOK_COLUMNS
        );
        sqlx::query_as::<_, Book>(&sql)
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete book: {}",
                    e
                )))
            })
    }
}
