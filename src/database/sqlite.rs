use crate::errors::{AppError, Result};
use crate::models::submission::{
    DocType, Document, Review, ReviewDecision, Submission, SubmissionStatus,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

/// Transactional persistence boundary for submissions, documents, and
/// reviews. All state-machine invariants are enforced here: a submission and
/// its documents are written in one transaction, a review exists at most once
/// per submission, and only a pending submission can be decided.
#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database directory: {}", e))
            })?;
        }
        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database file: {}", e))
            })?;
        }
        let database_url = format!("sqlite:{}", database_path);

        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;

        tracing::info!(path = database_path, "connected to sqlite database");
        Ok(db)
    }

    /// Single-connection in-memory database, for tests and local experiments.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                face_match_score REAL,
                face_match_passed INTEGER,
                ocr_provider TEXT,
                ocr_error TEXT,
                auto_approved INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                reviewed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                file_url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (submission_id) REFERENCES submissions (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                submission_id TEXT UNIQUE NOT NULL,
                reviewed_by TEXT NOT NULL,
                decision TEXT NOT NULL,
                note TEXT,
                reviewed_at TEXT NOT NULL,
                FOREIGN KEY (submission_id) REFERENCES submissions (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role_code TEXT NOT NULL,
                PRIMARY KEY (user_id, role_code)
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_user_id ON submissions(user_id);
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);
            CREATE INDEX IF NOT EXISTS idx_documents_submission_id ON documents(submission_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_submission_id ON reviews(submission_id);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }

    // ---- roles ----

    pub async fn assign_role(&self, user_id: &Uuid, role_code: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_code) VALUES (?1, ?2)")
            .bind(user_id.to_string())
            .bind(role_code)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to assign role: {}", e)))?;
        Ok(())
    }

    pub async fn get_role_code_by_user(&self, user_id: &Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT role_code FROM user_roles WHERE user_id = ?1 LIMIT 1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch role: {}", e)))?;
        Ok(row.map(|r| r.get("role_code")))
    }

    // ---- submissions ----

    /// Write the submission row and all document rows in one transaction.
    /// If any document insert fails, the submission row does not persist.
    pub async fn create_submission_with_documents(
        &self,
        sub: &Submission,
        docs: &[Document],
    ) -> Result<()> {
        if docs.is_empty() {
            return Err(AppError::ValidationError(
                "documents are required".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO submissions
                (id, user_id, status, face_match_score, face_match_passed,
                 ocr_provider, ocr_error, auto_approved, created_at, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(sub.id.to_string())
        .bind(sub.user_id.to_string())
        .bind(sub.status.as_str())
        .bind(sub.face_match_score)
        .bind(sub.face_match_passed)
        .bind(&sub.ocr_provider)
        .bind(&sub.ocr_error)
        .bind(sub.auto_approved)
        .bind(sub.created_at.to_rfc3339())
        .bind(sub.reviewed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create submission: {}", e)))?;

        for doc in docs {
            sqlx::query(
                r#"
                INSERT INTO documents (id, submission_id, doc_type, file_url, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(doc.id.to_string())
            .bind(sub.id.to_string())
            .bind(doc.doc_type.as_str())
            .bind(&doc.file_url)
            .bind(doc.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create document: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit submission: {}", e)))?;
        Ok(())
    }

    /// Most recent submission for the user, with documents and review
    /// attached. `None` when the user never submitted.
    pub async fn find_latest_by_user(&self, user_id: &Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query(
            "SELECT * FROM submissions WHERE user_id = ?1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch submission: {}", e)))?;

        match row {
            Some(row) => {
                let sub = self.attach_relations(map_submission(&row)?).await?;
                Ok(Some(sub))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_id(&self, submission_id: &Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query("SELECT * FROM submissions WHERE id = ?1")
            .bind(submission_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch submission: {}", e)))?;

        match row {
            Some(row) => {
                let sub = self.attach_relations(map_submission(&row)?).await?;
                Ok(Some(sub))
            }
            None => Ok(None),
        }
    }

    /// Admin queue: pending submissions, oldest first.
    pub async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<Submission>> {
        let rows = sqlx::query(
            "SELECT * FROM submissions WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(SubmissionStatus::Pending.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list submissions: {}", e)))?;

        let mut subs = Vec::with_capacity(rows.len());
        for row in &rows {
            subs.push(self.attach_relations(map_submission(row)?).await?);
        }
        Ok(subs)
    }

    /// Finalize a pending submission. The status flip and the review upsert
    /// happen in the same transaction; a submission that is not exactly
    /// `pending` affects zero rows and surfaces as a state conflict.
    pub async fn decide(
        &self,
        submission_id: &Uuid,
        admin_id: &Uuid,
        decision: ReviewDecision,
        note: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let note = note.map(str::trim).filter(|s| !s.is_empty());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let result = sqlx::query(
            "UPDATE submissions SET status = ?1, reviewed_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(decision.final_status().as_str())
        .bind(now.to_rfc3339())
        .bind(submission_id.to_string())
        .bind(SubmissionStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update submission: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::StateConflictError(
                "submission not found or already decided".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO reviews (id, submission_id, reviewed_by, decision, note, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (submission_id) DO UPDATE SET
                reviewed_by = excluded.reviewed_by,
                decision = excluded.decision,
                note = excluded.note,
                reviewed_at = excluded.reviewed_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(submission_id.to_string())
        .bind(admin_id.to_string())
        .bind(decision.as_str())
        .bind(note)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert review: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit decision: {}", e)))?;
        Ok(())
    }

    async fn attach_relations(&self, mut sub: Submission) -> Result<Submission> {
        let doc_rows = sqlx::query(
            "SELECT * FROM documents WHERE submission_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(sub.id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch documents: {}", e)))?;

        sub.documents = doc_rows
            .iter()
            .map(map_document)
            .collect::<Result<Vec<_>>>()?;

        let review_row = sqlx::query("SELECT * FROM reviews WHERE submission_id = ?1")
            .bind(sub.id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch review: {}", e)))?;

        sub.review = review_row.as_ref().map(map_review).transpose()?;
        Ok(sub)
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AppError::DatabaseError(format!("Invalid uuid in row: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| AppError::DatabaseError(format!("Invalid timestamp in row: {}", e)))
}

fn map_submission(row: &SqliteRow) -> Result<Submission> {
    Ok(Submission {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        status: SubmissionStatus::parse(&row.get::<String, _>("status"))?,
        face_match_score: row.get("face_match_score"),
        face_match_passed: row.get("face_match_passed"),
        ocr_provider: row.get("ocr_provider"),
        ocr_error: row.get("ocr_error"),
        auto_approved: row.get("auto_approved"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        reviewed_at: row
            .get::<Option<String>, _>("reviewed_at")
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        documents: Vec::new(),
        review: None,
    })
}

fn map_document(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        submission_id: parse_uuid(&row.get::<String, _>("submission_id"))?,
        doc_type: DocType::parse(&row.get::<String, _>("doc_type"))?,
        file_url: row.get("file_url"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn map_review(row: &SqliteRow) -> Result<Review> {
    Ok(Review {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        submission_id: parse_uuid(&row.get::<String, _>("submission_id"))?,
        reviewed_by: parse_uuid(&row.get::<String, _>("reviewed_by"))?,
        decision: ReviewDecision::parse(&row.get::<String, _>("decision"))?,
        note: row.get("note"),
        reviewed_at: parse_timestamp(&row.get::<String, _>("reviewed_at"))?,
    })
}
