// Postgres JobStore (Shared Store)

use std::sync::Arc;

use async_trait::async_trait;
use renderq_core::domain::job::{COMPLETE_MESSAGE, RECLAIM_MESSAGE};
use renderq_core::domain::{
    FailOutcome, GenerationMode, InputRef, JobRecord, JobStatus, OutputRef, QueueStats,
};
use renderq_core::error::{AppError, Result};
use renderq_core::port::time_provider::SystemTimeProvider;
use renderq_core::port::{JobStore, TimeProvider};
use sqlx::PgPool;
use tracing::warn;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                // Postgres SQLSTATE classes: https://www.postgresql.org/docs/current/errcodes-appendix.html
                match code.as_ref() {
                    "23505" => AppError::Storage(format!(
                        "unique constraint violation: {}",
                        db_err.message()
                    )),
                    "57014" => AppError::Storage(format!(
                        "statement timed out: {}",
                        db_err.message()
                    )),
                    other => AppError::Storage(format!(
                        "database error [{}]: {}",
                        other,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Storage(format!("database error: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Storage("connection pool timed out".to_string())
        }
        _ => AppError::Storage(err.to_string()),
    }
}

/// Multi-host job store over Postgres.
///
/// Every primitive is a single conditional statement whose affected-row
/// count decides the outcome; there is no read-then-write window for a
/// concurrent claimer to slip through. The only backend safe for a fleet
/// of independent worker hosts or multiple API-server replicas.
pub struct PgJobStore {
    pool: PgPool,
    time: Arc<dyn TimeProvider>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_time(pool, Arc::new(SystemTimeProvider))
    }

    pub fn with_time(pool: PgPool, time: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time }
    }

    async fn current_status(&self, id: &str) -> Result<Option<JobStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(status.as_deref().and_then(JobStatus::parse))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, record: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, created_at, updated_at,
                input, priority, mode,
                claimed_by, claimed_at, worker_type,
                progress, message,
                output, quality_score, loop_score,
                attempt, max_attempts, last_error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&record.id)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.input.as_value().to_string())
        .bind(record.priority)
        .bind(record.mode.as_str())
        .bind(&record.claimed_by)
        .bind(record.claimed_at)
        .bind(&record.worker_type)
        .bind(record.progress as i32)
        .bind(&record.message)
        .bind(record.output.as_ref().map(|o| o.as_value().to_string()))
        .bind(record.quality_score)
        .bind(record.loop_score)
        .bind(record.attempt)
        .bind(record.max_attempts)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>> {
        let now = self.time.now_millis();

        // One atomic statement: the subselect picks the best eligible
        // queued job, SKIP LOCKED keeps concurrent claimers off the same
        // row, and the outer status check makes the race loss explicit.
        // Losing the race is Ok(None), never an error.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'claimed',
                claimed_by = $1,
                claimed_at = $2,
                worker_type = $3,
                updated_at = $2
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'queued'
                ORDER BY priority ASC, created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
              AND status = 'queued'
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(worker_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(JobRow::into_record))
    }

    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> Result<()> {
        let now = self.time.now_millis();
        let requested = status.map(|s| s.as_str().to_string());

        // Advisory: applies only while in flight, and the requested
        // status may only step forward. Zero rows affected means the job
        // moved on (or never existed) and the report is dropped.
        sqlx::query(
            r#"
            UPDATE jobs
            SET progress = LEAST($2, 100),
                message = $3,
                updated_at = $4,
                status = CASE
                    WHEN $5::text = 'generating' AND status = 'claimed' THEN 'generating'
                    WHEN $5::text = 'uploading' AND status IN ('claimed', 'generating') THEN 'uploading'
                    ELSE status
                END
            WHERE id = $1
              AND status IN ('claimed', 'generating', 'uploading')
            "#,
        )
        .bind(id)
        .bind(progress as i32)
        .bind(message)
        .bind(now)
        .bind(requested)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        output: &OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> Result<()> {
        let now = self.time.now_millis();

        // The claimed_by check keeps a reporter whose claim was
        // reclaimed from overwriting the current claimant's attempt
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'complete',
                progress = 100,
                message = $2,
                output = $3,
                quality_score = $4,
                loop_score = $5,
                updated_at = $6
            WHERE id = $1
              AND status IN ('claimed', 'generating', 'uploading')
              AND claimed_by = $7
            "#,
        )
        .bind(id)
        .bind(COMPLETE_MESSAGE)
        .bind(output.as_value().to_string())
        .bind(quality_score)
        .bind(loop_score)
        .bind(now)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            match self.current_status(id).await? {
                None => return Err(AppError::NotFound(id.to_string())),
                // Repeated completion: idempotent, first payload stands
                Some(JobStatus::Complete) => {}
                Some(status) => {
                    warn!(job_id = %id, worker_id = %worker_id, status = %status, "Ignoring stale completion");
                }
            }
        }
        Ok(())
    }

    async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome> {
        let now = self.time.now_millis();

        // Retry/dead branch folded into one conditional update; the
        // returned row tells us which way it went. Only the current
        // claimant's report counts.
        let row: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET attempt = attempt + 1,
                last_error = $2,
                updated_at = $3,
                status = CASE
                    WHEN attempt + 1 >= max_attempts THEN 'dead'
                    ELSE 'queued'
                END,
                message = CASE
                    WHEN attempt + 1 >= max_attempts
                        THEN 'failed after ' || (attempt + 1)::text || ' attempts: ' || $2
                    ELSE 'retry ' || (attempt + 1)::text || '/' || max_attempts::text || ': ' || $2
                END,
                claimed_by = CASE WHEN attempt + 1 >= max_attempts THEN claimed_by ELSE NULL END,
                claimed_at = CASE WHEN attempt + 1 >= max_attempts THEN claimed_at ELSE NULL END
            WHERE id = $1
              AND status IN ('claimed', 'generating', 'uploading')
              AND claimed_by = $4
            RETURNING status, attempt
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some((status, attempt)) if status == "dead" => Ok(FailOutcome::Dead { attempt }),
            Some((_, attempt)) => Ok(FailOutcome::Requeued { attempt }),
            None => match self.current_status(id).await? {
                None => Err(AppError::NotFound(id.to_string())),
                Some(status) => Ok(FailOutcome::Ignored { status }),
            },
        }
    }

    async fn reclaim_stale(&self, cutoff_millis: i64) -> Result<u64> {
        let now = self.time.now_millis();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued',
                claimed_by = NULL,
                claimed_at = NULL,
                message = $2,
                updated_at = $3
            WHERE status IN ('claimed', 'generating', 'uploading')
              AND claimed_at < $1
            "#,
        )
        .bind(cutoff_millis)
        .bind(RECLAIM_MESSAGE)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(JobRow::into_record))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.total += count;
            match status.as_str() {
                "queued" => stats.queued = count,
                "claimed" => stats.claimed = count,
                "generating" => stats.generating = count,
                "uploading" => stats.uploading = count,
                "complete" => stats.complete = count,
                "failed" => stats.failed = count,
                "dead" => stats.dead = count,
                other => warn!(status = %other, count, "Unknown status in stats scan"),
            }
        }
        Ok(stats)
    }
}

/// Postgres row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    status: String,
    created_at: i64,
    updated_at: i64,

    input: String,
    priority: i32,
    mode: String,

    claimed_by: Option<String>,
    claimed_at: Option<i64>,
    worker_type: Option<String>,

    progress: i32,
    message: String,

    output: Option<String>,
    quality_score: Option<f64>,
    loop_score: Option<f64>,

    attempt: i32,
    max_attempts: i32,
    last_error: Option<String>,
}

impl JobRow {
    fn into_record(self) -> JobRecord {
        // Tolerant parses: an unreadable status or payload degrades the
        // record, it does not fail the whole query
        let status = JobStatus::parse(&self.status).unwrap_or(JobStatus::Failed);
        let mode = GenerationMode::parse(&self.mode).unwrap_or(GenerationMode::Full);
        let input: serde_json::Value =
            serde_json::from_str(&self.input).unwrap_or(serde_json::json!({}));
        let output = self
            .output
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .map(OutputRef::new);

        JobRecord {
            id: self.id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            input: InputRef::new(input),
            priority: self.priority,
            mode,
            claimed_by: self.claimed_by,
            claimed_at: self.claimed_at,
            worker_type: self.worker_type,
            progress: self.progress.clamp(0, 100) as u8,
            message: self.message,
            output,
            quality_score: self.quality_score,
            loop_score: self.loop_score,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
        }
    }
}
