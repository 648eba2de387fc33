//! Schema bootstrap.
//!
//! Creates tables, indexes, the daily materialised view, and the
//! "unassigned" sentinel topic. Idempotent: every statement is
//! `IF NOT EXISTS` or an upsert.

use deadpool_postgres::Pool;
use opine_core::UNASSIGNED_TOPIC_ID;
use opine_error::Result;

use crate::error::{classify_pg_error, classify_pool_error};

const CREATE_TOPICS: &str = r"
    CREATE TABLE IF NOT EXISTS topics (
        id BIGSERIAL PRIMARY KEY,
        label TEXT NOT NULL,
        keywords TEXT[] NOT NULL DEFAULT '{}',
        centroid DOUBLE PRECISION[],
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

const CREATE_FEEDBACK: &str = r"
    CREATE TABLE IF NOT EXISTS feedback (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        customer_id TEXT,
        body TEXT NOT NULL CHECK (body <> ''),
        normalized_text TEXT NOT NULL,
        language TEXT,
        metadata JSONB NOT NULL DEFAULT '{}'::JSONB,
        batch_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

const CREATE_ANNOTATIONS: &str = r"
    CREATE TABLE IF NOT EXISTS annotations (
        id UUID PRIMARY KEY,
        feedback_id UUID NOT NULL UNIQUE REFERENCES feedback (id) ON DELETE CASCADE,
        sentiment SMALLINT CHECK (sentiment BETWEEN -1 AND 1),
        sentiment_confidence DOUBLE PRECISION
            CHECK (sentiment_confidence BETWEEN 0.0 AND 1.0),
        topic_id BIGINT REFERENCES topics (id),
        toxicity DOUBLE PRECISION CHECK (toxicity BETWEEN 0.0 AND 1.0),
        embedding DOUBLE PRECISION[],
        model_version TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK ((sentiment IS NULL) = (sentiment_confidence IS NULL))
    )
";

const CREATE_TOPIC_AUDIT: &str = r"
    CREATE TABLE IF NOT EXISTS topic_audit (
        id BIGSERIAL PRIMARY KEY,
        topic_id BIGINT,
        action TEXT NOT NULL,
        before_state JSONB,
        after_state JSONB,
        actor TEXT NOT NULL,
        actor_ip TEXT,
        actor_agent TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

const CREATE_BATCHES: &str = r"
    CREATE TABLE IF NOT EXISTS batches (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        received_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        processed_count BIGINT NOT NULL DEFAULT 0,
        created_count BIGINT NOT NULL DEFAULT 0,
        duplicate_count BIGINT NOT NULL DEFAULT 0,
        error_count BIGINT NOT NULL DEFAULT 0,
        skipped_non_english_count BIGINT NOT NULL DEFAULT 0,
        job_id UUID,
        completed_at TIMESTAMPTZ
    )
";

const CREATE_CONVERSATIONS: &str = r"
    CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        citations JSONB NOT NULL DEFAULT '[]'::JSONB,
        filters JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

const CREATE_MATVIEW: &str = r"
    CREATE MATERIALIZED VIEW IF NOT EXISTS daily_feedback_aggregates AS
    SELECT
        f.created_at::date AS day,
        COUNT(*) AS total_feedback,
        COUNT(*) FILTER (WHERE a.sentiment = 1) AS positive_feedback,
        COUNT(*) FILTER (WHERE a.sentiment = -1) AS negative_feedback,
        COUNT(*) FILTER (WHERE a.sentiment = 0) AS neutral_feedback,
        AVG(a.sentiment)::float8 AS avg_sentiment,
        COUNT(DISTINCT f.customer_id) AS unique_customers,
        ARRAY(
            SELECT f2.source FROM feedback f2
            WHERE f2.created_at::date = f.created_at::date
            GROUP BY f2.source
            ORDER BY COUNT(*) DESC, f2.source
            LIMIT 3
        ) AS top_sources
    FROM feedback f
    LEFT JOIN annotations a ON a.feedback_id = f.id
    GROUP BY f.created_at::date
";

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_feedback_created_at ON feedback (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_source ON feedback (source)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_customer ON feedback (customer_id) WHERE customer_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_feedback_batch ON feedback (batch_id) WHERE batch_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_annotations_topic ON annotations (topic_id) WHERE topic_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_annotations_sentiment ON annotations (sentiment)",
    "CREATE INDEX IF NOT EXISTS idx_topic_audit_topic ON topic_audit (topic_id) WHERE topic_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_topic_audit_created ON topic_audit (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations (created_at DESC)",
    // Required for REFRESH MATERIALIZED VIEW CONCURRENTLY.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_aggregates_day ON daily_feedback_aggregates (day)",
];

/// Create all tables, indexes, the materialised view, and the sentinel
/// topic.
///
/// # Errors
///
/// Returns the classified pool or statement error.
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await.map_err(|e| classify_pool_error(&e))?;

    for statement in [
        CREATE_TOPICS,
        CREATE_FEEDBACK,
        CREATE_ANNOTATIONS,
        CREATE_TOPIC_AUDIT,
        CREATE_BATCHES,
        CREATE_CONVERSATIONS,
        CREATE_MATVIEW,
    ] {
        client
            .batch_execute(statement)
            .await
            .map_err(|e| classify_pg_error(&e))?;
    }

    for index in INDEXES {
        client
            .batch_execute(index)
            .await
            .map_err(|e| classify_pg_error(&e))?;
    }

    // Sentinel topic for reassignment on delete.
    client
        .execute(
            "INSERT INTO topics (id, label, keywords) VALUES ($1, 'Unassigned', '{}')
             ON CONFLICT (id) DO NOTHING",
            &[&UNASSIGNED_TOPIC_ID],
        )
        .await
        .map_err(|e| classify_pg_error(&e))?;

    Ok(())
}
