// src/store/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use super::{Account, ContentStore, NewRawPost, ProcessedPost, RawPost};

pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RawPostRow {
    id: i64,
    account_id: i64,
    external_id: String,
    author_handle: String,
    text: String,
    language: Option<String>,
    published_at: DateTime<Utc>,
}

impl From<RawPostRow> for RawPost {
    fn from(r: RawPostRow) -> Self {
        RawPost {
            id: r.id,
            account_id: r.account_id,
            external_id: r.external_id,
            author_handle: r.author_handle,
            text: r.text,
            language: r.language,
            published_at: r.published_at,
        }
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if absent. Idempotent, run at boot.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id           BIGSERIAL PRIMARY KEY,
                handle       TEXT NOT NULL UNIQUE,
                active       BOOLEAN NOT NULL DEFAULT TRUE,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_posts (
                id           BIGSERIAL PRIMARY KEY,
                account_id   BIGINT NOT NULL REFERENCES accounts(id),
                external_id  TEXT NOT NULL,
                text         TEXT NOT NULL,
                language     TEXT,
                published_at TIMESTAMPTZ NOT NULL,
                collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                engagement   JSONB,
                UNIQUE (account_id, external_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_posts (
                id                 BIGSERIAL PRIMARY KEY,
                raw_post_id        BIGINT NOT NULL UNIQUE REFERENCES raw_posts(id),
                sentiment_score    DOUBLE PRECISION NOT NULL,
                impact_score       DOUBLE PRECISION NOT NULL,
                categories         TEXT[] NOT NULL,
                keywords           TEXT[] NOT NULL,
                entities_mentioned TEXT[] NOT NULL,
                summary            TEXT NOT NULL,
                processed_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("database schema ensured");
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn seed_accounts(&self, handles: &[&str]) -> Result<usize> {
        let mut added = 0usize;
        for handle in handles {
            let res = sqlx::query(
                "INSERT INTO accounts (handle) VALUES ($1) ON CONFLICT (handle) DO NOTHING",
            )
            .bind(handle)
            .execute(&self.pool)
            .await?;
            added += res.rows_affected() as usize;
        }
        Ok(added)
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT id, handle, active FROM accounts WHERE active ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Account {
                id: r.get("id"),
                handle: r.get("handle"),
                active: r.get("active"),
            })
            .collect())
    }

    async fn save_raw(&self, post: NewRawPost) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO raw_posts (account_id, external_id, text, language, published_at, engagement)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (account_id, external_id) DO NOTHING
            "#,
        )
        .bind(post.account_id)
        .bind(&post.external_id)
        .bind(&post.text)
        .bind(&post.language)
        .bind(post.published_at)
        .bind(&post.engagement)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<RawPost>> {
        let rows = sqlx::query_as::<_, RawPostRow>(
            r#"
            SELECT r.id, r.account_id, r.external_id, a.handle AS author_handle,
                   r.text, r.language, r.published_at
            FROM raw_posts r
            JOIN accounts a ON a.id = r.account_id
            LEFT JOIN processed_posts p ON p.raw_post_id = r.id
            WHERE p.id IS NULL
              AND (r.language = 'en' OR r.language IS NULL OR r.language = 'unknown')
            ORDER BY r.published_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn persist_processed(&self, record: ProcessedPost) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO processed_posts
                (raw_post_id, sentiment_score, impact_score, categories, keywords,
                 entities_mentioned, summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (raw_post_id) DO NOTHING
            "#,
        )
        .bind(record.raw_post_id)
        .bind(record.sentiment_score)
        .bind(record.impact_score)
        .bind(&record.categories)
        .bind(&record.keywords)
        .bind(&record.entities_mentioned)
        .bind(&record.summary)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn processed_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM processed_posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
