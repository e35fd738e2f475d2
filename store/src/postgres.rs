//! PostgreSQL quote store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxquote_common::{CurrencyPair, Quote, QuoteId, QuoteStatus, StatusUpdate};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{InsertOutcome, QuoteStore};

const SELECT_COLUMNS: &str = "SELECT id, currency, price, updated_at, status FROM quotes";

/// A row of the `quotes` table.
#[derive(Debug, Clone, FromRow)]
pub struct QuoteRow {
    pub id: Uuid,
    pub currency: String,
    pub price: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl TryFrom<QuoteRow> for Quote {
    type Error = StoreError;

    fn try_from(row: QuoteRow) -> Result<Self, Self::Error> {
        let pair = CurrencyPair::parse(&row.currency)
            .map_err(|e| StoreError::Decode(format!("row {}: {e}", row.id)))?;
        let status = row
            .status
            .parse::<QuoteStatus>()
            .map_err(|e| StoreError::Decode(format!("row {}: {e}", row.id)))?;

        Ok(Quote {
            id: QuoteId::from_uuid(row.id),
            pair,
            price: row.price,
            updated_at: row.updated_at,
            status,
        })
    }
}

/// Quote store backed by a PostgreSQL pool.
///
/// The pending-per-pair rule is enforced by a partial unique index, so any
/// number of processes may share one database.
#[derive(Clone)]
pub struct PgQuoteStore {
    pool: PgPool,
}

impl PgQuoteStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with a single attempt.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Open a pool, retrying up to `attempts` times with a fixed `delay`.
    #[instrument(name = "PgConnect", skip(url))]
    pub async fn connect_with_retry(
        url: &str,
        max_connections: u32,
        attempts: u32,
        delay: Duration,
    ) -> StoreResult<Self> {
        let attempts = attempts.max(1);
        let mut last_error = StoreError::Connection("no connection attempt made".to_string());

        for attempt in 1..=attempts {
            match Self::connect(url, max_connections).await {
                Ok(store) => {
                    info!(attempt, "Connected to database");
                    return Ok(store);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Database not ready, retrying");
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    /// Create the table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id UUID PRIMARY KEY,
                currency TEXT NOT NULL,
                price NUMERIC NULL,
                updated_at TIMESTAMPTZ NULL,
                status TEXT NOT NULL CHECK (status IN ('pending', 'done', 'error'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS quotes_one_pending_per_currency
                ON quotes (currency) WHERE status = 'pending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS quotes_currency_status_updated_at
                ON quotes (currency, status, updated_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Quote schema ready");
        Ok(())
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QuoteStore for PgQuoteStore {
    #[instrument(skip(self, pair), fields(pair = %pair))]
    async fn find_pending(&self, pair: &CurrencyPair) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "{SELECT_COLUMNS} WHERE currency = $1 AND status = 'pending' LIMIT 1"
        ))
        .bind(pair.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Quote::try_from).transpose()
    }

    #[instrument(skip(self, pair), fields(pair = %pair))]
    async fn insert_pending_if_absent(&self, pair: &CurrencyPair) -> StoreResult<InsertOutcome> {
        let id = QuoteId::new();
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO quotes (id, currency, status)
            VALUES ($1, $2, 'pending')
            ON CONFLICT (currency) WHERE status = 'pending' DO NOTHING
            RETURNING id
            "#,
        )
        .bind(*id.as_uuid())
        .bind(pair.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some((uuid,)) => InsertOutcome::Inserted(QuoteId::from_uuid(uuid)),
            None => InsertOutcome::Conflict,
        })
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_status(&self, id: QuoteId, update: &StatusUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE quotes
            SET price = $2, updated_at = $3, status = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(*id.as_uuid())
        .bind(update.price)
        .bind(update.updated_at)
        .bind(update.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotPending(id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: QuoteId) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Quote::try_from).transpose()
    }

    #[instrument(skip(self, pair), fields(pair = %pair))]
    async fn latest_with_status(
        &self,
        pair: &CurrencyPair,
        status: QuoteStatus,
    ) -> StoreResult<Option<Quote>> {
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "{SELECT_COLUMNS} WHERE currency = $1 AND status = $2 \
             ORDER BY updated_at DESC NULLS LAST LIMIT 1"
        ))
        .bind(pair.to_string())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Quote::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn retract_pending(&self, id: QuoteId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quotes
            SET status = 'error', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(*id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
