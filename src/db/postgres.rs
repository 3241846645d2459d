use crate::models::{OrderRecord, OrderStatus, Score, Tick};
use crate::persistence::{OrderJournal, ScoreStore, TickStore};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Postgres persistence for ticks, scores and order attempts
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

fn to_f64(value: Decimal, column: &str) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| format!("{} value {} does not fit in f64", column, value).into())
}

impl PostgresPersistence {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    /// Most recent scores for a pair, newest first
    pub async fn recent_scores(&self, pair: &str, limit: i64) -> Result<Vec<Score>> {
        let rows = sqlx::query(
            r#"
            SELECT pair, timestamp, score, price
            FROM indicator_scores
            WHERE pair = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(pair)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let value: i16 = row.get("score");
            let price: Decimal = row.get("price");
            scores.push(Score {
                pair: row.get("pair"),
                timestamp: row.get("timestamp"),
                value: u8::try_from(value)?,
                price: to_f64(price, "price")?,
            });
        }

        Ok(scores)
    }

    /// Count of order attempts with the given status label
    pub async fn count_orders(&self, status: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM orders WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }
}

#[async_trait]
impl TickStore for PostgresPersistence {
    async fn append(&self, tick: &Tick) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_data (pair, price, volume, timestamp)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&tick.pair)
        .bind(Decimal::try_from(tick.price)?)
        .bind(Decimal::try_from(tick.volume)?)
        .bind(tick.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_range(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Tick>> {
        let rows = sqlx::query(
            r#"
            SELECT pair, price, volume, timestamp
            FROM price_data
            WHERE pair = $1
              AND ($2::timestamptz IS NULL OR timestamp >= $2)
              AND ($3::timestamptz IS NULL OR timestamp < $3)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(pair)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut ticks = Vec::with_capacity(rows.len());
        for row in rows {
            let price: Decimal = row.get("price");
            let volume: Decimal = row.get("volume");
            ticks.push(Tick {
                pair: row.get("pair"),
                price: to_f64(price, "price")?,
                volume: to_f64(volume, "volume")?,
                timestamp: row.get("timestamp"),
            });
        }

        tracing::debug!("Loaded {} ticks for {} from Postgres", ticks.len(), pair);

        Ok(ticks)
    }
}

#[async_trait]
impl ScoreStore for PostgresPersistence {
    async fn record(&self, score: &Score) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indicator_scores (pair, timestamp, score, price)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&score.pair)
        .bind(score.timestamp)
        .bind(i16::from(score.value))
        .bind(Decimal::try_from(score.price)?)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved score {} for {}", score.value, score.pair);

        Ok(())
    }
}

#[async_trait]
impl OrderJournal for PostgresPersistence {
    async fn record_order(&self, order: &OrderRecord) -> Result<()> {
        let (txids, error) = match &order.status {
            OrderStatus::Accepted { txids } => (txids.clone(), None),
            OrderStatus::Rejected { errors } => (Vec::new(), Some(errors.join(", "))),
            OrderStatus::Failed { message } => (Vec::new(), Some(message.clone())),
        };
        let price = order.request.price.map(Decimal::try_from).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, pair, side, order_type, volume, price,
                status, txids, error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(&order.request.pair)
        .bind(order.request.side.as_str())
        .bind(order.request.order_type.as_str())
        .bind(Decimal::try_from(order.request.volume)?)
        .bind(price)
        .bind(order.status.label())
        .bind(&txids)
        .bind(error)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved {} order {} for {}",
            order.status.label(),
            order.id,
            order.request.pair
        );

        Ok(())
    }
}
