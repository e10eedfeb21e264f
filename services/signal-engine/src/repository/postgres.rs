//! Postgres-backed repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, Pool, Postgres};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{InstrumentRepository, SignalRepository, TradingSignalSink};
use crate::error::Result;
use crate::signal::{
    ContributionCadence, InvestmentHorizon, PriceTargets, Signal, SignalAnalysis, SignalCategory,
};
use crate::translator::GenericTradingSignal;
use crate::types::Instrument;

pub type Db = Pool<Postgres>;

pub async fn init_db(database_url: &str) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    Ok(pool)
}

const SIGNAL_COLUMNS: &str = "id, instrument_id, symbol, category, horizon, \
    fundamental_score, technical_score, sentiment_score, recommended_allocation, \
    cadence, price_targets, max_position_size, stop_loss, analysis, is_active, \
    created_at, expires_at";

#[derive(Debug, FromRow)]
struct SignalRow {
    id: Uuid,
    instrument_id: Uuid,
    symbol: String,
    category: SignalCategory,
    horizon: InvestmentHorizon,
    fundamental_score: f64,
    technical_score: f64,
    sentiment_score: f64,
    recommended_allocation: f64,
    cadence: Option<ContributionCadence>,
    price_targets: Option<Json<PriceTargets>>,
    max_position_size: f64,
    stop_loss: f64,
    analysis: Json<SignalAnalysis>,
    is_active: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SignalRow> for Signal {
    fn from(row: SignalRow) -> Self {
        Signal {
            id: row.id,
            instrument_id: row.instrument_id,
            symbol: row.symbol,
            category: row.category,
            horizon: row.horizon,
            fundamental_score: row.fundamental_score,
            technical_score: row.technical_score,
            sentiment_score: row.sentiment_score,
            recommended_allocation: row.recommended_allocation,
            cadence: row.cadence,
            price_targets: row.price_targets.map(|j| j.0),
            max_position_size: row.max_position_size,
            stop_loss: row.stop_loss,
            analysis: row.analysis.0,
            is_active: row.is_active,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

async fn insert_signal<'e, E>(executor: E, signal: &Signal) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(&format!(
        "INSERT INTO long_term_signals ({}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        SIGNAL_COLUMNS
    ))
    .bind(signal.id)
    .bind(signal.instrument_id)
    .bind(&signal.symbol)
    .bind(signal.category)
    .bind(signal.horizon)
    .bind(signal.fundamental_score)
    .bind(signal.technical_score)
    .bind(signal.sentiment_score)
    .bind(signal.recommended_allocation)
    .bind(signal.cadence)
    .bind(signal.price_targets.clone().map(Json))
    .bind(signal.max_position_size)
    .bind(signal.stop_loss)
    .bind(Json(&signal.analysis))
    .bind(signal.is_active)
    .bind(signal.created_at)
    .bind(signal.expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub struct PgInstrumentRepository {
    db: Db,
}

impl PgInstrumentRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InstrumentRepository for PgInstrumentRepository {
    async fn list_eligible(&self) -> Result<Vec<Instrument>> {
        let instruments = sqlx::query_as::<_, Instrument>(
            "SELECT id, symbol, supports_long_horizon, is_active FROM instruments \
             WHERE supports_long_horizon ORDER BY symbol",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(instruments)
    }
}

pub struct PgSignalRepository {
    db: Db,
}

impl PgSignalRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SignalRepository for PgSignalRepository {
    async fn find_active(
        &self,
        instrument_id: Uuid,
        category: SignalCategory,
    ) -> Result<Option<Signal>> {
        let row: Option<SignalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM long_term_signals \
             WHERE instrument_id = $1 AND category = $2 AND is_active \
             ORDER BY created_at DESC LIMIT 1",
            SIGNAL_COLUMNS
        ))
        .bind(instrument_id)
        .bind(category)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Signal::from))
    }

    async fn save(&self, signal: &Signal) -> Result<()> {
        insert_signal(&self.db, signal).await
    }

    async fn deactivate(&self, signal: &Signal) -> Result<()> {
        sqlx::query("UPDATE long_term_signals SET is_active = false WHERE id = $1")
            .bind(signal.id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE long_term_signals SET is_active = false WHERE is_active AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn activate(&self, signal: &Signal) -> Result<Vec<Uuid>> {
        let mut tx = self.db.begin().await?;

        let superseded: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE long_term_signals SET is_active = false \
             WHERE instrument_id = $1 AND is_active RETURNING id",
        )
        .bind(signal.instrument_id)
        .fetch_all(&mut *tx)
        .await?;

        insert_signal(&mut *tx, signal).await?;
        tx.commit().await?;

        debug!(signal_id = %signal.id, superseded = superseded.len(), "Activated signal");
        Ok(superseded)
    }
}

pub struct PgTradingSignalSink {
    db: Db,
}

impl PgTradingSignalSink {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TradingSignalSink for PgTradingSignalSink {
    async fn publish(&self, signal: &GenericTradingSignal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_signals
                (id, spot_signal_id, instrument_id, symbol, signal_type, strength,
                 confidence, timeframe, entry_point_type, metadata, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (spot_signal_id) DO UPDATE SET
                signal_type = EXCLUDED.signal_type,
                strength = EXCLUDED.strength,
                confidence = EXCLUDED.confidence,
                metadata = EXCLUDED.metadata,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(signal.metadata.spot_signal_id)
        .bind(signal.instrument_id)
        .bind(&signal.symbol)
        .bind(signal.signal_type)
        .bind(signal.strength)
        .bind(signal.confidence)
        .bind(&signal.timeframe)
        .bind(&signal.entry_point_type)
        .bind(Json(&signal.metadata))
        .bind(signal.generated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
