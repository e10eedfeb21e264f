//! Storage seams: instruments in, signals and trading signals out

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::signal::{Signal, SignalCategory};
use crate::translator::GenericTradingSignal;
use crate::types::Instrument;

pub use memory::{
    InMemoryInstrumentRepository, InMemorySignalRepository, InMemoryTradingSignalSink,
};
pub use postgres::{
    init_db, Db, PgInstrumentRepository, PgSignalRepository, PgTradingSignalSink,
};

/// Read-only source of instruments
#[async_trait]
pub trait InstrumentRepository: Send + Sync {
    /// Instruments flagged for long-horizon evaluation
    async fn list_eligible(&self) -> Result<Vec<Instrument>>;
}

/// Store of long-horizon signals
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Active signal for (instrument, category), if any
    async fn find_active(&self, instrument_id: Uuid, category: SignalCategory)
        -> Result<Option<Signal>>;

    async fn save(&self, signal: &Signal) -> Result<()>;

    async fn deactivate(&self, signal: &Signal) -> Result<()>;

    /// Deactivate every active signal whose expiry has passed; returns the count
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Make `signal` the instrument's only active signal, deactivating any
    /// other active signal of any category. Returns the superseded ids.
    ///
    /// Implementations should do this atomically; the default is a
    /// sequence of single-row calls.
    async fn activate(&self, signal: &Signal) -> Result<Vec<Uuid>> {
        let mut superseded = Vec::new();
        for category in SignalCategory::ALL {
            if let Some(existing) = self.find_active(signal.instrument_id, category).await? {
                self.deactivate(&existing).await?;
                superseded.push(existing.id);
            }
        }
        self.save(signal).await?;
        Ok(superseded)
    }
}

/// Destination for translated trading signals
#[async_trait]
pub trait TradingSignalSink: Send + Sync {
    async fn publish(&self, signal: &GenericTradingSignal) -> Result<()>;
}
