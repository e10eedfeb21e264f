//! In-memory repositories for tests and dry runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{InstrumentRepository, SignalRepository, TradingSignalSink};
use crate::error::Result;
use crate::signal::{Signal, SignalCategory};
use crate::translator::GenericTradingSignal;
use crate::types::Instrument;

#[derive(Clone, Default)]
pub struct InMemoryInstrumentRepository {
    instruments: Arc<RwLock<Vec<Instrument>>>,
}

impl InMemoryInstrumentRepository {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            instruments: Arc::new(RwLock::new(instruments)),
        }
    }

    pub async fn insert(&self, instrument: Instrument) {
        self.instruments.write().await.push(instrument);
    }
}

#[async_trait]
impl InstrumentRepository for InMemoryInstrumentRepository {
    async fn list_eligible(&self) -> Result<Vec<Instrument>> {
        Ok(self
            .instruments
            .read()
            .await
            .iter()
            .filter(|i| i.supports_long_horizon)
            .cloned()
            .collect())
    }
}

/// Signals keyed by id, history included
#[derive(Clone, Default)]
pub struct InMemorySignalRepository {
    signals: Arc<RwLock<HashMap<Uuid, Signal>>>,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored signal for an instrument, oldest first
    pub async fn history(&self, instrument_id: Uuid) -> Vec<Signal> {
        let signals = self.signals.read().await;
        let mut history: Vec<Signal> = signals
            .values()
            .filter(|s| s.instrument_id == instrument_id)
            .cloned()
            .collect();
        history.sort_by_key(|s| s.created_at);
        history
    }

    pub async fn active_for(&self, instrument_id: Uuid) -> Vec<Signal> {
        self.signals
            .read()
            .await
            .values()
            .filter(|s| s.instrument_id == instrument_id && s.is_active)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.signals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.signals.read().await.is_empty()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn find_active(
        &self,
        instrument_id: Uuid,
        category: SignalCategory,
    ) -> Result<Option<Signal>> {
        Ok(self
            .signals
            .read()
            .await
            .values()
            .find(|s| s.instrument_id == instrument_id && s.category == category && s.is_active)
            .cloned())
    }

    async fn save(&self, signal: &Signal) -> Result<()> {
        self.signals.write().await.insert(signal.id, signal.clone());
        Ok(())
    }

    async fn deactivate(&self, signal: &Signal) -> Result<()> {
        if let Some(stored) = self.signals.write().await.get_mut(&signal.id) {
            stored.is_active = false;
        }
        Ok(())
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut signals = self.signals.write().await;
        let mut expired = 0;
        for signal in signals.values_mut() {
            if signal.is_active && signal.expires_at <= now {
                signal.is_active = false;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn activate(&self, signal: &Signal) -> Result<Vec<Uuid>> {
        let mut signals = self.signals.write().await;
        let mut superseded = Vec::new();
        for existing in signals.values_mut() {
            if existing.instrument_id == signal.instrument_id && existing.is_active {
                existing.is_active = false;
                superseded.push(existing.id);
            }
        }
        signals.insert(signal.id, signal.clone());
        debug!(signal_id = %signal.id, superseded = superseded.len(), "Activated signal");
        Ok(superseded)
    }
}

/// Trading signals keyed by originating signal id
#[derive(Clone, Default)]
pub struct InMemoryTradingSignalSink {
    published: Arc<RwLock<HashMap<Uuid, GenericTradingSignal>>>,
    publish_count: Arc<RwLock<u64>>,
}

impl InMemoryTradingSignalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, spot_signal_id: Uuid) -> Option<GenericTradingSignal> {
        self.published.read().await.get(&spot_signal_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.published.read().await.is_empty()
    }

    /// Total publish calls, upserts included
    pub async fn publish_count(&self) -> u64 {
        *self.publish_count.read().await
    }
}

#[async_trait]
impl TradingSignalSink for InMemoryTradingSignalSink {
    async fn publish(&self, signal: &GenericTradingSignal) -> Result<()> {
        self.published
            .write()
            .await
            .insert(signal.metadata.spot_signal_id, signal.clone());
        *self.publish_count.write().await += 1;
        Ok(())
    }
}
