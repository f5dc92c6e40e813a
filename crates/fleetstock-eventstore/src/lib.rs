use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use fleetstock_core::{EventEnvelope, EventStore, LedgerEvent};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Journal {
    streams: HashMap<Uuid, Vec<EventEnvelope>>,
    sequence: i64,
}

/// Audit journal kept in process memory. Sequence numbers are global across
/// streams and strictly increasing.
#[derive(Default)]
pub struct InMemoryEventStore {
    journal: RwLock<Journal>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_sequence(&self) -> i64 {
        self.journal.read().await.sequence
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: Uuid, event: LedgerEvent) -> anyhow::Result<EventEnvelope> {
        let mut envelopes = self.append_batch(stream_id, vec![event]).await?;
        envelopes
            .pop()
            .ok_or_else(|| anyhow::anyhow!("append produced no envelope"))
    }

    async fn append_batch(
        &self,
        stream_id: Uuid,
        events: Vec<LedgerEvent>,
    ) -> anyhow::Result<Vec<EventEnvelope>> {
        let mut journal = self.journal.write().await;
        let stored_at = Utc::now();

        let mut envelopes = Vec::with_capacity(events.len());
        for event in events {
            journal.sequence += 1;
            envelopes.push(EventEnvelope {
                sequence: journal.sequence,
                stream_id,
                event,
                stored_at,
            });
        }

        journal
            .streams
            .entry(stream_id)
            .or_default()
            .extend(envelopes.iter().cloned());

        Ok(envelopes)
    }

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        Ok(journal.streams.get(&stream_id).cloned().unwrap_or_default())
    }
}
