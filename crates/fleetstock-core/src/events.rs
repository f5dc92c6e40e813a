use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventKind {
    StockReceived,
    UnitRegistered,
    StockConsumed,
    UnitInstalled,
    StockReturned,
    StockWrittenOff,
    UnitReleased,
    InstallationClosed,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockReceived => "STOCK_RECEIVED",
            Self::UnitRegistered => "UNIT_REGISTERED",
            Self::StockConsumed => "STOCK_CONSUMED",
            Self::UnitInstalled => "UNIT_INSTALLED",
            Self::StockReturned => "STOCK_RETURNED",
            Self::StockWrittenOff => "STOCK_WRITTEN_OFF",
            Self::UnitReleased => "UNIT_RELEASED",
            Self::InstallationClosed => "INSTALLATION_CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STOCK_RECEIVED" => Some(Self::StockReceived),
            "UNIT_REGISTERED" => Some(Self::UnitRegistered),
            "STOCK_CONSUMED" => Some(Self::StockConsumed),
            "UNIT_INSTALLED" => Some(Self::UnitInstalled),
            "STOCK_RETURNED" => Some(Self::StockReturned),
            "STOCK_WRITTEN_OFF" => Some(Self::StockWrittenOff),
            "UNIT_RELEASED" => Some(Self::UnitReleased),
            "INSTALLATION_CLOSED" => Some(Self::InstallationClosed),
            _ => None,
        }
    }
}

/// Audit entry. `aggregate_id` is always the consumable the entry belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub kind: LedgerEventKind,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl LedgerEvent {
    pub fn new(
        aggregate_id: Uuid,
        kind: LedgerEventKind,
        actor: &str,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            kind,
            actor: actor.to_string(),
            occurred_at,
            payload,
        }
    }
}
