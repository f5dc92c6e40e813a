use chrono::{DateTime, NaiveDate, Utc};
use fleetstock_core::{
    Consumable, EventEnvelope, InstallationRecord, LedgerEvent, ReceiptRecord, SerializedUnit,
    TechnicalSpec, UnitState,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterConsumableRequest {
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub is_serialized: bool,
    #[serde(default)]
    pub technical: TechnicalSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterGroupRequest {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSubsystemRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceRequest {
    pub asset_id: Uuid,
    pub label: String,
}

/// `strategy` is one of `GROUP` (needs `group_id`), `TECHNICAL` (needs
/// `category` and `value`) or `INDIVIDUAL` (needs `consumable_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRuleRequest {
    pub strategy: String,
    pub group_id: Option<Uuid>,
    pub category: Option<String>,
    pub value: Option<String>,
    pub consumable_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveStockRequest {
    pub quantity: Decimal,
    pub total_cost: Decimal,
    #[serde(default = "default_receipt_source")]
    pub source: String,
    pub reference: Option<String>,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    pub warranty_expiry: Option<NaiveDate>,
    pub received_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveStockResponse {
    pub consumable: Consumable,
    pub receipt: ReceiptRecord,
    pub units: Vec<SerializedUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    pub subsystem_instance_id: Uuid,
    pub consumable_id: Uuid,
    pub quantity: Decimal,
    pub serialized_unit_id: Option<Uuid>,
    pub reading_at_install: Decimal,
    pub installed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub reason: String,
    pub reading_at_removal: Option<Decimal>,
    pub removed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub installation: InstallationRecord,
    pub consumable: Consumable,
    pub unit_state: Option<UnitState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub rule_id: Uuid,
    pub consumables: Vec<Consumable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsQuery {
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sequence: i64,
    pub event: LedgerEvent,
    pub stored_at: DateTime<Utc>,
}

impl From<EventEnvelope> for HistoryEntry {
    fn from(envelope: EventEnvelope) -> Self {
        Self {
            sequence: envelope.sequence,
            event: envelope.event,
            stored_at: envelope.stored_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReceivedEvent {
    pub consumable_id: Uuid,
    pub receipt_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub on_hand: Decimal,
    pub average_unit_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumableInstalledEvent {
    pub installation_id: Uuid,
    pub consumable_id: Uuid,
    pub asset_id: Uuid,
    pub subsystem_instance_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumableRemovedEvent {
    pub installation_id: Uuid,
    pub consumable_id: Uuid,
    pub reason: String,
    pub unit_state: Option<UnitState>,
}

fn default_receipt_source() -> String {
    "PURCHASE_ORDER".to_string()
}
