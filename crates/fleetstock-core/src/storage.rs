use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::events::LedgerEvent;
use crate::models::{
    CompatibilityRule, Consumable, EquivalenceGroup, InstallationRecord, OperationContext,
    ReceiptRecord, ReceiptSource, RemovalReason, SerializedUnit, StockLevel, SubsystemDefinition,
    SubsystemInstance, UnitState,
};

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: LedgerEvent,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: LedgerEvent) -> anyhow::Result<EventEnvelope>;

    /// Appends every event or none of them.
    async fn append_batch(
        &self,
        stream_id: Uuid,
        events: Vec<LedgerEvent>,
    ) -> anyhow::Result<Vec<EventEnvelope>>;

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveCommand {
    pub consumable_id: Uuid,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub source: ReceiptSource,
    pub reference: Option<String>,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    pub warranty_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveOutcome {
    pub consumable: Consumable,
    pub receipt: ReceiptRecord,
    pub units: Vec<SerializedUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallCommand {
    pub subsystem_instance_id: Uuid,
    pub consumable_id: Uuid,
    pub quantity: Decimal,
    pub serialized_unit_id: Option<Uuid>,
    pub reading_at_install: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveCommand {
    pub installation_id: Uuid,
    pub reason: RemovalReason,
    pub reading_at_removal: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalOutcome {
    pub installation: InstallationRecord,
    pub consumable: Consumable,
    pub unit: Option<SerializedUnit>,
}

/// The ledger engine's operations. Every mutating call is all-or-nothing.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn receive(
        &self,
        command: ReceiveCommand,
        context: &OperationContext,
    ) -> LedgerResult<ReceiveOutcome>;

    async fn install(
        &self,
        command: InstallCommand,
        context: &OperationContext,
    ) -> LedgerResult<InstallationRecord>;

    async fn remove(
        &self,
        command: RemoveCommand,
        context: &OperationContext,
    ) -> LedgerResult<RemovalOutcome>;

    async fn resolve(&self, rule_id: Uuid) -> LedgerResult<Vec<Consumable>>;

    async fn resolve_for_subsystem(&self, subsystem_id: Uuid) -> LedgerResult<Vec<Consumable>>;

    async fn consumable(&self, consumable_id: Uuid) -> LedgerResult<Consumable>;

    async fn stock_level(&self, consumable_id: Uuid) -> LedgerResult<StockLevel>;

    async fn units(
        &self,
        consumable_id: Uuid,
        state: Option<UnitState>,
    ) -> LedgerResult<Vec<SerializedUnit>>;

    async fn installation(&self, installation_id: Uuid) -> LedgerResult<InstallationRecord>;

    async fn open_installations(
        &self,
        subsystem_instance_id: Uuid,
    ) -> LedgerResult<Vec<InstallationRecord>>;

    async fn history(&self, consumable_id: Uuid) -> LedgerResult<Vec<EventEnvelope>>;

    async fn receipts(&self, consumable_id: Uuid) -> LedgerResult<Vec<ReceiptRecord>>;
}

/// Reference data registration.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn register_consumable(&self, consumable: Consumable) -> LedgerResult<Consumable>;

    async fn register_group(&self, group: EquivalenceGroup) -> LedgerResult<EquivalenceGroup>;

    async fn register_subsystem(
        &self,
        subsystem: SubsystemDefinition,
    ) -> LedgerResult<SubsystemDefinition>;

    async fn register_subsystem_instance(
        &self,
        instance: SubsystemInstance,
    ) -> LedgerResult<SubsystemInstance>;

    async fn register_rule(&self, rule: CompatibilityRule) -> LedgerResult<CompatibilityRule>;
}
