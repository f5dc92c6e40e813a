use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumableCategory {
    Oil,
    Fluid,
    Filter,
    Tire,
    Battery,
    Bulb,
    Part,
}

impl ConsumableCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oil => "OIL",
            Self::Fluid => "FLUID",
            Self::Filter => "FILTER",
            Self::Tire => "TIRE",
            Self::Battery => "BATTERY",
            Self::Bulb => "BULB",
            Self::Part => "PART",
        }
    }
}

impl FromStr for ConsumableCategory {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OIL" => Ok(Self::Oil),
            "FLUID" => Ok(Self::Fluid),
            "FILTER" => Ok(Self::Filter),
            "TIRE" => Ok(Self::Tire),
            "BATTERY" => Ok(Self::Battery),
            "BULB" => Ok(Self::Bulb),
            "PART" => Ok(Self::Part),
            other => Err(LedgerError::invalid_field(format!(
                "unsupported consumable category: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConsumableCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Technical sub-record of a consumable.
///
/// Which field is relevant depends on the category; the mapping lives in the
/// compatibility resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TechnicalSpec {
    pub group_id: Option<Uuid>,
    pub viscosity: Option<String>,
    pub fluid_norm: Option<String>,
    pub reference: Option<String>,
    pub tire_size: Option<String>,
    pub battery_code: Option<String>,
    pub bulb_socket: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consumable {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: ConsumableCategory,
    pub unit_of_measure: String,
    pub is_serialized: bool,
    pub on_hand_quantity: Decimal,
    pub assigned_quantity: Decimal,
    pub average_unit_cost: Decimal,
    pub technical: TechnicalSpec,
    pub updated_at: DateTime<Utc>,
}

impl Consumable {
    /// Catalog entry with empty stock.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: ConsumableCategory,
        is_serialized: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            category,
            unit_of_measure: if is_serialized { "UNIT" } else { "LITER" }.to_string(),
            is_serialized,
            on_hand_quantity: Decimal::ZERO,
            assigned_quantity: Decimal::ZERO,
            average_unit_cost: Decimal::ZERO,
            technical: TechnicalSpec::default(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EquivalenceGroup {
    pub id: Uuid,
    pub name: String,
    pub category: ConsumableCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubsystemDefinition {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubsystemInstance {
    pub id: Uuid,
    pub subsystem_id: Uuid,
    pub asset_id: Uuid,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    Available,
    Installed,
    Warranty,
    Damaged,
    Retired,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Installed => "INSTALLED",
            Self::Warranty => "WARRANTY",
            Self::Damaged => "DAMAGED",
            Self::Retired => "RETIRED",
        }
    }
}

impl FromStr for UnitState {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(Self::Available),
            "INSTALLED" => Ok(Self::Installed),
            "WARRANTY" => Ok(Self::Warranty),
            "DAMAGED" => Ok(Self::Damaged),
            "RETIRED" => Ok(Self::Retired),
            other => Err(LedgerError::invalid_field(format!(
                "unsupported unit state: {other}"
            ))),
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerializedUnit {
    pub id: Uuid,
    pub consumable_id: Uuid,
    pub serial_number: String,
    pub state: UnitState,
    pub asset_id: Option<Uuid>,
    pub subsystem_instance_id: Option<Uuid>,
    pub warranty_expiry: Option<NaiveDate>,
    pub install_count: i32,
    pub installed_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptSource {
    PurchaseOrder,
    Supplier,
    Correction,
}

impl ReceiptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "PURCHASE_ORDER",
            Self::Supplier => "SUPPLIER",
            Self::Correction => "CORRECTION",
        }
    }
}

impl FromStr for ReceiptSource {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PURCHASE_ORDER" => Ok(Self::PurchaseOrder),
            "SUPPLIER" => Ok(Self::Supplier),
            "CORRECTION" => Ok(Self::Correction),
            other => Err(LedgerError::invalid_field(format!(
                "unsupported receipt source: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptRecord {
    pub id: Uuid,
    pub consumable_id: Uuid,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub unit_cost: Decimal,
    pub source: ReceiptSource,
    pub reference: Option<String>,
    pub received_by: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    /// Returned to stock, functions correctly.
    Intact,
    Damaged,
    Wear,
    /// Destroyed or consumed with no recovery path.
    Destroyed,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intact => "INTACT",
            Self::Damaged => "DAMAGED",
            Self::Wear => "WEAR",
            Self::Destroyed => "DESTROYED",
        }
    }
}

impl FromStr for RemovalReason {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INTACT" => Ok(Self::Intact),
            "DAMAGED" => Ok(Self::Damaged),
            "WEAR" => Ok(Self::Wear),
            "DESTROYED" => Ok(Self::Destroyed),
            other => Err(LedgerError::InvalidReason(other.to_string())),
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallationRecord {
    pub id: Uuid,
    pub consumable_id: Uuid,
    pub serialized_unit_id: Option<Uuid>,
    pub asset_id: Uuid,
    pub subsystem_instance_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reading_at_install: Decimal,
    pub installed_by: String,
    pub installed_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removal_reason: Option<RemovalReason>,
    pub reading_at_removal: Option<Decimal>,
    pub removed_by: Option<String>,
}

impl InstallationRecord {
    pub fn is_open(&self) -> bool {
        self.removed_at.is_none()
    }

    /// `None` when the product leaves the decimal range.
    pub fn installed_value(&self) -> Option<Decimal> {
        self.quantity
            .checked_mul(self.unit_cost)
            .map(|value| value.round_dp(4))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStrategy {
    Group {
        group_id: Uuid,
    },
    Technical {
        category: ConsumableCategory,
        value: String,
    },
    Individual {
        consumable_id: Uuid,
    },
}

impl RuleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group { .. } => "GROUP",
            Self::Technical { .. } => "TECHNICAL",
            Self::Individual { .. } => "INDIVIDUAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompatibilityRule {
    pub id: Uuid,
    pub subsystem_id: Uuid,
    pub strategy: RuleStrategy,
}

/// Counters as seen by a caller; `available` counts free units for
/// serialized goods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub consumable_id: Uuid,
    pub on_hand: Decimal,
    pub assigned: Decimal,
    pub available: Decimal,
    pub average_unit_cost: Decimal,
    pub stock_value: Decimal,
}

/// Ambient inputs every ledger operation receives explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub now: DateTime<Utc>,
    pub actor: String,
}

impl OperationContext {
    pub fn new(now: DateTime<Utc>, actor: impl Into<String>) -> Self {
        Self {
            now,
            actor: actor.into(),
        }
    }
}
