use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UnitState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid cost: {0}")]
    InvalidCost(String),

    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("invalid removal reason: {0}")]
    InvalidReason(String),

    #[error("{0}")]
    InvalidField(String),

    #[error("consumable {0} not found")]
    ConsumableNotFound(Uuid),

    #[error("subsystem {0} not found")]
    SubsystemNotFound(Uuid),

    #[error("equivalence group {0} not found")]
    GroupNotFound(Uuid),

    #[error("compatibility rule {0} not found")]
    RuleNotFound(Uuid),

    #[error("serialized unit {0} not found")]
    UnitNotFound(Uuid),

    #[error("installation record {0} not found")]
    RecordNotFound(Uuid),

    #[error("consumable {consumable_id} is not compatible with subsystem instance {subsystem_instance_id}")]
    IncompatibleConsumable {
        consumable_id: Uuid,
        subsystem_instance_id: Uuid,
    },

    #[error("serialized consumable {0} requires a serialized unit")]
    SerializedUnitRequired(Uuid),

    #[error("serialized unit {unit_id} is not available ({state})")]
    UnitNotAvailable { unit_id: Uuid, state: UnitState },

    #[error("insufficient stock for {consumable_id}: requested {requested}, on hand {on_hand}")]
    InsufficientStock {
        consumable_id: Uuid,
        requested: Decimal,
        on_hand: Decimal,
    },

    #[error("invalid state transition {from} -> {to}")]
    InvalidStateTransition { from: UnitState, to: UnitState },

    #[error("installation record {0} is already closed")]
    RecordClosed(Uuid),

    #[error("serial number {0} already registered")]
    DuplicateSerial(String),

    #[error("consumable code {0} already registered")]
    DuplicateCode(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl LedgerError {
    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self::InvalidField(message.into())
    }

    pub fn operation_failed<E: std::fmt::Display>(err: E) -> Self {
        Self::OperationFailed(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity(_)
            | Self::InvalidCost(_)
            | Self::InvalidReading(_)
            | Self::InvalidReason(_)
            | Self::InvalidField(_)
            | Self::SerializedUnitRequired(_) => ErrorKind::Validation,
            Self::ConsumableNotFound(_)
            | Self::SubsystemNotFound(_)
            | Self::GroupNotFound(_)
            | Self::RuleNotFound(_)
            | Self::UnitNotFound(_)
            | Self::RecordNotFound(_) => ErrorKind::NotFound,
            Self::IncompatibleConsumable { .. }
            | Self::UnitNotAvailable { .. }
            | Self::InsufficientStock { .. }
            | Self::InvalidStateTransition { .. }
            | Self::RecordClosed(_)
            | Self::DuplicateSerial(_)
            | Self::DuplicateCode(_) => ErrorKind::Conflict,
            Self::OperationFailed(_) => ErrorKind::Internal,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
