pub mod error;
pub mod events;
pub mod models;
pub mod storage;

pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use events::{LedgerEvent, LedgerEventKind};
pub use models::{
    CompatibilityRule, Consumable, ConsumableCategory, EquivalenceGroup, InstallationRecord,
    OperationContext, ReceiptRecord, ReceiptSource, RemovalReason, RuleStrategy, SerializedUnit,
    StockLevel, SubsystemDefinition, SubsystemInstance, TechnicalSpec, UnitState,
};
pub use storage::{
    CatalogStore, EventEnvelope, EventStore, InstallCommand, LedgerStore, ReceiveCommand,
    ReceiveOutcome, RemovalOutcome, RemoveCommand,
};
