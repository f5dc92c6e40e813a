pub mod catalog;
pub mod compatibility;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod units;

pub use compatibility::TechnicalAttribute;
pub use ledger::StockPosition;
pub use memory::InMemoryLedgerStore;
pub use orchestrator::{Effect, InstallTarget, Plan, plan_install, plan_receive, plan_remove};
