use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use fleetstock_core::{
    CatalogStore, CompatibilityRule, Consumable, EquivalenceGroup, EventEnvelope, EventStore,
    InstallCommand, InstallationRecord, LedgerError, LedgerResult, LedgerStore,
    OperationContext, ReceiptRecord, ReceiveCommand, ReceiveOutcome, RemovalOutcome,
    RemoveCommand, RuleStrategy, SerializedUnit, StockLevel, SubsystemDefinition,
    SubsystemInstance, UnitState,
};
use fleetstock_eventstore::InMemoryEventStore;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::compatibility;
use crate::ledger::StockPosition;
use crate::orchestrator::{self, Effect, InstallTarget, Plan};

#[derive(Default)]
struct LedgerState {
    consumables: HashMap<Uuid, Consumable>,
    groups: HashMap<Uuid, EquivalenceGroup>,
    subsystems: HashMap<Uuid, SubsystemDefinition>,
    instances: HashMap<Uuid, SubsystemInstance>,
    rules: HashMap<Uuid, CompatibilityRule>,
    units: HashMap<Uuid, SerializedUnit>,
    receipts: Vec<ReceiptRecord>,
    installations: HashMap<Uuid, InstallationRecord>,
}

impl LedgerState {
    fn consumable(&self, id: Uuid) -> LedgerResult<&Consumable> {
        self.consumables
            .get(&id)
            .ok_or(LedgerError::ConsumableNotFound(id))
    }

    fn rules_for(&self, subsystem_id: Uuid) -> Vec<CompatibilityRule> {
        self.rules
            .values()
            .filter(|rule| rule.subsystem_id == subsystem_id)
            .cloned()
            .collect()
    }

    fn serials_of(&self, consumable_id: Uuid) -> HashSet<String> {
        self.units
            .values()
            .filter(|unit| unit.consumable_id == consumable_id)
            .map(|unit| unit.serial_number.clone())
            .collect()
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SaveConsumable(consumable) => {
                self.consumables.insert(consumable.id, consumable);
            }
            Effect::InsertUnit(unit) | Effect::SaveUnit(unit) => {
                self.units.insert(unit.id, unit);
            }
            Effect::InsertReceipt(receipt) => self.receipts.push(receipt),
            Effect::InsertInstallation(record) | Effect::CloseInstallation(record) => {
                self.installations.insert(record.id, record);
            }
            Effect::Record(_) => {}
        }
    }
}

/// Ledger kept in process memory. A single write lock spans load, plan and
/// apply, so every operation is serializable against every other.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
    events: InMemoryEventStore,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit events go in first as one batch; state writes cannot fail, so a
    /// failed append leaves everything untouched.
    async fn commit<T>(
        &self,
        state: &mut LedgerState,
        stream_id: Uuid,
        plan: Plan<T>,
    ) -> LedgerResult<T> {
        let (output, events, writes) = plan.into_parts();
        self.events
            .append_batch(stream_id, events)
            .await
            .map_err(LedgerError::operation_failed)?;

        for write in writes {
            state.apply(write);
        }
        Ok(output)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn receive(
        &self,
        command: ReceiveCommand,
        context: &OperationContext,
    ) -> LedgerResult<ReceiveOutcome> {
        let mut state = self.state.write().await;
        let consumable = state.consumable(command.consumable_id)?;
        let existing = state.serials_of(consumable.id);

        let plan = orchestrator::plan_receive(consumable, &existing, &command, context)?;
        let outcome = self.commit(&mut state, command.consumable_id, plan).await?;

        info!(
            consumable_id = %outcome.consumable.id,
            quantity = %outcome.receipt.quantity,
            average_unit_cost = %outcome.consumable.average_unit_cost,
            "stock received"
        );
        Ok(outcome)
    }

    async fn install(
        &self,
        command: InstallCommand,
        context: &OperationContext,
    ) -> LedgerResult<InstallationRecord> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get(&command.subsystem_instance_id)
            .cloned()
            .ok_or(LedgerError::SubsystemNotFound(command.subsystem_instance_id))?;
        let consumable = state.consumable(command.consumable_id)?.clone();
        let rules = state.rules_for(instance.subsystem_id);
        // A unit only matters once the consumable is known to fit.
        let unit_id = command.serialized_unit_id.filter(|_| {
            consumable.is_serialized && compatibility::is_compatible(&rules, &consumable)
        });
        let unit = match unit_id {
            Some(unit_id) => Some(
                state
                    .units
                    .get(&unit_id)
                    .cloned()
                    .ok_or(LedgerError::UnitNotFound(unit_id))?,
            ),
            None => None,
        };

        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &consumable,
            unit: unit.as_ref(),
        };
        let plan = orchestrator::plan_install(target, &command, context)?;
        let record = self.commit(&mut state, consumable.id, plan).await?;

        info!(
            installation_id = %record.id,
            consumable_id = %record.consumable_id,
            subsystem_instance_id = %record.subsystem_instance_id,
            quantity = %record.quantity,
            "consumable installed"
        );
        Ok(record)
    }

    async fn remove(
        &self,
        command: RemoveCommand,
        context: &OperationContext,
    ) -> LedgerResult<RemovalOutcome> {
        let mut state = self.state.write().await;
        let record = state
            .installations
            .get(&command.installation_id)
            .cloned()
            .ok_or(LedgerError::RecordNotFound(command.installation_id))?;
        let consumable = state.consumable(record.consumable_id)?.clone();
        let unit = match record.serialized_unit_id {
            Some(unit_id) => Some(
                state
                    .units
                    .get(&unit_id)
                    .cloned()
                    .ok_or(LedgerError::UnitNotFound(unit_id))?,
            ),
            None => None,
        };

        let plan =
            orchestrator::plan_remove(&record, &consumable, unit.as_ref(), &command, context)?;
        let outcome = self.commit(&mut state, consumable.id, plan).await?;

        info!(
            installation_id = %outcome.installation.id,
            reason = %command.reason,
            unit_state = ?outcome.unit.as_ref().map(|unit| unit.state),
            "consumable removed"
        );
        Ok(outcome)
    }

    async fn resolve(&self, rule_id: Uuid) -> LedgerResult<Vec<Consumable>> {
        let state = self.state.read().await;
        let rule = state
            .rules
            .get(&rule_id)
            .ok_or(LedgerError::RuleNotFound(rule_id))?;
        Ok(compatibility::resolve(rule, state.consumables.values()))
    }

    async fn resolve_for_subsystem(&self, subsystem_id: Uuid) -> LedgerResult<Vec<Consumable>> {
        let state = self.state.read().await;
        if !state.subsystems.contains_key(&subsystem_id) {
            return Err(LedgerError::SubsystemNotFound(subsystem_id));
        }
        let rules = state.rules_for(subsystem_id);
        Ok(compatibility::resolve_any(&rules, state.consumables.values()))
    }

    async fn consumable(&self, consumable_id: Uuid) -> LedgerResult<Consumable> {
        let state = self.state.read().await;
        state.consumable(consumable_id).cloned()
    }

    async fn stock_level(&self, consumable_id: Uuid) -> LedgerResult<StockLevel> {
        let state = self.state.read().await;
        let consumable = state.consumable(consumable_id)?;
        let position = StockPosition::of(consumable);

        let available = if consumable.is_serialized {
            let free = state
                .units
                .values()
                .filter(|unit| {
                    unit.consumable_id == consumable_id && unit.state == UnitState::Available
                })
                .count();
            Decimal::from(free)
        } else {
            position.on_hand
        };

        Ok(StockLevel {
            consumable_id,
            on_hand: position.on_hand,
            assigned: position.assigned,
            available,
            average_unit_cost: position.average_cost,
            stock_value: position.stock_value()?,
        })
    }

    async fn units(
        &self,
        consumable_id: Uuid,
        state_filter: Option<UnitState>,
    ) -> LedgerResult<Vec<SerializedUnit>> {
        let state = self.state.read().await;
        state.consumable(consumable_id)?;

        let mut units: Vec<SerializedUnit> = state
            .units
            .values()
            .filter(|unit| unit.consumable_id == consumable_id)
            .filter(|unit| state_filter.is_none_or(|wanted| unit.state == wanted))
            .cloned()
            .collect();
        units.sort_by(|left, right| left.serial_number.cmp(&right.serial_number));
        Ok(units)
    }

    async fn installation(&self, installation_id: Uuid) -> LedgerResult<InstallationRecord> {
        let state = self.state.read().await;
        state
            .installations
            .get(&installation_id)
            .cloned()
            .ok_or(LedgerError::RecordNotFound(installation_id))
    }

    async fn open_installations(
        &self,
        subsystem_instance_id: Uuid,
    ) -> LedgerResult<Vec<InstallationRecord>> {
        let state = self.state.read().await;
        if !state.instances.contains_key(&subsystem_instance_id) {
            return Err(LedgerError::SubsystemNotFound(subsystem_instance_id));
        }

        let mut records: Vec<InstallationRecord> = state
            .installations
            .values()
            .filter(|record| {
                record.subsystem_instance_id == subsystem_instance_id && record.is_open()
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.installed_at);
        Ok(records)
    }

    async fn history(&self, consumable_id: Uuid) -> LedgerResult<Vec<EventEnvelope>> {
        self.events
            .stream(consumable_id)
            .await
            .map_err(LedgerError::operation_failed)
    }

    async fn receipts(&self, consumable_id: Uuid) -> LedgerResult<Vec<ReceiptRecord>> {
        let state = self.state.read().await;
        state.consumable(consumable_id)?;
        Ok(state
            .receipts
            .iter()
            .filter(|receipt| receipt.consumable_id == consumable_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogStore for InMemoryLedgerStore {
    async fn register_consumable(&self, consumable: Consumable) -> LedgerResult<Consumable> {
        let consumable = crate::catalog::prepare_consumable(consumable)?;
        let mut state = self.state.write().await;
        if state
            .consumables
            .values()
            .any(|existing| existing.code == consumable.code)
        {
            return Err(LedgerError::DuplicateCode(consumable.code));
        }
        if let Some(group_id) = consumable.technical.group_id {
            if !state.groups.contains_key(&group_id) {
                return Err(LedgerError::GroupNotFound(group_id));
            }
        }

        debug!(consumable_id = %consumable.id, code = %consumable.code, "consumable registered");
        state.consumables.insert(consumable.id, consumable.clone());
        Ok(consumable)
    }

    async fn register_group(&self, group: EquivalenceGroup) -> LedgerResult<EquivalenceGroup> {
        let group = crate::catalog::prepare_group(group)?;
        let mut state = self.state.write().await;
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn register_subsystem(
        &self,
        subsystem: SubsystemDefinition,
    ) -> LedgerResult<SubsystemDefinition> {
        let subsystem = crate::catalog::prepare_subsystem(subsystem)?;
        let mut state = self.state.write().await;
        state.subsystems.insert(subsystem.id, subsystem.clone());
        Ok(subsystem)
    }

    async fn register_subsystem_instance(
        &self,
        instance: SubsystemInstance,
    ) -> LedgerResult<SubsystemInstance> {
        let instance = crate::catalog::prepare_instance(instance)?;
        let mut state = self.state.write().await;
        if !state.subsystems.contains_key(&instance.subsystem_id) {
            return Err(LedgerError::SubsystemNotFound(instance.subsystem_id));
        }
        state.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn register_rule(&self, rule: CompatibilityRule) -> LedgerResult<CompatibilityRule> {
        let rule = crate::catalog::prepare_rule(rule)?;
        let mut state = self.state.write().await;
        if !state.subsystems.contains_key(&rule.subsystem_id) {
            return Err(LedgerError::SubsystemNotFound(rule.subsystem_id));
        }
        match &rule.strategy {
            RuleStrategy::Group { group_id } if !state.groups.contains_key(group_id) => {
                return Err(LedgerError::GroupNotFound(*group_id));
            }
            _ => {}
        }
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }
}
