//! Receipt, installation and removal planning.
//!
//! Each `plan_*` function takes the rows a backend loaded under lock and
//! returns either an error (nothing to write) or the complete list of
//! effects the backend must apply in one transaction.

use std::collections::HashSet;

use fleetstock_core::{
    CompatibilityRule, Consumable, InstallCommand, InstallationRecord, LedgerError,
    LedgerEvent, LedgerEventKind, LedgerResult, OperationContext, ReceiptRecord,
    ReceiveCommand, ReceiveOutcome, RemovalOutcome, RemovalReason, RemoveCommand,
    SerializedUnit, SubsystemInstance,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::compatibility;
use crate::ledger::StockPosition;
use crate::units;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SaveConsumable(Consumable),
    InsertUnit(SerializedUnit),
    SaveUnit(SerializedUnit),
    InsertReceipt(ReceiptRecord),
    InsertInstallation(InstallationRecord),
    CloseInstallation(InstallationRecord),
    Record(LedgerEvent),
}

#[derive(Debug, Clone)]
pub struct Plan<T> {
    pub output: T,
    pub effects: Vec<Effect>,
}

impl<T> Plan<T> {
    /// Splits the plan into audit events and state writes.
    pub fn into_parts(self) -> (T, Vec<LedgerEvent>, Vec<Effect>) {
        let mut events = Vec::new();
        let mut writes = Vec::new();
        for effect in self.effects {
            match effect {
                Effect::Record(event) => events.push(event),
                other => writes.push(other),
            }
        }
        (self.output, events, writes)
    }
}

/// Rows an installation is planned against.
#[derive(Debug, Clone, Copy)]
pub struct InstallTarget<'a> {
    pub instance: &'a SubsystemInstance,
    pub rules: &'a [CompatibilityRule],
    pub consumable: &'a Consumable,
    pub unit: Option<&'a SerializedUnit>,
}

pub fn validate_actor(context: &OperationContext) -> LedgerResult<()> {
    if context.actor.trim().is_empty() {
        return Err(LedgerError::invalid_field("actor is required"));
    }
    Ok(())
}

pub fn plan_receive(
    consumable: &Consumable,
    existing_serials: &HashSet<String>,
    command: &ReceiveCommand,
    context: &OperationContext,
) -> LedgerResult<Plan<ReceiveOutcome>> {
    validate_actor(context)?;
    let serials = if consumable.is_serialized {
        validate_serials(command, existing_serials)?
    } else {
        if !command.serial_numbers.is_empty() {
            return Err(LedgerError::invalid_field(format!(
                "consumable {} is not serialized, serial numbers are not accepted",
                consumable.code
            )));
        }
        Vec::new()
    };

    let mut position = StockPosition::of(consumable);
    let unit_cost = position.receive(command.quantity, command.total_cost)?;

    let mut updated = consumable.clone();
    position.apply_to(&mut updated);
    updated.updated_at = context.now;

    let receipt = ReceiptRecord {
        id: Uuid::new_v4(),
        consumable_id: consumable.id,
        quantity: command.quantity,
        total_cost: command.total_cost,
        unit_cost,
        source: command.source,
        reference: command
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .map(str::to_string),
        received_by: context.actor.trim().to_string(),
        received_at: context.now,
    };

    let created: Vec<SerializedUnit> = serials
        .iter()
        .map(|serial| units::register(consumable.id, serial, command.warranty_expiry, context.now))
        .collect();

    let mut effects = vec![
        Effect::SaveConsumable(updated.clone()),
        Effect::InsertReceipt(receipt.clone()),
        Effect::Record(event(
            consumable.id,
            LedgerEventKind::StockReceived,
            context,
            json!({
                "receipt_id": receipt.id,
                "source": receipt.source.as_str(),
                "quantity": receipt.quantity,
                "total_cost": receipt.total_cost,
                "unit_cost": receipt.unit_cost,
                "on_hand": updated.on_hand_quantity,
                "average_unit_cost": updated.average_unit_cost,
            }),
        )),
    ];
    for unit in &created {
        effects.push(Effect::InsertUnit(unit.clone()));
        effects.push(Effect::Record(event(
            consumable.id,
            LedgerEventKind::UnitRegistered,
            context,
            json!({
                "unit_id": unit.id,
                "serial_number": unit.serial_number,
                "warranty_expiry": unit.warranty_expiry,
            }),
        )));
    }

    Ok(Plan {
        output: ReceiveOutcome {
            consumable: updated,
            receipt,
            units: created,
        },
        effects,
    })
}

pub fn plan_install(
    target: InstallTarget<'_>,
    command: &InstallCommand,
    context: &OperationContext,
) -> LedgerResult<Plan<InstallationRecord>> {
    validate_actor(context)?;
    if command.reading_at_install < Decimal::ZERO {
        return Err(LedgerError::InvalidReading(format!(
            "reading at install must not be negative, got {}",
            command.reading_at_install
        )));
    }

    let InstallTarget {
        instance,
        rules,
        consumable,
        unit,
    } = target;

    if !compatibility::is_compatible(rules, consumable) {
        return Err(LedgerError::IncompatibleConsumable {
            consumable_id: consumable.id,
            subsystem_instance_id: instance.id,
        });
    }

    let mut position = StockPosition::of(consumable);
    let unit_cost = position.average_cost;
    let installation_id = Uuid::new_v4();
    let mut effects = Vec::new();

    let (quantity, unit_id) = if consumable.is_serialized {
        let unit = serialized_unit_for(consumable, command.serialized_unit_id, unit)?;
        if command.quantity != Decimal::ONE {
            return Err(LedgerError::InvalidQuantity(format!(
                "serialized installs move exactly one unit, got {}",
                command.quantity
            )));
        }

        let installed = units::install(unit, instance, context.now)?;
        let reinstalled = unit.install_count > 0;
        let value = if reinstalled {
            position.reassign(Decimal::ONE)?
        } else {
            position.consume(Decimal::ONE)?
        };

        effects.push(Effect::Record(event(
            consumable.id,
            LedgerEventKind::StockConsumed,
            context,
            json!({
                "installation_id": installation_id,
                "quantity": Decimal::ONE,
                "value": value,
                "reinstalled": reinstalled,
                "on_hand": position.on_hand,
                "assigned": position.assigned,
            }),
        )));
        effects.push(Effect::Record(event(
            consumable.id,
            LedgerEventKind::UnitInstalled,
            context,
            json!({
                "installation_id": installation_id,
                "unit_id": installed.id,
                "serial_number": installed.serial_number,
                "asset_id": instance.asset_id,
                "subsystem_instance_id": instance.id,
            }),
        )));
        effects.push(Effect::SaveUnit(installed));
        (Decimal::ONE, Some(unit.id))
    } else {
        let value = position.consume(command.quantity)?;
        effects.push(Effect::Record(event(
            consumable.id,
            LedgerEventKind::StockConsumed,
            context,
            json!({
                "installation_id": installation_id,
                "quantity": command.quantity,
                "value": value,
                "on_hand": position.on_hand,
                "assigned": position.assigned,
            }),
        )));
        (command.quantity, None)
    };

    let mut updated = consumable.clone();
    position.apply_to(&mut updated);
    updated.updated_at = context.now;

    let record = InstallationRecord {
        id: installation_id,
        consumable_id: consumable.id,
        serialized_unit_id: unit_id,
        asset_id: instance.asset_id,
        subsystem_instance_id: instance.id,
        quantity,
        unit_cost,
        reading_at_install: command.reading_at_install,
        installed_by: context.actor.trim().to_string(),
        installed_at: context.now,
        removed_at: None,
        removal_reason: None,
        reading_at_removal: None,
        removed_by: None,
    };

    effects.insert(0, Effect::SaveConsumable(updated));
    effects.push(Effect::InsertInstallation(record.clone()));

    Ok(Plan {
        output: record,
        effects,
    })
}

pub fn plan_remove(
    record: &InstallationRecord,
    consumable: &Consumable,
    unit: Option<&SerializedUnit>,
    command: &RemoveCommand,
    context: &OperationContext,
) -> LedgerResult<Plan<RemovalOutcome>> {
    validate_actor(context)?;
    if !record.is_open() {
        return Err(LedgerError::RecordClosed(record.id));
    }
    if let Some(reading) = command.reading_at_removal {
        if reading < record.reading_at_install {
            return Err(LedgerError::InvalidReading(format!(
                "reading at removal {reading} is below reading at install {}",
                record.reading_at_install
            )));
        }
    }

    let mut position = StockPosition::of(consumable);
    let mut effects = Vec::new();

    let released = if consumable.is_serialized {
        let unit = serialized_unit_for(consumable, record.serialized_unit_id, unit)?;
        let removed = units::remove(unit, command.reason, context.now)?;
        let value = position.release_assigned(record.quantity)?;

        effects.push(Effect::Record(event(
            consumable.id,
            LedgerEventKind::UnitReleased,
            context,
            json!({
                "installation_id": record.id,
                "unit_id": removed.id,
                "serial_number": removed.serial_number,
                "reason": command.reason.as_str(),
                "state": removed.state.as_str(),
                "value": value,
                "assigned": position.assigned,
            }),
        )));
        effects.push(Effect::SaveUnit(removed.clone()));
        Some(removed)
    } else {
        let (kind, value) = match command.reason {
            RemovalReason::Intact => (
                LedgerEventKind::StockReturned,
                position.return_to_stock(record.quantity)?,
            ),
            RemovalReason::Damaged | RemovalReason::Wear | RemovalReason::Destroyed => (
                LedgerEventKind::StockWrittenOff,
                position.write_off_assigned(record.quantity)?,
            ),
        };

        effects.push(Effect::Record(event(
            consumable.id,
            kind,
            context,
            json!({
                "installation_id": record.id,
                "reason": command.reason.as_str(),
                "quantity": record.quantity,
                "value": value,
                "on_hand": position.on_hand,
                "assigned": position.assigned,
            }),
        )));
        None
    };

    let mut updated = consumable.clone();
    position.apply_to(&mut updated);
    updated.updated_at = context.now;

    let closed = InstallationRecord {
        removed_at: Some(context.now),
        removal_reason: Some(command.reason),
        reading_at_removal: command.reading_at_removal,
        removed_by: Some(context.actor.trim().to_string()),
        ..record.clone()
    };

    effects.insert(0, Effect::SaveConsumable(updated.clone()));
    effects.push(Effect::CloseInstallation(closed.clone()));
    effects.push(Effect::Record(event(
        consumable.id,
        LedgerEventKind::InstallationClosed,
        context,
        json!({
            "installation_id": closed.id,
            "reason": command.reason.as_str(),
            "reading_at_removal": closed.reading_at_removal,
        }),
    )));

    Ok(Plan {
        output: RemovalOutcome {
            installation: closed,
            consumable: updated,
            unit: released,
        },
        effects,
    })
}

fn validate_serials(
    command: &ReceiveCommand,
    existing_serials: &HashSet<String>,
) -> LedgerResult<Vec<String>> {
    if command.quantity.fract() != Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(format!(
            "serialized quantities must be whole units, got {}",
            command.quantity
        )));
    }
    if Decimal::from(command.serial_numbers.len()) != command.quantity {
        return Err(LedgerError::InvalidQuantity(format!(
            "received {} units but {} serial numbers",
            command.quantity,
            command.serial_numbers.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut serials = Vec::with_capacity(command.serial_numbers.len());
    for raw in &command.serial_numbers {
        let serial = raw.trim();
        if serial.is_empty() {
            return Err(LedgerError::invalid_field("serial numbers must not be blank"));
        }
        if existing_serials.contains(serial) || !seen.insert(serial) {
            return Err(LedgerError::DuplicateSerial(serial.to_string()));
        }
        serials.push(serial.to_string());
    }

    Ok(serials)
}

fn serialized_unit_for<'a>(
    consumable: &Consumable,
    requested: Option<Uuid>,
    loaded: Option<&'a SerializedUnit>,
) -> LedgerResult<&'a SerializedUnit> {
    let unit_id = requested.ok_or(LedgerError::SerializedUnitRequired(consumable.id))?;
    let unit = loaded
        .filter(|unit| unit.id == unit_id)
        .ok_or(LedgerError::UnitNotFound(unit_id))?;
    if unit.consumable_id != consumable.id {
        return Err(LedgerError::UnitNotAvailable {
            unit_id: unit.id,
            state: unit.state,
        });
    }
    Ok(unit)
}

fn event(
    consumable_id: Uuid,
    kind: LedgerEventKind,
    context: &OperationContext,
    payload: serde_json::Value,
) -> LedgerEvent {
    LedgerEvent::new(consumable_id, kind, context.actor.trim(), context.now, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use fleetstock_core::{ConsumableCategory, ReceiptSource, RuleStrategy, UnitState};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn context() -> OperationContext {
        OperationContext::new(now(), "mechanic-07")
    }

    fn stocked_oil(on_hand: i64) -> Consumable {
        let mut oil = Consumable::new("OIL-5W30", "Engine oil 5W30", ConsumableCategory::Oil, false, now());
        oil.on_hand_quantity = Decimal::new(on_hand, 0);
        oil.average_unit_cost = Decimal::new(2, 0);
        oil
    }

    fn slot() -> SubsystemInstance {
        SubsystemInstance {
            id: Uuid::new_v4(),
            subsystem_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            label: "engine".to_string(),
        }
    }

    fn allow(instance: &SubsystemInstance, consumable: &Consumable) -> Vec<CompatibilityRule> {
        vec![CompatibilityRule {
            id: Uuid::new_v4(),
            subsystem_id: instance.subsystem_id,
            strategy: RuleStrategy::Individual {
                consumable_id: consumable.id,
            },
        }]
    }

    fn receive(quantity: i64, total_cost: i64, serials: &[&str]) -> ReceiveCommand {
        ReceiveCommand {
            consumable_id: Uuid::nil(),
            quantity: Decimal::new(quantity, 0),
            total_cost: Decimal::new(total_cost, 0),
            source: ReceiptSource::PurchaseOrder,
            reference: Some(" PO-2024-118 ".to_string()),
            serial_numbers: serials.iter().map(|s| s.to_string()).collect(),
            warranty_expiry: NaiveDate::from_ymd_opt(2025, 1, 1),
        }
    }

    fn install(instance: &SubsystemInstance, consumable: &Consumable, quantity: i64, unit: Option<Uuid>) -> InstallCommand {
        InstallCommand {
            subsystem_instance_id: instance.id,
            consumable_id: consumable.id,
            quantity: Decimal::new(quantity, 0),
            serialized_unit_id: unit,
            reading_at_install: Decimal::new(120_500, 0),
        }
    }

    fn saved_consumable(effects: &[Effect]) -> Option<&Consumable> {
        effects.iter().find_map(|effect| match effect {
            Effect::SaveConsumable(consumable) => Some(consumable),
            _ => None,
        })
    }

    #[test]
    fn receipt_updates_ledger_and_writes_a_record() {
        let oil = stocked_oil(10);
        let plan = plan_receive(&oil, &HashSet::new(), &receive(5, 20, &[]), &context())
            .expect("plan");

        let outcome = &plan.output;
        assert_eq!(outcome.consumable.on_hand_quantity, Decimal::new(15, 0));
        assert_eq!(
            outcome.consumable.average_unit_cost.round_dp(4),
            Decimal::new(26667, 4)
        );
        assert_eq!(outcome.receipt.unit_cost, Decimal::new(4, 0));
        assert_eq!(outcome.receipt.reference.as_deref(), Some("PO-2024-118"));
        assert!(outcome.units.is_empty());
        assert!(plan
            .effects
            .iter()
            .any(|effect| matches!(effect, Effect::InsertReceipt(_))));
    }

    #[test]
    fn serialized_receipt_registers_one_unit_per_serial() {
        let tire = Consumable::new("TIRE-315", "Tire 315/80", ConsumableCategory::Tire, true, now());
        let plan = plan_receive(&tire, &HashSet::new(), &receive(2, 800, &["A1", "A2"]), &context())
            .expect("plan");

        assert_eq!(plan.output.units.len(), 2);
        assert!(plan
            .output
            .units
            .iter()
            .all(|unit| unit.state == UnitState::Available));
        let (_, events, writes) = plan.into_parts();
        assert_eq!(
            events
                .iter()
                .filter(|event| event.kind == LedgerEventKind::UnitRegistered)
                .count(),
            2
        );
        assert_eq!(
            writes
                .iter()
                .filter(|effect| matches!(effect, Effect::InsertUnit(_)))
                .count(),
            2
        );
    }

    #[test]
    fn serialized_receipt_checks_serials() {
        let tire = Consumable::new("TIRE-315", "Tire 315/80", ConsumableCategory::Tire, true, now());
        let existing: HashSet<String> = ["A1".to_string()].into_iter().collect();

        assert!(matches!(
            plan_receive(&tire, &HashSet::new(), &receive(2, 800, &["A1"]), &context()),
            Err(LedgerError::InvalidQuantity(_))
        ));
        assert_eq!(
            plan_receive(&tire, &HashSet::new(), &receive(2, 800, &["B1", " B1"]), &context())
                .expect_err("duplicate"),
            LedgerError::DuplicateSerial("B1".to_string())
        );
        assert_eq!(
            plan_receive(&tire, &existing, &receive(1, 400, &["A1"]), &context())
                .expect_err("already known"),
            LedgerError::DuplicateSerial("A1".to_string())
        );
    }

    #[test]
    fn fungible_receipt_refuses_serials() {
        let oil = stocked_oil(0);
        assert!(matches!(
            plan_receive(&oil, &HashSet::new(), &receive(1, 4, &["X"]), &context()),
            Err(LedgerError::InvalidField(_))
        ));
    }

    #[test]
    fn fungible_install_consumes_stock() {
        let oil = stocked_oil(10);
        let instance = slot();
        let rules = allow(&instance, &oil);
        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &oil,
            unit: None,
        };

        let plan = plan_install(target, &install(&instance, &oil, 3, None), &context())
            .expect("plan");

        let saved = saved_consumable(&plan.effects).expect("ledger write");
        assert_eq!(saved.on_hand_quantity, Decimal::new(7, 0));
        assert_eq!(saved.assigned_quantity, Decimal::new(3, 0));
        assert_eq!(plan.output.quantity, Decimal::new(3, 0));
        assert_eq!(plan.output.unit_cost, Decimal::new(2, 0));
        assert_eq!(plan.output.installed_value(), Some(Decimal::new(6, 0)));
        assert!(plan.output.is_open());
    }

    #[test]
    fn install_without_matching_rule_is_incompatible() {
        let oil = stocked_oil(10);
        let instance = slot();
        let target = InstallTarget {
            instance: &instance,
            rules: &[],
            consumable: &oil,
            unit: None,
        };

        assert!(matches!(
            plan_install(target, &install(&instance, &oil, 1, None), &context()),
            Err(LedgerError::IncompatibleConsumable { .. })
        ));
    }

    #[test]
    fn fungible_install_beyond_stock_fails() {
        let oil = stocked_oil(2);
        let instance = slot();
        let rules = allow(&instance, &oil);
        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &oil,
            unit: None,
        };

        assert!(matches!(
            plan_install(target, &install(&instance, &oil, 3, None), &context()),
            Err(LedgerError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn serialized_install_needs_an_available_unit() {
        let mut tire = Consumable::new("TIRE-315", "Tire 315/80", ConsumableCategory::Tire, true, now());
        tire.on_hand_quantity = Decimal::ONE;
        let instance = slot();
        let rules = allow(&instance, &tire);
        let unit = units::register(tire.id, "A1", None, now());

        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &tire,
            unit: None,
        };
        assert_eq!(
            plan_install(target, &install(&instance, &tire, 1, None), &context())
                .expect_err("no unit"),
            LedgerError::SerializedUnitRequired(tire.id)
        );

        let damaged = SerializedUnit {
            state: UnitState::Damaged,
            ..unit.clone()
        };
        let target = InstallTarget {
            unit: Some(&damaged),
            ..target
        };
        assert!(matches!(
            plan_install(target, &install(&instance, &tire, 1, Some(unit.id)), &context()),
            Err(LedgerError::UnitNotAvailable { .. })
        ));

        let target = InstallTarget {
            unit: Some(&unit),
            ..target
        };
        let plan = plan_install(target, &install(&instance, &tire, 1, Some(unit.id)), &context())
            .expect("plan");
        let saved = saved_consumable(&plan.effects).expect("ledger write");
        assert_eq!(saved.on_hand_quantity, Decimal::ZERO);
        assert_eq!(saved.assigned_quantity, Decimal::ONE);
        assert_eq!(plan.output.serialized_unit_id, Some(unit.id));
    }

    #[test]
    fn reinstalling_a_returned_unit_does_not_touch_on_hand() {
        let mut tire = Consumable::new("TIRE-315", "Tire 315/80", ConsumableCategory::Tire, true, now());
        tire.on_hand_quantity = Decimal::new(4, 0);
        let instance = slot();
        let rules = allow(&instance, &tire);
        let returned = SerializedUnit {
            install_count: 1,
            ..units::register(tire.id, "A1", None, now())
        };
        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &tire,
            unit: Some(&returned),
        };

        let plan = plan_install(target, &install(&instance, &tire, 1, Some(returned.id)), &context())
            .expect("plan");
        let saved = saved_consumable(&plan.effects).expect("ledger write");
        assert_eq!(saved.on_hand_quantity, Decimal::new(4, 0));
        assert_eq!(saved.assigned_quantity, Decimal::ONE);
    }

    #[test]
    fn fungible_removal_depends_on_reason() {
        let mut oil = stocked_oil(7);
        oil.assigned_quantity = Decimal::new(3, 0);
        let instance = slot();
        let record = InstallationRecord {
            id: Uuid::new_v4(),
            consumable_id: oil.id,
            serialized_unit_id: None,
            asset_id: instance.asset_id,
            subsystem_instance_id: instance.id,
            quantity: Decimal::new(3, 0),
            unit_cost: Decimal::new(2, 0),
            reading_at_install: Decimal::new(1000, 0),
            installed_by: "mechanic-07".to_string(),
            installed_at: now(),
            removed_at: None,
            removal_reason: None,
            reading_at_removal: None,
            removed_by: None,
        };
        let remove = |reason| RemoveCommand {
            installation_id: record.id,
            reason,
            reading_at_removal: Some(Decimal::new(1500, 0)),
        };

        let intact = plan_remove(&record, &oil, None, &remove(RemovalReason::Intact), &context())
            .expect("intact");
        assert_eq!(intact.output.consumable.on_hand_quantity, Decimal::new(10, 0));
        assert_eq!(intact.output.consumable.assigned_quantity, Decimal::ZERO);
        assert_eq!(intact.output.installation.removal_reason, Some(RemovalReason::Intact));

        let lost = plan_remove(&record, &oil, None, &remove(RemovalReason::Wear), &context())
            .expect("wear");
        assert_eq!(lost.output.consumable.on_hand_quantity, Decimal::new(7, 0));
        assert_eq!(lost.output.consumable.assigned_quantity, Decimal::ZERO);
        assert!(!lost.output.installation.is_open());
    }

    #[test]
    fn closed_records_and_backwards_readings_are_rejected() {
        let mut oil = stocked_oil(7);
        oil.assigned_quantity = Decimal::ONE;
        let record = InstallationRecord {
            id: Uuid::new_v4(),
            consumable_id: oil.id,
            serialized_unit_id: None,
            asset_id: Uuid::new_v4(),
            subsystem_instance_id: Uuid::new_v4(),
            quantity: Decimal::ONE,
            unit_cost: Decimal::ONE,
            reading_at_install: Decimal::new(1000, 0),
            installed_by: "mechanic-07".to_string(),
            installed_at: now(),
            removed_at: None,
            removal_reason: None,
            reading_at_removal: None,
            removed_by: None,
        };

        let backwards = RemoveCommand {
            installation_id: record.id,
            reason: RemovalReason::Intact,
            reading_at_removal: Some(Decimal::new(999, 0)),
        };
        assert!(matches!(
            plan_remove(&record, &oil, None, &backwards, &context()),
            Err(LedgerError::InvalidReading(_))
        ));

        let closed = InstallationRecord {
            removed_at: Some(now()),
            ..record.clone()
        };
        let command = RemoveCommand {
            reading_at_removal: None,
            ..backwards
        };
        assert_eq!(
            plan_remove(&closed, &oil, None, &command, &context()).expect_err("closed"),
            LedgerError::RecordClosed(record.id)
        );
    }

    #[test]
    fn blank_actor_is_rejected_before_anything_else() {
        let oil = stocked_oil(1);
        let anonymous = OperationContext::new(now(), "  ");
        assert!(matches!(
            plan_receive(&oil, &HashSet::new(), &receive(1, 1, &[]), &anonymous),
            Err(LedgerError::InvalidField(_))
        ));
    }
}
