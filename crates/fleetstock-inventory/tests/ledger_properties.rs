//! Costing and counter laws, checked with proptest.

use chrono::{TimeZone, Utc};
use fleetstock_core::{
    CompatibilityRule, Consumable, ConsumableCategory, InstallCommand, OperationContext,
    RemovalReason, RemoveCommand, RuleStrategy, SubsystemInstance,
};
use fleetstock_inventory::{InstallTarget, StockPosition, plan_install, plan_remove};
use proptest::collection::vec;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn empty_position() -> StockPosition {
    StockPosition {
        consumable_id: Uuid::new_v4(),
        on_hand: Decimal::ZERO,
        assigned: Decimal::ZERO,
        average_cost: Decimal::ZERO,
    }
}

fn close_enough(left: Decimal, right: Decimal) -> bool {
    (left - right).abs() <= Decimal::new(1, 12)
}

fn context() -> OperationContext {
    let now = Utc
        .with_ymd_and_hms(2024, 5, 1, 7, 0, 0)
        .single()
        .expect("valid timestamp");
    OperationContext::new(now, "mechanic-12")
}

fn oil_with_stock(on_hand: i64, assigned: i64, cents: i64) -> Consumable {
    let mut oil = Consumable::new("OIL-15W40", "Engine oil 15W40", ConsumableCategory::Oil, false, context().now);
    oil.on_hand_quantity = Decimal::new(on_hand, 0);
    oil.assigned_quantity = Decimal::new(assigned, 0);
    oil.average_unit_cost = Decimal::new(cents, 2);
    oil
}

fn install_then_remove(
    oil: &Consumable,
    quantity: i64,
    reason: RemovalReason,
) -> Result<Consumable, TestCaseError> {
    let instance = SubsystemInstance {
        id: Uuid::new_v4(),
        subsystem_id: Uuid::new_v4(),
        asset_id: Uuid::new_v4(),
        label: "engine".to_string(),
    };
    let rules = vec![CompatibilityRule {
        id: Uuid::new_v4(),
        subsystem_id: instance.subsystem_id,
        strategy: RuleStrategy::Individual {
            consumable_id: oil.id,
        },
    }];
    let target = InstallTarget {
        instance: &instance,
        rules: &rules,
        consumable: oil,
        unit: None,
    };
    let command = InstallCommand {
        subsystem_instance_id: instance.id,
        consumable_id: oil.id,
        quantity: Decimal::new(quantity, 0),
        serialized_unit_id: None,
        reading_at_install: Decimal::new(5_000, 0),
    };

    let installed = plan_install(target, &command, &context())
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    let after_install = installed
        .effects
        .iter()
        .find_map(|effect| match effect {
            fleetstock_inventory::Effect::SaveConsumable(consumable) => Some(consumable.clone()),
            _ => None,
        })
        .ok_or_else(|| TestCaseError::fail("install wrote no ledger row"))?;

    let removal = RemoveCommand {
        installation_id: installed.output.id,
        reason,
        reading_at_removal: None,
    };
    let removed = plan_remove(&installed.output, &after_install, None, &removal, &context())
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    Ok(removed.output.consumable)
}

#[derive(Debug, Clone)]
enum Step {
    Receive(i64, i64),
    Consume(i64),
    Return(i64),
    WriteOff(i64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1i64..50, 0i64..10_000).prop_map(|(q, c)| Step::Receive(q, c)),
        (1i64..30).prop_map(Step::Consume),
        (1i64..30).prop_map(Step::Return),
        (1i64..30).prop_map(Step::WriteOff),
    ]
}

proptest! {
    /// Average cost equals total value over total quantity after every receipt.
    #[test]
    fn average_cost_is_value_weighted(
        receipts in vec((1i64..1_000, 0i64..1_000_000), 1..25)
    ) {
        let mut stock = empty_position();
        let mut total_qty = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;

        for (qty, cents) in receipts {
            let qty = Decimal::new(qty, 0);
            let cost = Decimal::new(cents, 2);
            stock.receive(qty, cost).expect("receive");
            total_qty += qty;
            total_cost += cost;

            prop_assert_eq!(stock.on_hand, total_qty);
            prop_assert!(close_enough(stock.average_cost, total_cost / total_qty));
        }
    }

    /// The order receipts arrive in does not change the resulting average.
    #[test]
    fn receipt_order_does_not_matter(
        receipts in vec((1i64..1_000, 0i64..1_000_000), 1..25)
    ) {
        let mut forward = empty_position();
        let mut backward = empty_position();

        for (qty, cents) in &receipts {
            forward.receive(Decimal::new(*qty, 0), Decimal::new(*cents, 2)).expect("receive");
        }
        for (qty, cents) in receipts.iter().rev() {
            backward.receive(Decimal::new(*qty, 0), Decimal::new(*cents, 2)).expect("receive");
        }

        prop_assert_eq!(forward.on_hand, backward.on_hand);
        prop_assert!(close_enough(forward.average_cost, backward.average_cost));
    }

    /// Installing and removing intact restores both counters.
    #[test]
    fn intact_round_trip_restores_counters(
        on_hand in 1i64..500,
        assigned in 0i64..500,
        cents in 0i64..10_000,
        pick in 1i64..500,
    ) {
        let quantity = 1 + (pick - 1) % on_hand;
        let oil = oil_with_stock(on_hand, assigned, cents);

        let after = install_then_remove(&oil, quantity, RemovalReason::Intact)?;

        prop_assert_eq!(after.on_hand_quantity, oil.on_hand_quantity);
        prop_assert_eq!(after.assigned_quantity, oil.assigned_quantity);
        prop_assert_eq!(after.average_unit_cost, oil.average_unit_cost);
    }

    /// Damage and wear keep the shelf reduced and drop the installed quantity.
    #[test]
    fn damaged_round_trip_is_a_permanent_loss(
        on_hand in 1i64..500,
        assigned in 0i64..500,
        cents in 0i64..10_000,
        pick in 1i64..500,
        worn in any::<bool>(),
    ) {
        let quantity = 1 + (pick - 1) % on_hand;
        let oil = oil_with_stock(on_hand, assigned, cents);
        let reason = if worn { RemovalReason::Wear } else { RemovalReason::Damaged };

        let after = install_then_remove(&oil, quantity, reason)?;

        prop_assert_eq!(after.on_hand_quantity, oil.on_hand_quantity - Decimal::new(quantity, 0));
        prop_assert_eq!(after.assigned_quantity, oil.assigned_quantity);
    }

    /// No sequence of ledger steps drives a counter or the average below zero;
    /// rejected steps leave the position untouched.
    #[test]
    fn counters_never_go_negative(steps in vec(step(), 1..60)) {
        let mut stock = empty_position();

        for step in steps {
            let before = stock;
            let result = match step {
                Step::Receive(q, c) => stock.receive(Decimal::new(q, 0), Decimal::new(c, 2)),
                Step::Consume(q) => stock.consume(Decimal::new(q, 0)),
                Step::Return(q) => stock.return_to_stock(Decimal::new(q, 0)),
                Step::WriteOff(q) => stock.write_off_assigned(Decimal::new(q, 0)),
            };
            if result.is_err() {
                prop_assert_eq!(stock, before);
            }

            prop_assert!(stock.on_hand >= Decimal::ZERO);
            prop_assert!(stock.assigned >= Decimal::ZERO);
            prop_assert!(stock.average_cost >= Decimal::ZERO);
        }
    }
}
