use fleetstock_core::{Consumable, LedgerError, LedgerResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate counters of one consumable, costed at weighted average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StockPosition {
    pub consumable_id: Uuid,
    pub on_hand: Decimal,
    pub assigned: Decimal,
    pub average_cost: Decimal,
}

impl StockPosition {
    pub fn of(consumable: &Consumable) -> Self {
        Self {
            consumable_id: consumable.id,
            on_hand: consumable.on_hand_quantity,
            assigned: consumable.assigned_quantity,
            average_cost: consumable.average_unit_cost,
        }
    }

    pub fn apply_to(&self, consumable: &mut Consumable) {
        consumable.on_hand_quantity = self.on_hand;
        consumable.assigned_quantity = self.assigned;
        consumable.average_unit_cost = self.average_cost;
    }

    /// Adds a batch to on-hand stock and re-weights the average cost.
    /// Returns the unit cost of the batch.
    pub fn receive(&mut self, quantity: Decimal, total_cost: Decimal) -> LedgerResult<Decimal> {
        require_positive(quantity)?;
        if total_cost < Decimal::ZERO {
            return Err(LedgerError::InvalidCost(format!(
                "total cost must not be negative, got {total_cost}"
            )));
        }

        let new_qty = self.on_hand.checked_add(quantity).ok_or_else(|| {
            LedgerError::InvalidQuantity(format!(
                "receiving {quantity} on top of {} exceeds the ledger range",
                self.on_hand
            ))
        })?;
        let unit_cost = total_cost
            .checked_div(quantity)
            .ok_or_else(|| cost_out_of_range(total_cost, quantity))?;
        let new_value = self
            .on_hand
            .checked_mul(self.average_cost)
            .and_then(|current_value| current_value.checked_add(total_cost))
            .ok_or_else(|| cost_out_of_range(total_cost, quantity))?;
        let new_average = new_value
            .checked_div(new_qty)
            .ok_or_else(|| cost_out_of_range(total_cost, quantity))?;
        // Stock value must stay representable for later reads.
        new_average
            .checked_mul(new_qty)
            .ok_or_else(|| cost_out_of_range(total_cost, quantity))?;

        self.on_hand = new_qty;
        self.average_cost = new_average;
        Ok(unit_cost)
    }

    /// Moves stock from the shelf to installed. Returns the value moved.
    pub fn consume(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        require_positive(quantity)?;
        if self.on_hand < quantity {
            return Err(LedgerError::InsufficientStock {
                consumable_id: self.consumable_id,
                requested: quantity,
                on_hand: self.on_hand,
            });
        }
        let assigned = add_quantity(self.assigned, quantity)?;
        let value = self.value_of(quantity)?;

        self.on_hand -= quantity;
        self.assigned = assigned;
        Ok(value)
    }

    pub fn return_to_stock(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        let assigned = self.remaining_assigned(quantity)?;
        let on_hand = add_quantity(self.on_hand, quantity)?;
        let value = self.value_of(quantity)?;

        self.assigned = assigned;
        self.on_hand = on_hand;
        Ok(value)
    }

    /// Installed stock lost for good. On-hand already dropped at consume time.
    pub fn write_off_assigned(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        self.take_assigned(quantity)
    }

    /// Serialized removal: the unit's state carries the stock from here on.
    pub fn release_assigned(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        self.take_assigned(quantity)
    }

    /// Re-installation of a serialized unit that already left on-hand once.
    pub fn reassign(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        require_positive(quantity)?;
        let assigned = add_quantity(self.assigned, quantity)?;
        let value = self.value_of(quantity)?;

        self.assigned = assigned;
        Ok(value)
    }

    pub fn stock_value(&self) -> LedgerResult<Decimal> {
        self.value_of(self.on_hand)
    }

    fn take_assigned(&mut self, quantity: Decimal) -> LedgerResult<Decimal> {
        let assigned = self.remaining_assigned(quantity)?;
        let value = self.value_of(quantity)?;

        self.assigned = assigned;
        Ok(value)
    }

    fn remaining_assigned(&self, quantity: Decimal) -> LedgerResult<Decimal> {
        require_positive(quantity)?;
        if self.assigned < quantity {
            return Err(LedgerError::InvalidQuantity(format!(
                "cannot release {quantity}, only {} assigned",
                self.assigned
            )));
        }
        Ok(self.assigned - quantity)
    }

    fn value_of(&self, quantity: Decimal) -> LedgerResult<Decimal> {
        quantity
            .checked_mul(self.average_cost)
            .map(|value| value.round_dp(4))
            .ok_or_else(|| {
                LedgerError::InvalidQuantity(format!(
                    "value of {quantity} at {} exceeds the ledger range",
                    self.average_cost
                ))
            })
    }
}

fn add_quantity(current: Decimal, quantity: Decimal) -> LedgerResult<Decimal> {
    current.checked_add(quantity).ok_or_else(|| {
        LedgerError::InvalidQuantity(format!(
            "adding {quantity} to {current} exceeds the ledger range"
        ))
    })
}

fn cost_out_of_range(total_cost: Decimal, quantity: Decimal) -> LedgerError {
    LedgerError::InvalidCost(format!(
        "total cost {total_cost} for {quantity} exceeds the ledger range"
    ))
}

fn require_positive(quantity: Decimal) -> LedgerResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}
