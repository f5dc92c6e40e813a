use fleetstock_core::{
    CompatibilityRule, Consumable, EquivalenceGroup, LedgerError, LedgerResult, RuleStrategy,
    SubsystemDefinition, SubsystemInstance, TechnicalSpec,
};
use rust_decimal::Decimal;

/// Normalizes a new catalog entry. Stock always starts empty; counters only
/// move through receipts and installations.
pub fn prepare_consumable(consumable: Consumable) -> LedgerResult<Consumable> {
    let code = consumable.code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(LedgerError::invalid_field("code is required"));
    }
    let name = consumable.name.trim().to_string();
    if name.is_empty() {
        return Err(LedgerError::invalid_field("name is required"));
    }
    let unit_of_measure = consumable.unit_of_measure.trim().to_ascii_uppercase();
    if unit_of_measure.is_empty() {
        return Err(LedgerError::invalid_field("unit_of_measure is required"));
    }

    Ok(Consumable {
        code,
        name,
        unit_of_measure,
        on_hand_quantity: Decimal::ZERO,
        assigned_quantity: Decimal::ZERO,
        average_unit_cost: Decimal::ZERO,
        technical: clean_spec(consumable.technical),
        ..consumable
    })
}

pub fn prepare_group(group: EquivalenceGroup) -> LedgerResult<EquivalenceGroup> {
    let name = required(&group.name, "group name")?;
    Ok(EquivalenceGroup { name, ..group })
}

pub fn prepare_subsystem(subsystem: SubsystemDefinition) -> LedgerResult<SubsystemDefinition> {
    let name = required(&subsystem.name, "subsystem name")?;
    Ok(SubsystemDefinition { name, ..subsystem })
}

pub fn prepare_instance(instance: SubsystemInstance) -> LedgerResult<SubsystemInstance> {
    let label = required(&instance.label, "instance label")?;
    Ok(SubsystemInstance { label, ..instance })
}

pub fn prepare_rule(rule: CompatibilityRule) -> LedgerResult<CompatibilityRule> {
    let strategy = match rule.strategy {
        RuleStrategy::Technical { category, value } => RuleStrategy::Technical {
            category,
            value: required(&value, "technical value")?,
        },
        other => other,
    };
    Ok(CompatibilityRule { strategy, ..rule })
}

fn required(value: &str, field: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid_field(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn clean_spec(spec: TechnicalSpec) -> TechnicalSpec {
    let clean = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    TechnicalSpec {
        group_id: spec.group_id,
        viscosity: clean(spec.viscosity),
        fluid_norm: clean(spec.fluid_norm),
        reference: clean(spec.reference),
        tire_size: clean(spec.tire_size),
        battery_code: clean(spec.battery_code),
        bulb_socket: clean(spec.bulb_socket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetstock_core::ConsumableCategory;
    use uuid::Uuid;

    #[test]
    fn registration_zeroes_counters_and_normalizes_fields() {
        let mut oil = Consumable::new(" oil-5w30 ", " Engine oil ", ConsumableCategory::Oil, false, Utc::now());
        oil.on_hand_quantity = Decimal::new(99, 0);
        oil.average_unit_cost = Decimal::new(5, 0);
        oil.technical.viscosity = Some(" 5W30 ".to_string());
        oil.technical.reference = Some("   ".to_string());

        let prepared = prepare_consumable(oil).expect("valid");
        assert_eq!(prepared.code, "OIL-5W30");
        assert_eq!(prepared.name, "Engine oil");
        assert_eq!(prepared.on_hand_quantity, Decimal::ZERO);
        assert_eq!(prepared.average_unit_cost, Decimal::ZERO);
        assert_eq!(prepared.technical.viscosity.as_deref(), Some("5W30"));
        assert_eq!(prepared.technical.reference, None);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let blank = Consumable::new("  ", "Oil", ConsumableCategory::Oil, false, Utc::now());
        assert!(matches!(
            prepare_consumable(blank),
            Err(LedgerError::InvalidField(_))
        ));

        let rule = CompatibilityRule {
            id: Uuid::new_v4(),
            subsystem_id: Uuid::new_v4(),
            strategy: RuleStrategy::Technical {
                category: ConsumableCategory::Tire,
                value: " ".to_string(),
            },
        };
        assert!(prepare_rule(rule).is_err());
    }
}
