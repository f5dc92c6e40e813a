use std::collections::BTreeMap;

use fleetstock_core::{CompatibilityRule, Consumable, ConsumableCategory, RuleStrategy, TechnicalSpec};
use uuid::Uuid;

/// The technical field a `Technical` rule is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnicalAttribute {
    Viscosity,
    FluidNorm,
    Reference,
    TireSize,
    BatteryCode,
    BulbSocket,
}

impl TechnicalAttribute {
    pub fn for_category(category: ConsumableCategory) -> Self {
        match category {
            ConsumableCategory::Oil => Self::Viscosity,
            ConsumableCategory::Fluid => Self::FluidNorm,
            ConsumableCategory::Filter => Self::Reference,
            ConsumableCategory::Tire => Self::TireSize,
            ConsumableCategory::Battery => Self::BatteryCode,
            ConsumableCategory::Bulb => Self::BulbSocket,
            ConsumableCategory::Part => Self::Reference,
        }
    }

    pub fn read(self, spec: &TechnicalSpec) -> Option<&str> {
        let value = match self {
            Self::Viscosity => &spec.viscosity,
            Self::FluidNorm => &spec.fluid_norm,
            Self::Reference => &spec.reference,
            Self::TireSize => &spec.tire_size,
            Self::BatteryCode => &spec.battery_code,
            Self::BulbSocket => &spec.bulb_socket,
        };
        value.as_deref()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Viscosity => "viscosity",
            Self::FluidNorm => "fluid_norm",
            Self::Reference => "reference",
            Self::TireSize => "tire_size",
            Self::BatteryCode => "battery_code",
            Self::BulbSocket => "bulb_socket",
        }
    }
}

pub fn matches(rule: &CompatibilityRule, consumable: &Consumable) -> bool {
    match &rule.strategy {
        RuleStrategy::Group { group_id } => consumable.technical.group_id == Some(*group_id),
        RuleStrategy::Technical { category, value } => {
            consumable.category == *category
                && TechnicalAttribute::for_category(*category)
                    .read(&consumable.technical)
                    .is_some_and(|attribute| same_value(attribute, value))
        }
        RuleStrategy::Individual { consumable_id } => consumable.id == *consumable_id,
    }
}

pub fn is_compatible(rules: &[CompatibilityRule], consumable: &Consumable) -> bool {
    rules.iter().any(|rule| matches(rule, consumable))
}

/// Consumables satisfying `rule`, ordered by catalog code. No match is an
/// empty result.
pub fn resolve<'a, I>(rule: &CompatibilityRule, catalog: I) -> Vec<Consumable>
where
    I: IntoIterator<Item = &'a Consumable>,
{
    resolve_any(std::slice::from_ref(rule), catalog)
}

/// Union over several rules, each consumable listed once.
pub fn resolve_any<'a, I>(rules: &[CompatibilityRule], catalog: I) -> Vec<Consumable>
where
    I: IntoIterator<Item = &'a Consumable>,
{
    let matched: BTreeMap<(String, Uuid), &Consumable> = catalog
        .into_iter()
        .filter(|consumable| is_compatible(rules, consumable))
        .map(|consumable| ((consumable.code.clone(), consumable.id), consumable))
        .collect();

    matched.into_values().cloned().collect()
}

fn same_value(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}
