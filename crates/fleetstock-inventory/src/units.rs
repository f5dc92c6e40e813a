//! Lifecycle of individually tracked units.
//!
//! ```text
//! Available -> Installed -> Available | Warranty | Damaged | Retired
//! ```
//!
//! Nothing leaves `Warranty`, `Damaged` or `Retired` through this module.

use chrono::{DateTime, NaiveDate, Utc};
use fleetstock_core::{
    LedgerError, LedgerResult, RemovalReason, SerializedUnit, SubsystemInstance, UnitState,
};
use uuid::Uuid;

pub fn register(
    consumable_id: Uuid,
    serial_number: &str,
    warranty_expiry: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> SerializedUnit {
    SerializedUnit {
        id: Uuid::new_v4(),
        consumable_id,
        serial_number: serial_number.trim().to_string(),
        state: UnitState::Available,
        asset_id: None,
        subsystem_instance_id: None,
        warranty_expiry,
        install_count: 0,
        installed_at: None,
        removed_at: None,
        created_at: now,
    }
}

pub fn can_transition(from: UnitState, to: UnitState) -> bool {
    matches!(
        (from, to),
        (UnitState::Available, UnitState::Installed)
            | (UnitState::Installed, UnitState::Available)
            | (UnitState::Installed, UnitState::Warranty)
            | (UnitState::Installed, UnitState::Damaged)
            | (UnitState::Installed, UnitState::Retired)
    )
}

/// `Warranty` while `now` falls on or before the expiry date.
pub fn damage_outcome(warranty_expiry: Option<NaiveDate>, now: DateTime<Utc>) -> UnitState {
    match warranty_expiry {
        Some(expiry) if now.date_naive() <= expiry => UnitState::Warranty,
        _ => UnitState::Damaged,
    }
}

pub fn removal_target(
    unit: &SerializedUnit,
    reason: RemovalReason,
    now: DateTime<Utc>,
) -> UnitState {
    match reason {
        RemovalReason::Intact => UnitState::Available,
        RemovalReason::Damaged | RemovalReason::Wear => damage_outcome(unit.warranty_expiry, now),
        RemovalReason::Destroyed => UnitState::Retired,
    }
}

pub fn install(
    unit: &SerializedUnit,
    instance: &SubsystemInstance,
    now: DateTime<Utc>,
) -> LedgerResult<SerializedUnit> {
    if unit.state != UnitState::Available {
        return Err(LedgerError::UnitNotAvailable {
            unit_id: unit.id,
            state: unit.state,
        });
    }

    Ok(SerializedUnit {
        state: UnitState::Installed,
        asset_id: Some(instance.asset_id),
        subsystem_instance_id: Some(instance.id),
        install_count: unit.install_count + 1,
        installed_at: Some(now),
        removed_at: None,
        ..unit.clone()
    })
}

pub fn remove(
    unit: &SerializedUnit,
    reason: RemovalReason,
    now: DateTime<Utc>,
) -> LedgerResult<SerializedUnit> {
    let target = removal_target(unit, reason, now);
    if !can_transition(unit.state, target) {
        return Err(LedgerError::InvalidStateTransition {
            from: unit.state,
            to: target,
        });
    }

    Ok(SerializedUnit {
        state: target,
        asset_id: None,
        subsystem_instance_id: None,
        removed_at: Some(now),
        ..unit.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn instance() -> SubsystemInstance {
        SubsystemInstance {
            id: Uuid::new_v4(),
            subsystem_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            label: "front left".to_string(),
        }
    }

    fn tire(warranty_expiry: Option<NaiveDate>) -> SerializedUnit {
        register(Uuid::new_v4(), " TX-1001 ", warranty_expiry, at(2024, 1, 10))
    }

    #[test]
    fn registered_units_start_available() {
        let unit = tire(None);
        assert_eq!(unit.state, UnitState::Available);
        assert_eq!(unit.serial_number, "TX-1001");
        assert_eq!(unit.install_count, 0);
    }

    #[test]
    fn install_links_the_unit_to_the_asset() {
        let slot = instance();
        let unit = install(&tire(None), &slot, at(2024, 2, 1)).expect("install");

        assert_eq!(unit.state, UnitState::Installed);
        assert_eq!(unit.asset_id, Some(slot.asset_id));
        assert_eq!(unit.subsystem_instance_id, Some(slot.id));
        assert_eq!(unit.install_count, 1);
    }

    #[test]
    fn only_available_units_can_be_installed() {
        let slot = instance();
        let installed = install(&tire(None), &slot, at(2024, 2, 1)).expect("install");

        for state in [
            UnitState::Installed,
            UnitState::Warranty,
            UnitState::Damaged,
            UnitState::Retired,
        ] {
            let unit = SerializedUnit {
                state,
                ..installed.clone()
            };
            let err = install(&unit, &slot, at(2024, 3, 1)).expect_err("must refuse");
            assert!(matches!(err, LedgerError::UnitNotAvailable { .. }));
        }
    }

    #[test]
    fn damage_inside_warranty_window_is_claimable() {
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 1);
        let unit = install(&tire(expiry), &instance(), at(2024, 2, 1)).expect("install");

        let early = remove(&unit, RemovalReason::Damaged, at(2024, 6, 1)).expect("remove");
        assert_eq!(early.state, UnitState::Warranty);

        let late = remove(&unit, RemovalReason::Damaged, at(2025, 6, 1)).expect("remove");
        assert_eq!(late.state, UnitState::Damaged);
    }

    #[test]
    fn expiry_day_still_counts_as_warranty() {
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert_eq!(damage_outcome(expiry, at(2025, 1, 1)), UnitState::Warranty);
        assert_eq!(damage_outcome(expiry, at(2025, 1, 2)), UnitState::Damaged);
        assert_eq!(damage_outcome(None, at(2020, 1, 1)), UnitState::Damaged);
    }

    #[test]
    fn removal_reasons_map_to_states() {
        let unit = install(&tire(None), &instance(), at(2024, 2, 1)).expect("install");

        let intact = remove(&unit, RemovalReason::Intact, at(2024, 3, 1)).expect("intact");
        assert_eq!(intact.state, UnitState::Available);
        assert_eq!(intact.asset_id, None);
        assert_eq!(intact.subsystem_instance_id, None);

        let worn = remove(&unit, RemovalReason::Wear, at(2024, 3, 1)).expect("wear");
        assert_eq!(worn.state, UnitState::Damaged);

        let destroyed = remove(&unit, RemovalReason::Destroyed, at(2024, 3, 1)).expect("destroy");
        assert_eq!(destroyed.state, UnitState::Retired);
    }

    #[test]
    fn removal_requires_an_installed_unit() {
        let unit = tire(None);
        let err = remove(&unit, RemovalReason::Intact, at(2024, 3, 1)).expect_err("not installed");
        assert_eq!(
            err,
            LedgerError::InvalidStateTransition {
                from: UnitState::Available,
                to: UnitState::Available,
            }
        );
    }

    #[test]
    fn terminal_states_never_return_to_available() {
        for from in [UnitState::Warranty, UnitState::Damaged, UnitState::Retired] {
            for to in [
                UnitState::Available,
                UnitState::Installed,
                UnitState::Warranty,
                UnitState::Damaged,
                UnitState::Retired,
            ] {
                assert!(!can_transition(from, to), "{from} -> {to}");
            }
        }
        assert!(!can_transition(UnitState::Available, UnitState::Damaged));
    }
}
