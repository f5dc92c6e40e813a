use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetstock_core::{
    CatalogStore, CompatibilityRule, Consumable, EquivalenceGroup, EventEnvelope,
    InstallCommand, InstallationRecord, LedgerError, LedgerEvent, LedgerEventKind,
    LedgerResult, LedgerStore, OperationContext, ReceiptRecord, ReceiveCommand, ReceiveOutcome,
    RemovalOutcome, RemoveCommand, RuleStrategy, SerializedUnit, StockLevel,
    SubsystemDefinition, SubsystemInstance, TechnicalSpec, UnitState,
};
use fleetstock_inventory::orchestrator::{self, Effect, InstallTarget, Plan};
use fleetstock_inventory::{StockPosition, catalog, compatibility};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const CONSUMABLE_COLUMNS: &str = "id, code, name, category, unit_of_measure, is_serialized, \
     on_hand_quantity, assigned_quantity, average_unit_cost, group_id, viscosity, fluid_norm, \
     reference, tire_size, battery_code, bulb_socket, updated_at";

const UNIT_COLUMNS: &str = "id, consumable_id, serial_number, state, asset_id, \
     subsystem_instance_id, warranty_expiry, install_count, installed_at, removed_at, created_at";

const INSTALLATION_COLUMNS: &str = "id, consumable_id, serialized_unit_id, asset_id, \
     subsystem_instance_id, quantity, unit_cost, reading_at_install, installed_by, installed_at, \
     removed_at, removal_reason, reading_at_removal, removed_by";

const RULE_COLUMNS: &str =
    "id, subsystem_id, strategy, group_id, category, technical_value, consumable_id";

/// Ledger persisted in Postgres. Each mutating operation runs in one
/// transaction and locks rows in a fixed order: installation record,
/// consumable, serialized unit.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn candidates(&self, rules: &[CompatibilityRule]) -> LedgerResult<Vec<Consumable>> {
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let mut group_ids: Vec<Uuid> = Vec::new();
        let mut categories: Vec<String> = Vec::new();
        let mut consumable_ids: Vec<Uuid> = Vec::new();
        for rule in rules {
            match &rule.strategy {
                RuleStrategy::Group { group_id } => group_ids.push(*group_id),
                RuleStrategy::Technical { category, .. } => {
                    categories.push(category.as_str().to_string())
                }
                RuleStrategy::Individual { consumable_id } => consumable_ids.push(*consumable_id),
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {CONSUMABLE_COLUMNS} FROM consumables \
             WHERE group_id = ANY($1) OR category = ANY($2) OR id = ANY($3)"
        ))
        .bind(group_ids)
        .bind(categories)
        .bind(consumable_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(consumable_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn receive(
        &self,
        command: ReceiveCommand,
        context: &OperationContext,
    ) -> LedgerResult<ReceiveOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let consumable = lock_consumable(&mut tx, command.consumable_id).await?;
        let existing = if consumable.is_serialized {
            serials_of(&mut tx, consumable.id).await?
        } else {
            HashSet::new()
        };

        let plan = orchestrator::plan_receive(&consumable, &existing, &command, context)?;
        let outcome = write_plan(&mut tx, consumable.id, plan).await?;
        tx.commit().await.map_err(db_error)?;

        info!(
            consumable_id = %outcome.consumable.id,
            quantity = %outcome.receipt.quantity,
            average_unit_cost = %outcome.consumable.average_unit_cost,
            units = outcome.units.len(),
            "stock received"
        );
        Ok(outcome)
    }

    async fn install(
        &self,
        command: InstallCommand,
        context: &OperationContext,
    ) -> LedgerResult<InstallationRecord> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let instance = fetch_instance(&mut *tx, command.subsystem_instance_id)
            .await?
            .ok_or(LedgerError::SubsystemNotFound(command.subsystem_instance_id))?;
        let consumable = lock_consumable(&mut tx, command.consumable_id).await?;
        let rules = fetch_rules(&mut *tx, instance.subsystem_id).await?;
        // A unit only matters once the consumable is known to fit.
        let unit_id = command.serialized_unit_id.filter(|_| {
            consumable.is_serialized && compatibility::is_compatible(&rules, &consumable)
        });
        let unit = match unit_id {
            Some(unit_id) => Some(lock_unit(&mut tx, unit_id).await?),
            None => None,
        };

        let target = InstallTarget {
            instance: &instance,
            rules: &rules,
            consumable: &consumable,
            unit: unit.as_ref(),
        };
        let plan = orchestrator::plan_install(target, &command, context)?;
        let record = write_plan(&mut tx, consumable.id, plan).await?;
        tx.commit().await.map_err(db_error)?;

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
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let row = sqlx::query(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM installation_records WHERE id = $1 FOR UPDATE"
        ))
        .bind(command.installation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(LedgerError::RecordNotFound(command.installation_id))?;
        let record = installation_from_row(&row)?;

        let consumable = lock_consumable(&mut tx, record.consumable_id).await?;
        let unit = match record.serialized_unit_id {
            Some(unit_id) => Some(lock_unit(&mut tx, unit_id).await?),
            None => None,
        };

        let plan =
            orchestrator::plan_remove(&record, &consumable, unit.as_ref(), &command, context)?;
        let outcome = write_plan(&mut tx, consumable.id, plan).await?;
        tx.commit().await.map_err(db_error)?;

        info!(
            installation_id = %outcome.installation.id,
            reason = %command.reason,
            unit_state = ?outcome.unit.as_ref().map(|unit| unit.state),
            "consumable removed"
        );
        Ok(outcome)
    }

    async fn resolve(&self, rule_id: Uuid) -> LedgerResult<Vec<Consumable>> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM compatibility_rules WHERE id = $1"
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(LedgerError::RuleNotFound(rule_id))?;
        let rule = rule_from_row(&row)?;

        let candidates = self.candidates(std::slice::from_ref(&rule)).await?;
        Ok(compatibility::resolve(&rule, &candidates))
    }

    async fn resolve_for_subsystem(&self, subsystem_id: Uuid) -> LedgerResult<Vec<Consumable>> {
        let exists = sqlx::query("SELECT 1 FROM subsystems WHERE id = $1")
            .bind(subsystem_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        if exists.is_none() {
            return Err(LedgerError::SubsystemNotFound(subsystem_id));
        }

        let rules = fetch_rules(&self.pool, subsystem_id).await?;
        let candidates = self.candidates(&rules).await?;
        Ok(compatibility::resolve_any(&rules, &candidates))
    }

    async fn consumable(&self, consumable_id: Uuid) -> LedgerResult<Consumable> {
        fetch_consumable(&self.pool, consumable_id).await
    }

    async fn stock_level(&self, consumable_id: Uuid) -> LedgerResult<StockLevel> {
        // Counters and the free unit count come from one snapshot.
        let row = sqlx::query(&format!(
            "SELECT {CONSUMABLE_COLUMNS}, \
             (SELECT COUNT(*) FROM serialized_units u \
              WHERE u.consumable_id = consumables.id AND u.state = $2) AS free \
             FROM consumables WHERE id = $1"
        ))
        .bind(consumable_id)
        .bind(UnitState::Available.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(LedgerError::ConsumableNotFound(consumable_id))?;
        let consumable = consumable_from_row(&row)?;
        let position = StockPosition::of(&consumable);

        let available = if consumable.is_serialized {
            let free: i64 = row.try_get("free").map_err(db_error)?;
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
        state: Option<UnitState>,
    ) -> LedgerResult<Vec<SerializedUnit>> {
        fetch_consumable(&self.pool, consumable_id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM serialized_units \
             WHERE consumable_id = $1 AND ($2::TEXT IS NULL OR state = $2) \
             ORDER BY serial_number"
        ))
        .bind(consumable_id)
        .bind(state.map(|state| state.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn installation(&self, installation_id: Uuid) -> LedgerResult<InstallationRecord> {
        let row = sqlx::query(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM installation_records WHERE id = $1"
        ))
        .bind(installation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(LedgerError::RecordNotFound(installation_id))?;
        installation_from_row(&row)
    }

    async fn open_installations(
        &self,
        subsystem_instance_id: Uuid,
    ) -> LedgerResult<Vec<InstallationRecord>> {
        fetch_instance(&self.pool, subsystem_instance_id)
            .await?
            .ok_or(LedgerError::SubsystemNotFound(subsystem_instance_id))?;

        let rows = sqlx::query(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM installation_records \
             WHERE subsystem_instance_id = $1 AND removed_at IS NULL \
             ORDER BY installed_at"
        ))
        .bind(subsystem_instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(installation_from_row).collect()
    }

    async fn history(&self, consumable_id: Uuid) -> LedgerResult<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            "SELECT sequence, id, stream_id, kind, actor, occurred_at, payload, stored_at \
             FROM ledger_events WHERE stream_id = $1 ORDER BY sequence",
        )
        .bind(consumable_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(envelope_from_row).collect()
    }

    async fn receipts(&self, consumable_id: Uuid) -> LedgerResult<Vec<ReceiptRecord>> {
        fetch_consumable(&self.pool, consumable_id).await?;

        let rows = sqlx::query(
            "SELECT id, consumable_id, quantity, total_cost, unit_cost, source, reference, \
             received_by, received_at FROM receipt_records \
             WHERE consumable_id = $1 ORDER BY received_at, id",
        )
        .bind(consumable_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(receipt_from_row).collect()
    }
}

#[async_trait]
impl CatalogStore for PgLedgerStore {
    async fn register_consumable(&self, consumable: Consumable) -> LedgerResult<Consumable> {
        let consumable = catalog::prepare_consumable(consumable)?;
        if let Some(group_id) = consumable.technical.group_id {
            ensure_group(&self.pool, group_id).await?;
        }

        let spec = &consumable.technical;
        sqlx::query(&format!(
            "INSERT INTO consumables ({CONSUMABLE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(consumable.id)
        .bind(&consumable.code)
        .bind(&consumable.name)
        .bind(consumable.category.as_str())
        .bind(&consumable.unit_of_measure)
        .bind(consumable.is_serialized)
        .bind(consumable.on_hand_quantity)
        .bind(consumable.assigned_quantity)
        .bind(consumable.average_unit_cost)
        .bind(spec.group_id)
        .bind(&spec.viscosity)
        .bind(&spec.fluid_norm)
        .bind(&spec.reference)
        .bind(&spec.tire_size)
        .bind(&spec.battery_code)
        .bind(&spec.bulb_socket)
        .bind(consumable.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LedgerError::DuplicateCode(consumable.code.clone())
            } else {
                db_error(err)
            }
        })?;

        debug!(consumable_id = %consumable.id, code = %consumable.code, "consumable registered");
        Ok(consumable)
    }

    async fn register_group(&self, group: EquivalenceGroup) -> LedgerResult<EquivalenceGroup> {
        let group = catalog::prepare_group(group)?;
        sqlx::query("INSERT INTO equivalence_groups (id, name, category) VALUES ($1, $2, $3)")
            .bind(group.id)
            .bind(&group.name)
            .bind(group.category.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(group)
    }

    async fn register_subsystem(
        &self,
        subsystem: SubsystemDefinition,
    ) -> LedgerResult<SubsystemDefinition> {
        let subsystem = catalog::prepare_subsystem(subsystem)?;
        sqlx::query("INSERT INTO subsystems (id, name) VALUES ($1, $2)")
            .bind(subsystem.id)
            .bind(&subsystem.name)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(subsystem)
    }

    async fn register_subsystem_instance(
        &self,
        instance: SubsystemInstance,
    ) -> LedgerResult<SubsystemInstance> {
        let instance = catalog::prepare_instance(instance)?;
        ensure_subsystem(&self.pool, instance.subsystem_id).await?;

        sqlx::query(
            "INSERT INTO subsystem_instances (id, subsystem_id, asset_id, label) VALUES ($1, $2, $3, $4)",
        )
        .bind(instance.id)
        .bind(instance.subsystem_id)
        .bind(instance.asset_id)
        .bind(&instance.label)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(instance)
    }

    async fn register_rule(&self, rule: CompatibilityRule) -> LedgerResult<CompatibilityRule> {
        let rule = catalog::prepare_rule(rule)?;
        ensure_subsystem(&self.pool, rule.subsystem_id).await?;

        let (group_id, category, value, consumable_id) = match &rule.strategy {
            RuleStrategy::Group { group_id } => {
                ensure_group(&self.pool, *group_id).await?;
                (Some(*group_id), None, None, None)
            }
            RuleStrategy::Technical { category, value } => {
                (None, Some(category.as_str()), Some(value.clone()), None)
            }
            RuleStrategy::Individual { consumable_id } => (None, None, None, Some(*consumable_id)),
        };

        sqlx::query(&format!(
            "INSERT INTO compatibility_rules ({RULE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(rule.id)
        .bind(rule.subsystem_id)
        .bind(rule.strategy.as_str())
        .bind(group_id)
        .bind(category)
        .bind(value)
        .bind(consumable_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rule)
    }
}

async fn write_plan<T>(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: Uuid,
    plan: Plan<T>,
) -> LedgerResult<T> {
    let stored_at = Utc::now();
    for effect in plan.effects {
        apply_effect(tx, stream_id, effect, stored_at).await?;
    }
    Ok(plan.output)
}

async fn apply_effect(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: Uuid,
    effect: Effect,
    stored_at: DateTime<Utc>,
) -> LedgerResult<()> {
    match effect {
        Effect::SaveConsumable(consumable) => {
            sqlx::query(
                "UPDATE consumables SET on_hand_quantity = $2, assigned_quantity = $3, \
                 average_unit_cost = $4, updated_at = $5 WHERE id = $1",
            )
            .bind(consumable.id)
            .bind(consumable.on_hand_quantity)
            .bind(consumable.assigned_quantity)
            .bind(consumable.average_unit_cost)
            .bind(consumable.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Effect::InsertUnit(unit) => {
            sqlx::query(&format!(
                "INSERT INTO serialized_units ({UNIT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(unit.id)
            .bind(unit.consumable_id)
            .bind(&unit.serial_number)
            .bind(unit.state.as_str())
            .bind(unit.asset_id)
            .bind(unit.subsystem_instance_id)
            .bind(unit.warranty_expiry)
            .bind(unit.install_count)
            .bind(unit.installed_at)
            .bind(unit.removed_at)
            .bind(unit.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    LedgerError::DuplicateSerial(unit.serial_number.clone())
                } else {
                    db_error(err)
                }
            })?;
        }
        Effect::SaveUnit(unit) => {
            sqlx::query(
                "UPDATE serialized_units SET state = $2, asset_id = $3, subsystem_instance_id = $4, \
                 install_count = $5, installed_at = $6, removed_at = $7 WHERE id = $1",
            )
            .bind(unit.id)
            .bind(unit.state.as_str())
            .bind(unit.asset_id)
            .bind(unit.subsystem_instance_id)
            .bind(unit.install_count)
            .bind(unit.installed_at)
            .bind(unit.removed_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Effect::InsertReceipt(receipt) => {
            sqlx::query(
                "INSERT INTO receipt_records (id, consumable_id, quantity, total_cost, unit_cost, \
                 source, reference, received_by, received_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(receipt.id)
            .bind(receipt.consumable_id)
            .bind(receipt.quantity)
            .bind(receipt.total_cost)
            .bind(receipt.unit_cost)
            .bind(receipt.source.as_str())
            .bind(receipt.reference)
            .bind(receipt.received_by)
            .bind(receipt.received_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Effect::InsertInstallation(record) => {
            sqlx::query(&format!(
                "INSERT INTO installation_records ({INSTALLATION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ))
            .bind(record.id)
            .bind(record.consumable_id)
            .bind(record.serialized_unit_id)
            .bind(record.asset_id)
            .bind(record.subsystem_instance_id)
            .bind(record.quantity)
            .bind(record.unit_cost)
            .bind(record.reading_at_install)
            .bind(record.installed_by)
            .bind(record.installed_at)
            .bind(record.removed_at)
            .bind(record.removal_reason.map(|reason| reason.as_str()))
            .bind(record.reading_at_removal)
            .bind(record.removed_by)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Effect::CloseInstallation(record) => {
            sqlx::query(
                "UPDATE installation_records SET removed_at = $2, removal_reason = $3, \
                 reading_at_removal = $4, removed_by = $5 WHERE id = $1",
            )
            .bind(record.id)
            .bind(record.removed_at)
            .bind(record.removal_reason.map(|reason| reason.as_str()))
            .bind(record.reading_at_removal)
            .bind(record.removed_by)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Effect::Record(event) => {
            sqlx::query(
                "INSERT INTO ledger_events (id, stream_id, kind, actor, occurred_at, payload, stored_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.id)
            .bind(stream_id)
            .bind(event.kind.as_str())
            .bind(event.actor)
            .bind(event.occurred_at)
            .bind(Json(event.payload))
            .bind(stored_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
    }
    Ok(())
}

async fn lock_consumable(
    tx: &mut Transaction<'_, Postgres>,
    consumable_id: Uuid,
) -> LedgerResult<Consumable> {
    let row = sqlx::query(&format!(
        "SELECT {CONSUMABLE_COLUMNS} FROM consumables WHERE id = $1 FOR UPDATE"
    ))
    .bind(consumable_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?
    .ok_or(LedgerError::ConsumableNotFound(consumable_id))?;
    consumable_from_row(&row)
}

async fn lock_unit(tx: &mut Transaction<'_, Postgres>, unit_id: Uuid) -> LedgerResult<SerializedUnit> {
    let row = sqlx::query(&format!(
        "SELECT {UNIT_COLUMNS} FROM serialized_units WHERE id = $1 FOR UPDATE"
    ))
    .bind(unit_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?
    .ok_or(LedgerError::UnitNotFound(unit_id))?;
    unit_from_row(&row)
}

async fn serials_of(
    tx: &mut Transaction<'_, Postgres>,
    consumable_id: Uuid,
) -> LedgerResult<HashSet<String>> {
    let rows = sqlx::query("SELECT serial_number FROM serialized_units WHERE consumable_id = $1")
        .bind(consumable_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;

    rows.iter()
        .map(|row| row.try_get("serial_number").map_err(db_error))
        .collect()
}

async fn fetch_consumable<'e, E: PgExecutor<'e>>(
    executor: E,
    consumable_id: Uuid,
) -> LedgerResult<Consumable> {
    let row = sqlx::query(&format!(
        "SELECT {CONSUMABLE_COLUMNS} FROM consumables WHERE id = $1"
    ))
    .bind(consumable_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error)?
    .ok_or(LedgerError::ConsumableNotFound(consumable_id))?;
    consumable_from_row(&row)
}

async fn fetch_instance<'e, E: PgExecutor<'e>>(
    executor: E,
    instance_id: Uuid,
) -> LedgerResult<Option<SubsystemInstance>> {
    let row = sqlx::query(
        "SELECT id, subsystem_id, asset_id, label FROM subsystem_instances WHERE id = $1",
    )
    .bind(instance_id)
    .fetch_optional(executor)
    .await
    .map_err(db_error)?;

    row.map(|row| -> LedgerResult<SubsystemInstance> {
        Ok(SubsystemInstance {
            id: row.try_get("id").map_err(db_error)?,
            subsystem_id: row.try_get("subsystem_id").map_err(db_error)?,
            asset_id: row.try_get("asset_id").map_err(db_error)?,
            label: row.try_get("label").map_err(db_error)?,
        })
    })
    .transpose()
}

async fn fetch_rules<'e, E: PgExecutor<'e>>(
    executor: E,
    subsystem_id: Uuid,
) -> LedgerResult<Vec<CompatibilityRule>> {
    let rows = sqlx::query(&format!(
        "SELECT {RULE_COLUMNS} FROM compatibility_rules WHERE subsystem_id = $1"
    ))
    .bind(subsystem_id)
    .fetch_all(executor)
    .await
    .map_err(db_error)?;

    rows.iter().map(rule_from_row).collect()
}

async fn ensure_group(pool: &PgPool, group_id: Uuid) -> LedgerResult<()> {
    sqlx::query("SELECT 1 FROM equivalence_groups WHERE id = $1")
        .bind(group_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .map(|_| ())
        .ok_or(LedgerError::GroupNotFound(group_id))
}

async fn ensure_subsystem(pool: &PgPool, subsystem_id: Uuid) -> LedgerResult<()> {
    sqlx::query("SELECT 1 FROM subsystems WHERE id = $1")
        .bind(subsystem_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .map(|_| ())
        .ok_or(LedgerError::SubsystemNotFound(subsystem_id))
}

fn consumable_from_row(row: &PgRow) -> LedgerResult<Consumable> {
    let category: String = row.try_get("category").map_err(db_error)?;
    Ok(Consumable {
        id: row.try_get("id").map_err(db_error)?,
        code: row.try_get("code").map_err(db_error)?,
        name: row.try_get("name").map_err(db_error)?,
        category: stored(&category)?,
        unit_of_measure: row.try_get("unit_of_measure").map_err(db_error)?,
        is_serialized: row.try_get("is_serialized").map_err(db_error)?,
        on_hand_quantity: row.try_get("on_hand_quantity").map_err(db_error)?,
        assigned_quantity: row.try_get("assigned_quantity").map_err(db_error)?,
        average_unit_cost: row.try_get("average_unit_cost").map_err(db_error)?,
        technical: TechnicalSpec {
            group_id: row.try_get("group_id").map_err(db_error)?,
            viscosity: row.try_get("viscosity").map_err(db_error)?,
            fluid_norm: row.try_get("fluid_norm").map_err(db_error)?,
            reference: row.try_get("reference").map_err(db_error)?,
            tire_size: row.try_get("tire_size").map_err(db_error)?,
            battery_code: row.try_get("battery_code").map_err(db_error)?,
            bulb_socket: row.try_get("bulb_socket").map_err(db_error)?,
        },
        updated_at: row.try_get("updated_at").map_err(db_error)?,
    })
}

fn unit_from_row(row: &PgRow) -> LedgerResult<SerializedUnit> {
    let state: String = row.try_get("state").map_err(db_error)?;
    Ok(SerializedUnit {
        id: row.try_get("id").map_err(db_error)?,
        consumable_id: row.try_get("consumable_id").map_err(db_error)?,
        serial_number: row.try_get("serial_number").map_err(db_error)?,
        state: stored(&state)?,
        asset_id: row.try_get("asset_id").map_err(db_error)?,
        subsystem_instance_id: row.try_get("subsystem_instance_id").map_err(db_error)?,
        warranty_expiry: row.try_get("warranty_expiry").map_err(db_error)?,
        install_count: row.try_get("install_count").map_err(db_error)?,
        installed_at: row.try_get("installed_at").map_err(db_error)?,
        removed_at: row.try_get("removed_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

fn installation_from_row(row: &PgRow) -> LedgerResult<InstallationRecord> {
    let removal_reason: Option<String> = row.try_get("removal_reason").map_err(db_error)?;
    Ok(InstallationRecord {
        id: row.try_get("id").map_err(db_error)?,
        consumable_id: row.try_get("consumable_id").map_err(db_error)?,
        serialized_unit_id: row.try_get("serialized_unit_id").map_err(db_error)?,
        asset_id: row.try_get("asset_id").map_err(db_error)?,
        subsystem_instance_id: row.try_get("subsystem_instance_id").map_err(db_error)?,
        quantity: row.try_get("quantity").map_err(db_error)?,
        unit_cost: row.try_get("unit_cost").map_err(db_error)?,
        reading_at_install: row.try_get("reading_at_install").map_err(db_error)?,
        installed_by: row.try_get("installed_by").map_err(db_error)?,
        installed_at: row.try_get("installed_at").map_err(db_error)?,
        removed_at: row.try_get("removed_at").map_err(db_error)?,
        removal_reason: removal_reason.as_deref().map(stored).transpose()?,
        reading_at_removal: row.try_get("reading_at_removal").map_err(db_error)?,
        removed_by: row.try_get("removed_by").map_err(db_error)?,
    })
}

fn receipt_from_row(row: &PgRow) -> LedgerResult<ReceiptRecord> {
    let source: String = row.try_get("source").map_err(db_error)?;
    Ok(ReceiptRecord {
        id: row.try_get("id").map_err(db_error)?,
        consumable_id: row.try_get("consumable_id").map_err(db_error)?,
        quantity: row.try_get("quantity").map_err(db_error)?,
        total_cost: row.try_get("total_cost").map_err(db_error)?,
        unit_cost: row.try_get("unit_cost").map_err(db_error)?,
        source: stored(&source)?,
        reference: row.try_get("reference").map_err(db_error)?,
        received_by: row.try_get("received_by").map_err(db_error)?,
        received_at: row.try_get("received_at").map_err(db_error)?,
    })
}

fn rule_from_row(row: &PgRow) -> LedgerResult<CompatibilityRule> {
    let strategy: String = row.try_get("strategy").map_err(db_error)?;
    let group_id: Option<Uuid> = row.try_get("group_id").map_err(db_error)?;
    let category: Option<String> = row.try_get("category").map_err(db_error)?;
    let value: Option<String> = row.try_get("technical_value").map_err(db_error)?;
    let consumable_id: Option<Uuid> = row.try_get("consumable_id").map_err(db_error)?;
    let missing =
        |column: &str| LedgerError::OperationFailed(format!("{strategy} rule without {column}"));

    let parsed = match strategy.as_str() {
        "GROUP" => RuleStrategy::Group {
            group_id: group_id.ok_or_else(|| missing("group_id"))?,
        },
        "TECHNICAL" => RuleStrategy::Technical {
            category: stored(category.as_deref().ok_or_else(|| missing("category"))?)?,
            value: value.ok_or_else(|| missing("technical_value"))?,
        },
        "INDIVIDUAL" => RuleStrategy::Individual {
            consumable_id: consumable_id.ok_or_else(|| missing("consumable_id"))?,
        },
        other => {
            return Err(LedgerError::OperationFailed(format!(
                "unknown rule strategy: {other}"
            )));
        }
    };

    Ok(CompatibilityRule {
        id: row.try_get("id").map_err(db_error)?,
        subsystem_id: row.try_get("subsystem_id").map_err(db_error)?,
        strategy: parsed,
    })
}

fn envelope_from_row(row: &PgRow) -> LedgerResult<EventEnvelope> {
    let stream_id: Uuid = row.try_get("stream_id").map_err(db_error)?;
    let kind: String = row.try_get("kind").map_err(db_error)?;
    let payload: Json<serde_json::Value> = row.try_get("payload").map_err(db_error)?;

    Ok(EventEnvelope {
        sequence: row.try_get("sequence").map_err(db_error)?,
        stream_id,
        event: LedgerEvent {
            id: row.try_get("id").map_err(db_error)?,
            aggregate_id: stream_id,
            kind: LedgerEventKind::parse(&kind).ok_or_else(|| {
                LedgerError::OperationFailed(format!("unknown ledger event kind: {kind}"))
            })?,
            actor: row.try_get("actor").map_err(db_error)?,
            occurred_at: row.try_get("occurred_at").map_err(db_error)?,
            payload: payload.0,
        },
        stored_at: row.try_get("stored_at").map_err(db_error)?,
    })
}

/// Enum columns are written with `as_str`; anything unreadable is a storage
/// fault, not a caller mistake.
fn stored<T>(raw: &str) -> LedgerResult<T>
where
    T: FromStr<Err = LedgerError>,
{
    raw.parse()
        .map_err(|err: LedgerError| LedgerError::OperationFailed(format!("corrupt row: {err}")))
}

fn db_error(err: sqlx::Error) -> LedgerError {
    LedgerError::operation_failed(err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}
