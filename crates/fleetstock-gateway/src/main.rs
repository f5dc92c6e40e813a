use std::net::SocketAddr;

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use fleetstock_core::{
    CatalogStore, CompatibilityRule, Consumable, ConsumableCategory, EquivalenceGroup,
    ErrorKind, InstallCommand, InstallationRecord, LedgerError, LedgerResult, LedgerStore,
    OperationContext, ReceiptRecord, ReceiptSource, ReceiveCommand, RemovalReason,
    RemoveCommand, RuleStrategy, SerializedUnit, StockLevel, SubsystemDefinition,
    SubsystemInstance, UnitState,
};
use fleetstock_platform::redis_bus::{CONSUMABLES_INSTALLED, CONSUMABLES_REMOVED, STOCK_RECEIVED};
use fleetstock_platform::{
    ConsumableInstalledEvent, ConsumableRemovedEvent, HistoryEntry, InstallRequest,
    PgLedgerStore, ReceiveStockRequest, ReceiveStockResponse, RedisBus,
    RegisterConsumableRequest, RegisterGroupRequest, RegisterInstanceRequest,
    RegisterRuleRequest, RegisterSubsystemRequest, RemoveRequest, RemoveResponse,
    ResolveResponse, ServiceConfig, StockReceivedEvent, UnitsQuery, connect_database,
    ensure_schema,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    store: PgLedgerStore,
    redis: RedisBus,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "fleetstock_gateway=info,fleetstock_platform=info".to_string()
        }))
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url, config.max_connections).await?;
    ensure_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let state = AppState {
        store: PgLedgerStore::new(pool),
        redis,
    };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/consumables", post(register_consumable))
        .route("/consumables/{consumable_id}", get(get_consumable))
        .route("/consumables/{consumable_id}/stock", get(get_stock_level))
        .route("/consumables/{consumable_id}/units", get(list_units))
        .route("/consumables/{consumable_id}/history", get(list_history))
        .route(
            "/consumables/{consumable_id}/receipts",
            get(list_receipts).post(receive_stock),
        )
        .route("/groups", post(register_group))
        .route("/subsystems", post(register_subsystem))
        .route(
            "/subsystems/{subsystem_id}/instances",
            post(register_instance),
        )
        .route("/subsystems/{subsystem_id}/rules", post(register_rule))
        .route(
            "/subsystems/{subsystem_id}/consumables",
            get(resolve_for_subsystem),
        )
        .route(
            "/instances/{instance_id}/installations",
            get(list_open_installations),
        )
        .route("/rules/{rule_id}/consumables", get(resolve_rule))
        .route("/installations", post(install_consumable))
        .route("/installations/{installation_id}", get(get_installation))
        .route(
            "/installations/{installation_id}/remove",
            post(remove_consumable),
        )
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn register_consumable(
    State(state): State<AppState>,
    Json(payload): Json<RegisterConsumableRequest>,
) -> Result<(StatusCode, Json<Consumable>), (StatusCode, String)> {
    let consumable = consumable_from_request(payload, Utc::now()).map_err(ledger_error)?;
    let consumable = state
        .store
        .register_consumable(consumable)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(consumable)))
}

async fn get_consumable(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> Result<Json<Consumable>, (StatusCode, String)> {
    let consumable = state
        .store
        .consumable(consumable_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(consumable))
}

async fn get_stock_level(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> Result<Json<StockLevel>, (StatusCode, String)> {
    let level = state
        .store
        .stock_level(consumable_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(level))
}

async fn list_units(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Query(query): Query<UnitsQuery>,
) -> Result<Json<Vec<SerializedUnit>>, (StatusCode, String)> {
    let wanted = query
        .state
        .as_deref()
        .map(str::parse::<UnitState>)
        .transpose()
        .map_err(ledger_error)?;
    let units = state
        .store
        .units(consumable_id, wanted)
        .await
        .map_err(ledger_error)?;
    Ok(Json(units))
}

async fn list_history(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, String)> {
    let history = state
        .store
        .history(consumable_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(history.into_iter().map(HistoryEntry::from).collect()))
}

async fn list_receipts(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
) -> Result<Json<Vec<ReceiptRecord>>, (StatusCode, String)> {
    let receipts = state
        .store
        .receipts(consumable_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(receipts))
}

async fn receive_stock(
    State(state): State<AppState>,
    Path(consumable_id): Path<Uuid>,
    Json(payload): Json<ReceiveStockRequest>,
) -> Result<(StatusCode, Json<ReceiveStockResponse>), (StatusCode, String)> {
    let source: ReceiptSource = payload.source.parse().map_err(ledger_error)?;
    let command = ReceiveCommand {
        consumable_id,
        quantity: payload.quantity,
        total_cost: payload.total_cost,
        source,
        reference: payload.reference,
        serial_numbers: payload.serial_numbers,
        warranty_expiry: payload.warranty_expiry,
    };
    let context = OperationContext::new(Utc::now(), payload.received_by);

    let outcome = state
        .store
        .receive(command, &context)
        .await
        .map_err(ledger_error)?;

    let event = StockReceivedEvent {
        consumable_id,
        receipt_id: outcome.receipt.id,
        quantity: outcome.receipt.quantity,
        unit_cost: outcome.receipt.unit_cost,
        on_hand: outcome.consumable.on_hand_quantity,
        average_unit_cost: outcome.consumable.average_unit_cost,
    };
    publish(&state, STOCK_RECEIVED, &event).await;

    let response = ReceiveStockResponse {
        consumable: outcome.consumable,
        receipt: outcome.receipt,
        units: outcome.units,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn register_group(
    State(state): State<AppState>,
    Json(payload): Json<RegisterGroupRequest>,
) -> Result<(StatusCode, Json<EquivalenceGroup>), (StatusCode, String)> {
    let category: ConsumableCategory = payload.category.parse().map_err(ledger_error)?;
    let group = EquivalenceGroup {
        id: Uuid::new_v4(),
        name: payload.name,
        category,
    };
    let group = state
        .store
        .register_group(group)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn register_subsystem(
    State(state): State<AppState>,
    Json(payload): Json<RegisterSubsystemRequest>,
) -> Result<(StatusCode, Json<SubsystemDefinition>), (StatusCode, String)> {
    let subsystem = SubsystemDefinition {
        id: Uuid::new_v4(),
        name: payload.name,
    };
    let subsystem = state
        .store
        .register_subsystem(subsystem)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(subsystem)))
}

async fn register_instance(
    State(state): State<AppState>,
    Path(subsystem_id): Path<Uuid>,
    Json(payload): Json<RegisterInstanceRequest>,
) -> Result<(StatusCode, Json<SubsystemInstance>), (StatusCode, String)> {
    let instance = SubsystemInstance {
        id: Uuid::new_v4(),
        subsystem_id,
        asset_id: payload.asset_id,
        label: payload.label,
    };
    let instance = state
        .store
        .register_subsystem_instance(instance)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn register_rule(
    State(state): State<AppState>,
    Path(subsystem_id): Path<Uuid>,
    Json(payload): Json<RegisterRuleRequest>,
) -> Result<(StatusCode, Json<CompatibilityRule>), (StatusCode, String)> {
    let rule = rule_from_request(subsystem_id, payload).map_err(ledger_error)?;
    let rule = state
        .store
        .register_rule(rule)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn resolve_for_subsystem(
    State(state): State<AppState>,
    Path(subsystem_id): Path<Uuid>,
) -> Result<Json<Vec<Consumable>>, (StatusCode, String)> {
    let consumables = state
        .store
        .resolve_for_subsystem(subsystem_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(consumables))
}

async fn list_open_installations(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
) -> Result<Json<Vec<InstallationRecord>>, (StatusCode, String)> {
    let records = state
        .store
        .open_installations(instance_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(records))
}

async fn resolve_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, (StatusCode, String)> {
    let consumables = state.store.resolve(rule_id).await.map_err(ledger_error)?;
    Ok(Json(ResolveResponse {
        rule_id,
        consumables,
    }))
}

async fn install_consumable(
    State(state): State<AppState>,
    Json(payload): Json<InstallRequest>,
) -> Result<(StatusCode, Json<InstallationRecord>), (StatusCode, String)> {
    let command = InstallCommand {
        subsystem_instance_id: payload.subsystem_instance_id,
        consumable_id: payload.consumable_id,
        quantity: payload.quantity,
        serialized_unit_id: payload.serialized_unit_id,
        reading_at_install: payload.reading_at_install,
    };
    let context = OperationContext::new(Utc::now(), payload.installed_by);

    let record = state
        .store
        .install(command, &context)
        .await
        .map_err(ledger_error)?;

    let event = ConsumableInstalledEvent {
        installation_id: record.id,
        consumable_id: record.consumable_id,
        asset_id: record.asset_id,
        subsystem_instance_id: record.subsystem_instance_id,
        quantity: record.quantity,
        unit_cost: record.unit_cost,
    };
    publish(&state, CONSUMABLES_INSTALLED, &event).await;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_installation(
    State(state): State<AppState>,
    Path(installation_id): Path<Uuid>,
) -> Result<Json<InstallationRecord>, (StatusCode, String)> {
    let record = state
        .store
        .installation(installation_id)
        .await
        .map_err(ledger_error)?;
    Ok(Json(record))
}

async fn remove_consumable(
    State(state): State<AppState>,
    Path(installation_id): Path<Uuid>,
    Json(payload): Json<RemoveRequest>,
) -> Result<Json<RemoveResponse>, (StatusCode, String)> {
    let reason: RemovalReason = payload.reason.parse().map_err(ledger_error)?;
    let command = RemoveCommand {
        installation_id,
        reason,
        reading_at_removal: payload.reading_at_removal,
    };
    let context = OperationContext::new(Utc::now(), payload.removed_by);

    let outcome = state
        .store
        .remove(command, &context)
        .await
        .map_err(ledger_error)?;
    let unit_state = outcome.unit.as_ref().map(|unit| unit.state);

    let event = ConsumableRemovedEvent {
        installation_id,
        consumable_id: outcome.consumable.id,
        reason: reason.as_str().to_string(),
        unit_state,
    };
    publish(&state, CONSUMABLES_REMOVED, &event).await;

    Ok(Json(RemoveResponse {
        installation: outcome.installation,
        consumable: outcome.consumable,
        unit_state,
    }))
}

/// The ledger commit already stands; a lost notification is only logged.
async fn publish<T: Serialize>(state: &AppState, channel: &str, payload: &T) {
    if let Err(err) = state.redis.publish_json(channel, payload).await {
        warn!("failed to publish {channel} notification: {err}");
    }
}

fn consumable_from_request(
    payload: RegisterConsumableRequest,
    now: DateTime<Utc>,
) -> LedgerResult<Consumable> {
    let category: ConsumableCategory = payload.category.parse()?;
    let mut consumable = Consumable::new(
        payload.code,
        payload.name,
        category,
        payload.is_serialized,
        now,
    );
    if let Some(unit_of_measure) = payload.unit_of_measure {
        consumable.unit_of_measure = unit_of_measure;
    }
    consumable.technical = payload.technical;
    Ok(consumable)
}

fn rule_from_request(
    subsystem_id: Uuid,
    payload: RegisterRuleRequest,
) -> LedgerResult<CompatibilityRule> {
    let strategy = match payload.strategy.trim().to_ascii_uppercase().as_str() {
        "GROUP" => RuleStrategy::Group {
            group_id: payload
                .group_id
                .ok_or_else(|| LedgerError::invalid_field("group_id is required"))?,
        },
        "TECHNICAL" => RuleStrategy::Technical {
            category: payload
                .category
                .as_deref()
                .ok_or_else(|| LedgerError::invalid_field("category is required"))?
                .parse()?,
            value: payload
                .value
                .ok_or_else(|| LedgerError::invalid_field("value is required"))?,
        },
        "INDIVIDUAL" => RuleStrategy::Individual {
            consumable_id: payload
                .consumable_id
                .ok_or_else(|| LedgerError::invalid_field("consumable_id is required"))?,
        },
        other => {
            return Err(LedgerError::invalid_field(format!(
                "unsupported rule strategy: {other}"
            )));
        }
    };

    Ok(CompatibilityRule {
        id: Uuid::new_v4(),
        subsystem_id,
        strategy,
    })
}

fn ledger_error(err: LedgerError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => {
            error!("ledger operation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_request(strategy: &str) -> RegisterRuleRequest {
        RegisterRuleRequest {
            strategy: strategy.to_string(),
            group_id: None,
            category: None,
            value: None,
            consumable_id: None,
        }
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            ledger_error(LedgerError::InvalidReason("LOST".to_string())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ledger_error(LedgerError::RecordNotFound(id)).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ledger_error(LedgerError::RecordClosed(id)).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ledger_error(LedgerError::OperationFailed("pool timed out".to_string())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn technical_rule_requests_need_category_and_value() {
        let subsystem_id = Uuid::new_v4();
        let mut request = rule_request("technical");
        assert!(matches!(
            rule_from_request(subsystem_id, request.clone()),
            Err(LedgerError::InvalidField(_))
        ));

        request.category = Some("tire".to_string());
        request.value = Some("315/80R22.5".to_string());
        let rule = rule_from_request(subsystem_id, request).expect("valid rule");
        assert_eq!(rule.subsystem_id, subsystem_id);
        assert_eq!(
            rule.strategy,
            RuleStrategy::Technical {
                category: ConsumableCategory::Tire,
                value: "315/80R22.5".to_string(),
            }
        );
    }

    #[test]
    fn unknown_rule_strategy_is_rejected() {
        let err = rule_from_request(Uuid::new_v4(), rule_request("CLOSEST")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn consumable_requests_parse_category_and_keep_spec() {
        let payload: RegisterConsumableRequest = serde_json::from_value(serde_json::json!({
            "code": "TYR-31580",
            "name": "Drive tire 315/80R22.5",
            "category": "TIRE",
            "is_serialized": true,
            "technical": { "tire_size": "315/80R22.5" }
        }))
        .expect("valid payload");

        let consumable = consumable_from_request(payload, Utc::now()).expect("valid consumable");
        assert_eq!(consumable.category, ConsumableCategory::Tire);
        assert_eq!(consumable.unit_of_measure, "UNIT");
        assert_eq!(
            consumable.technical.tire_size.as_deref(),
            Some("315/80R22.5")
        );
    }

    #[test]
    fn removal_reasons_outside_the_vocabulary_are_rejected() {
        let err = "LOST".parse::<RemovalReason>().unwrap_err();
        assert_eq!(ledger_error(err).0, StatusCode::BAD_REQUEST);
    }
}
