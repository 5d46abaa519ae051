//! Vehicle sync and the account-to-vehicle link rows.
//!
//! A vehicle row (`vehicle/<automatic id>`, `_VEHICLE_`) is shared by every
//! account that can see the vehicle; each account gets its own link row
//! (`va/<automatic id>`, `va/<account id>`) projected into GSI1 as
//! `av/<account id>` so an account's vehicles can be listed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::account::Account;
use crate::error::UpdateError;
use crate::services::Services;
use crate::store::{
    AttributeValue, EntityStore, Index, Item, PrimaryKey, Query, StoreError, TransactOp, Update,
    GSI1_HASH_KEY, GSI1_SORT_KEY, GSI2_HASH_KEY, GSI2_SORT_KEY,
};
use crate::token::AccessToken;
use crate::upstream::{ApiVehicle, Page};

pub const VEHICLE_SORT_KEY: &str = "_VEHICLE_";
const LINK_TYPE: &str = "vehicle_account";
const DEFAULT_METERS_TRAVELED_TYPE: &str = "best_guess";

/// Each vehicle costs two operations (vehicle update and link put).
const VEHICLES_PER_TRANSACTION: usize = 10;

/// How many linked vehicles are listed for an account.
const VEHICLE_LIST_LIMIT: usize = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    /// Local vehicle ID, assigned on first sight and never changed.
    pub id: String,
    pub automatic_id: String,
    pub make: String,
    pub model: String,
    pub submodel: String,
    pub year: i64,
    pub fuel_grade: String,
    pub meters_traveled: i64,
    pub meters_traveled_type: String,
    pub last_known_user_input_meters: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Account whose sync last touched this vehicle.
    pub last_updated_for: String,
}

impl Vehicle {
    pub fn key_for(automatic_id: &str) -> PrimaryKey {
        PrimaryKey::new(format!("vehicle/{automatic_id}"), VEHICLE_SORT_KEY)
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let text = |name: &str| item.string(name).unwrap_or_default().to_string();
        Ok(Self {
            id: item.require_string("VehicleID")?.to_string(),
            automatic_id: text("A_ID"),
            make: text("A_Make"),
            model: text("A_Model"),
            submodel: text("A_SubModel"),
            year: item.number("A_Year").unwrap_or_default(),
            fuel_grade: text("A_FuelGrade"),
            meters_traveled: item.number("MetersTraveled").unwrap_or_default(),
            meters_traveled_type: text("MetersTraveledType"),
            last_known_user_input_meters: item
                .number("LastKnownUserInputMeters")
                .unwrap_or_default(),
            created_at: item.time("CreatedAt"),
            updated_at: item.time("UpdatedAt"),
            last_updated_for: text("M_LastUpdatedFor"),
        })
    }
}

pub fn link_key(automatic_id: &str, account_id: &str) -> PrimaryKey {
    PrimaryKey::new(format!("va/{automatic_id}"), format!("va/{account_id}"))
}

/// Upsert of a vehicle row. Locally-owned fields are only written the first
/// time the vehicle is seen; upstream fields are overwritten every sync.
fn vehicle_update(vehicle: &ApiVehicle, account_id: &str, now: DateTime<Utc>) -> Update {
    let local_id = Uuid::now_v7().to_string();
    let text = |value: &Option<String>| AttributeValue::string(value.as_deref().unwrap_or_default());

    Update::new(Vehicle::key_for(&vehicle.id))
        .set_if_not_exists("VehicleID", AttributeValue::string(&local_id))
        .set_if_not_exists("CreatedAt", AttributeValue::time(now))
        .set_if_not_exists("MetersTraveled", AttributeValue::number(0))
        .set_if_not_exists(
            "MetersTraveledType",
            AttributeValue::string(DEFAULT_METERS_TRAVELED_TYPE),
        )
        .set_if_not_exists("LastKnownUserInputMeters", AttributeValue::number(0))
        .set_if_not_exists(GSI2_HASH_KEY, AttributeValue::string(&local_id))
        .set_if_not_exists(
            GSI2_SORT_KEY,
            AttributeValue::string(format!("{VEHICLE_SORT_KEY}/{local_id}")),
        )
        .set("UpdatedAt", AttributeValue::time(now))
        .set("M_LastUpdatedFor", AttributeValue::string(account_id))
        .set("A_ID", AttributeValue::string(&vehicle.id))
        .set("A_FuelGrade", text(&vehicle.fuel_grade))
        .set("A_CreatedAt", AttributeValue::time(vehicle.created_at))
        .set("A_UpdatedAt", AttributeValue::time(vehicle.updated_at))
        .set("A_Make", text(&vehicle.make))
        .set("A_Model", text(&vehicle.model))
        .set("A_SubModel", text(&vehicle.submodel))
        .set("A_Year", AttributeValue::number(vehicle.year.unwrap_or_default()))
}

fn link_item(automatic_id: &str, account_id: &str, now: DateTime<Utc>) -> Item {
    Item::new(&link_key(automatic_id, account_id))
        .with("AccountID", AttributeValue::string(account_id))
        .with("AutomaticID", AttributeValue::string(automatic_id))
        .with("M_LastUpdatedAt", AttributeValue::time(now))
        .with("M_Type", AttributeValue::string(LINK_TYPE))
        .with(GSI1_HASH_KEY, AttributeValue::string(format!("av/{account_id}")))
        .with(GSI1_SORT_KEY, AttributeValue::string(format!("av/{automatic_id}")))
}

async fn write_vehicles(
    store: &dyn EntityStore,
    vehicles: &[ApiVehicle],
    account_id: &str,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    for chunk in vehicles.chunks(VEHICLES_PER_TRANSACTION) {
        let ops: Vec<TransactOp> = chunk
            .iter()
            .flat_map(|vehicle| {
                [
                    vehicle_update(vehicle, account_id, now).into(),
                    TransactOp::put(link_item(&vehicle.id, account_id, now)),
                ]
            })
            .collect();
        store.transact_write(&ops).await?;
    }
    Ok(())
}

/// Sync every vehicle visible to the account, following `next` links until
/// the listing is exhausted. Returns how many vehicles were written.
pub async fn update_vehicles_for_account(
    services: &Services,
    account: &Account,
    token: &AccessToken,
    now: DateTime<Utc>,
) -> Result<usize, UpdateError> {
    let mut url = Some(services.upstream.endpoints().vehicles());
    let mut visited = HashSet::new();
    let mut written = 0;

    while let Some(current) = url.take() {
        let page: Page<ApiVehicle> = services.upstream.get_json(&current, token).await?;
        write_vehicles(services.store(), &page.results, &account.id, now).await?;
        written += page.results.len();
        visited.insert(current);

        url = match page.next() {
            Some(next) if visited.contains(next) => {
                tracing::warn!(account_id = %account.id, url = %next, "Vehicle listing loops back to a fetched page");
                None
            }
            Some(next) if !is_api_page(services, next) => {
                tracing::warn!(account_id = %account.id, url = %next, "Ignoring vehicle page off the API host");
                None
            }
            next => next.map(str::to_string),
        };
    }

    tracing::info!(account_id = %account.id, vehicles = written, "Synced vehicles");
    Ok(written)
}

fn is_api_page(services: &Services, url: &str) -> bool {
    Url::parse(url).is_ok_and(|url| services.upstream.endpoints().is_api_url(&url))
}

/// Vehicles linked to the account.
pub async fn vehicles_for_account(
    store: &dyn EntityStore,
    account_id: &str,
) -> Result<Vec<Vehicle>, StoreError> {
    let query = Query::new(Index::Gsi1, format!("av/{account_id}"))
        .begins_with("av/")
        .limit(VEHICLE_LIST_LIMIT);
    let keys = store
        .query(&query)
        .await?
        .iter()
        .map(|link| link.require_string("AutomaticID").map(Vehicle::key_for))
        .collect::<Result<Vec<_>, _>>()?;
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    store
        .batch_get(&keys)
        .await?
        .iter()
        .map(Vehicle::from_item)
        .collect()
}
