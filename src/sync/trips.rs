//! Trip ingestion, one upstream page per call.

use crate::account::Account;
use crate::error::UpdateError;
use crate::services::Services;
use crate::store::{
    AttributeValue, Item, PrimaryKey, WriteRequest, GSI1_HASH_KEY, GSI1_SORT_KEY, GSI2_HASH_KEY,
    GSI2_SORT_KEY, MAX_BATCH_WRITE_ITEMS,
};
use crate::token::AccessToken;
use crate::upstream::{resource_id, ApiTrip, Page};

pub fn trip_key(trip_id: &str, vehicle_id: &str) -> PrimaryKey {
    PrimaryKey::new(format!("trip/{trip_id}"), format!("vehicle/{vehicle_id}"))
}

/// The stored form of an upstream trip, or `None` when the trip carries no
/// vehicle reference to key it by.
pub fn trip_item(trip: &ApiTrip) -> Option<Item> {
    let vehicle_id = resource_id(&trip.vehicle)?;
    let mut item = Item::new(&trip_key(&trip.id, &vehicle_id))
        .with("TripID", AttributeValue::string(&trip.id))
        .with("DurationS", AttributeValue::decimal(trip.duration_s, 0))
        .with("DistanceM", AttributeValue::decimal(trip.distance_m, 2))
        .with(GSI1_HASH_KEY, AttributeValue::string(format!("vehicle/{vehicle_id}")))
        .with(GSI1_SORT_KEY, AttributeValue::string(format!("trip/{}", trip.id)));

    if let Some(started_at) = trip.started_at {
        item.set("StartedAt", AttributeValue::time(started_at));
    }
    if let Some(ended_at) = trip.ended_at {
        item.set("EndedAt", AttributeValue::time(ended_at));
    }
    if let Some(driver_id) = resource_id(&trip.driver) {
        item.set(GSI2_HASH_KEY, AttributeValue::string(format!("user/{driver_id}")));
        item.set(GSI2_SORT_KEY, AttributeValue::string(format!("trip/{}", trip.id)));
    }
    Some(item)
}

/// Fetch one page of trips at `uri` and upsert them in batches.
///
/// Batches are written in order and are not atomic with each other: a failure
/// on one batch returns the error without attempting the rest, and re-running
/// the same page is safe because every write is an upsert. Returns the next
/// page's URL, `None` once the history is exhausted.
pub async fn update_trips_for_account(
    services: &Services,
    account: &Account,
    token: &AccessToken,
    uri: &str,
) -> Result<Option<String>, UpdateError> {
    let page: Page<ApiTrip> = services.upstream.get_json(uri, token).await?;

    let requests: Vec<WriteRequest> = page
        .results
        .iter()
        .filter_map(|trip| {
            let item = trip_item(trip);
            if item.is_none() {
                tracing::warn!(
                    account_id = %account.id,
                    trip_id = %trip.id,
                    "Skipping trip without a vehicle"
                );
            }
            item
        })
        .map(WriteRequest::Put)
        .collect();

    for (batch_index, batch) in requests.chunks(MAX_BATCH_WRITE_ITEMS).enumerate() {
        if let Err(e) = services.store().batch_write(batch).await {
            tracing::error!(
                account_id = %account.id,
                batch = batch_index,
                error = %e,
                "Failed to write trip batch"
            );
            return Err(e.into());
        }
    }

    tracing::info!(
        account_id = %account.id,
        trips = requests.len(),
        has_next = page.next().is_some(),
        "Synced trip page"
    );
    Ok(page.next().map(str::to_string))
}
