//! Ingestion of upstream trips and vehicles into the entity store.
//!
//! Every write is an upsert keyed by upstream IDs, so any step may be re-run
//! after a partial failure without duplicating rows.

pub mod trips;
pub mod vehicles;

pub use trips::update_trips_for_account;
pub use vehicles::{update_vehicles_for_account, vehicles_for_account, Vehicle};
