//! Custom request extractors.

pub mod farm_id;

pub use farm_id::FarmId;
