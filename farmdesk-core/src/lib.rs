//! Farmdesk Core - Farm Records and Warehouse Statements
//!
//! Pure data and transformations shared by the API layer:
//! - the canonical twelve-field farm record and its editable input
//! - the tagged union of raw warehouse result encodings and its normalizer
//! - parameterized statement building for the farm CRUD operations
//!
//! Nothing in this crate performs I/O.

pub mod coerce;
pub mod error;
pub mod farm;
pub mod normalize;
pub mod statement;

pub use error::{CoreError, CoreResult};
pub use farm::{FarmField, FarmInput, FarmRecord, FieldKind};
pub use normalize::{normalize, RawResult};
pub use statement::{
    delete_farm, insert_farm, list_farms, connectivity_check, update_farm, SqlParam, SqlValue, Statement,
    TableName,
};
