//! Request records: schema, partial updates, keyed store.

pub mod model;
pub mod store;

pub use model::{FieldValue, FinishMode, Record, RecordState, RecordUpdate, StartFields};
pub use store::RecordStore;
