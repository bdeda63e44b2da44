//! On-disk storage. JSON is the only persistence format this crate needs:
//! branch files, rotator cooldown state, and layered configuration.

mod json;

pub use json::JsonStore;
