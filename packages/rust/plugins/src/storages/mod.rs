//! Built-in storages.

mod local;

pub use local::LocalStorage;
