// Node configuration: file shape, defaults, and loading.

pub mod store;
pub mod types;
