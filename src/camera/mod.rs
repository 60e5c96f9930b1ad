// Camera domain: driver contract, device session, and driver implementations.

pub mod api;
pub mod error;
pub mod mock;
pub mod session;
pub mod simulated;
pub mod types;
