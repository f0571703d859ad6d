//! Domain model: value objects, records, and the ports the application layer
//! drives (stores, notifier, gateway).

pub mod audit;
pub mod catalog;
pub mod gateway;
pub mod money;
pub mod order;
pub mod ports;
pub mod session;
