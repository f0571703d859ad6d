//! Payment orchestration core for a made-to-measure curtain shop.
//!
//! Card payments go through a 3DS handshake: `initiate` re-prices the basket
//! server-side and opens a challenge, the gateway's callback lands in `complete`
//! on an unrelated request, and only then is the order written. Refunds locate
//! the payment from whatever identifier an operator has at hand.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
