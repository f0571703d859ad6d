use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

const DEFAULT_CURRENCY: &str = "TRY";
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_REFUND_CONTEXT_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Tunables for checkout and refunds.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    /// ISO currency code sent to the gateway.
    pub currency: String,
    /// Maximum absolute difference accepted between server and client prices.
    pub price_tolerance: Decimal,
    /// Smallest amount the gateway will charge.
    pub minimum_charge: Decimal,
    /// How long a pending 3DS session waits for its callback.
    pub session_ttl: Duration,
    /// How long a refund context stays cached after completion.
    pub refund_context_ttl: Duration,
    pub sweep_interval: Duration,
    /// URL the gateway posts the 3DS result to.
    pub callback_url: String,
    pub success_redirect: String,
    pub failure_redirect: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            price_tolerance: dec!(0.01),
            minimum_charge: dec!(1.00),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            refund_context_ttl: Duration::from_secs(DEFAULT_REFUND_CONTEXT_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            callback_url: "http://localhost:8080/api/payments/3ds/callback".to_string(),
            success_redirect: "http://localhost:3000/payment/success".to_string(),
            failure_redirect: "http://localhost:3000/payment/failure".to_string(),
        }
    }
}
