use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Price, stock, coupon or amount checks failed before the gateway was contacted.
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The gateway rejected the call or could not be reached.
    #[error("Gateway error: {0}")]
    GatewayError(String),
    /// No refund target could be located for the supplied identifier.
    #[error("Reconciliation error: {0}")]
    ReconciliationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Notification error: {0}")]
    NotificationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::StorageError(err.to_string())
    }
}
