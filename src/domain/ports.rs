use super::audit::{PaymentAuditRecord, RefundAuditRecord};
use super::catalog::{Cart, Coupon, CouponUsage, Product};
use super::gateway::{
    RefundRequest, RefundResponse, RetrievedPayment, ThreeDsInitiation, ThreeDsRequest,
};
use super::order::{Order, OrderStatus};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn store(&self, product: Product) -> Result<()>;
    async fn get(&self, product_id: u64) -> Result<Option<Product>>;
    /// Removes `metres` of fabric from stock, failing if not enough is left.
    async fn decrement_stock(&self, product_id: u64, metres: Decimal) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn store(&self, cart: Cart) -> Result<()>;
    async fn get(&self, cart_id: &str) -> Result<Option<Cart>>;
    async fn clear(&self, cart_id: &str) -> Result<()>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn store(&self, coupon: Coupon) -> Result<()>;
    async fn get(&self, code: &str) -> Result<Option<Coupon>>;
    async fn mark_used(&self, code: &str, usage: CouponUsage) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order, its items and its address as one unit.
    async fn create(&self, order: Order) -> Result<()>;
    async fn by_order_number(&self, order_number: &str) -> Result<Option<Order>>;
    async fn by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>>;
    async fn by_payment_id(&self, payment_id: &str) -> Result<Option<Order>>;
    /// Replaces the order if its stored `version` still equals `expected_version`.
    ///
    /// Fails with a validation error when another writer got there first.
    async fn update_if_version(&self, order: Order, expected_version: u64) -> Result<()>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn save_payment(&self, record: PaymentAuditRecord) -> Result<()>;
    async fn payment_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<PaymentAuditRecord>>;
    async fn payment_by_payment_id(&self, payment_id: &str) -> Result<Option<PaymentAuditRecord>>;
    async fn payment_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<PaymentAuditRecord>>;
    async fn save_refund(&self, record: RefundAuditRecord) -> Result<()>;
    async fn refunds_for(&self, payment_audit_id: Uuid) -> Result<Vec<RefundAuditRecord>>;
}

/// Fire-and-forget outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn queue_order_confirmation(&self, order: &Order) -> Result<()>;
    async fn notify_admins(&self, order: &Order, status: OrderStatus) -> Result<()>;
}

/// The card-payment gateway.
///
/// `Err` means the call itself failed (transport, malformed response); a reachable
/// gateway that says no answers `Ok` with a failure status.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_three_ds(&self, request: ThreeDsRequest) -> Result<ThreeDsInitiation>;
    async fn retrieve_payment(&self, payment_id: &str) -> Result<RetrievedPayment>;
    async fn create_refund(&self, request: RefundRequest) -> Result<RefundResponse>;
}

pub type ProductStoreRef = Arc<dyn ProductStore>;
pub type CartStoreRef = Arc<dyn CartStore>;
pub type CouponStoreRef = Arc<dyn CouponStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type AuditStoreRef = Arc<dyn AuditStore>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
