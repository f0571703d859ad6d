//! Application layer containing the checkout and refund orchestration.
//!
//! `PaymentOrchestrator` drives the 3DS handshake from price validation to order
//! materialization; `RefundOrchestrator` locates and reverses completed payments.
//! Both reach the outside world only through the ports in [`crate::domain::ports`].

pub mod checkout;
pub mod coupon;
pub mod post_commit;
pub mod pricing;
pub mod refund;

use crate::domain::ports::{
    AuditStoreRef, CartStoreRef, CouponStoreRef, GatewayRef, NotifierRef, OrderStoreRef,
    ProductStoreRef,
};

/// The collaborators both orchestrators are built from.
#[derive(Clone)]
pub struct Dependencies {
    pub products: ProductStoreRef,
    pub carts: CartStoreRef,
    pub coupons: CouponStoreRef,
    pub orders: OrderStoreRef,
    pub audits: AuditStoreRef,
    pub notifier: NotifierRef,
    pub gateway: GatewayRef,
}
