use super::catalog::ValidatedLineItem;
use super::money::Money;
use super::order::{Address, Buyer, Order};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to materialize the order once the 3DS callback arrives.
///
/// The callback is delivered by the gateway on an unrelated request, so this
/// is the only link between `initiate` and `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransactionSession {
    pub conversation_id: String,
    pub order_number: String,
    pub payment_audit_id: Uuid,
    pub buyer: Buyer,
    pub shipping_address: Address,
    pub cart_id: Option<String>,
    pub coupon_code: Option<String>,
    pub discount: Money,
    pub subtotal: Money,
    pub charge_amount: Money,
    pub items: Vec<ValidatedLineItem>,
}

/// The minimal data required to refund a completed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundContext {
    pub payment_id: String,
    pub order_number: String,
    pub transaction_id: String,
    pub buyer: Buyer,
    pub address: Address,
    pub charged_amount: Money,
    pub currency: String,
}

impl From<&Order> for RefundContext {
    fn from(order: &Order) -> Self {
        Self {
            payment_id: order.payment_id.clone(),
            order_number: order.order_number.clone(),
            transaction_id: order.transaction_id.clone(),
            buyer: order.buyer.clone(),
            address: order.address.clone(),
            charged_amount: order.charged_amount,
            currency: order.currency.clone(),
        }
    }
}
