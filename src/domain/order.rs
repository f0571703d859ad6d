use super::catalog::ValidatedLineItem;
use super::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: Option<String>,
    pub identity_number: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub contact_name: String,
    pub city: String,
    pub country: String,
    pub line: String,
    pub zip_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    /// A refund has been reserved and is being sent to the gateway.
    RefundPending,
    Refunded,
}

impl OrderStatus {
    pub fn is_refundable(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: u64,
    pub name: String,
    pub width: Decimal,
    pub height: Decimal,
    pub pleat_pattern: String,
    pub quantity: u32,
    /// Price before the coupon.
    pub list_price: Money,
    /// Amount actually charged for the line.
    pub charged: Money,
}

impl From<&ValidatedLineItem> for OrderItem {
    fn from(item: &ValidatedLineItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            width: item.width,
            height: item.height,
            pleat_pattern: item.pleat_pattern.clone(),
            quantity: item.quantity,
            list_price: item.server_price,
            charged: item.charge,
        }
    }
}

/// The durable record of an accepted sale.
///
/// An order is written together with its items and shipping address in a single
/// store operation; it never exists without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    pub buyer: Buyer,
    pub address: Address,
    pub items: Vec<OrderItem>,
    pub cart_id: Option<String>,
    pub coupon_code: Option<String>,
    pub subtotal: Money,
    pub discount: Money,
    pub charged_amount: Money,
    pub refunded_amount: Money,
    pub currency: String,
    /// Gateway payment id returned by the 3DS callback.
    pub payment_id: String,
    /// Gateway transaction id that refunds are issued against.
    pub transaction_id: String,
    pub status: OrderStatus,
    /// Bumped on every status transition; used for optimistic concurrency.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Reserves the order for a refund so no other writer can start one.
    pub fn begin_refund(&mut self) {
        self.transition(OrderStatus::RefundPending);
    }

    /// Releases a reservation whose refund did not go through.
    pub fn abort_refund(&mut self) {
        self.transition(OrderStatus::Paid);
    }

    /// Applies a refund, moving the order to its terminal state.
    pub fn mark_refunded(&mut self, amount: Money) {
        self.refunded_amount += amount;
        self.transition(OrderStatus::Refunded);
    }

    fn transition(&mut self, status: OrderStatus) {
        self.status = status;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
