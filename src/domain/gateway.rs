use super::money::Money;
use super::order::{Address, Buyer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Failure,
}

/// One basket line as the gateway sees it. The gateway rejects requests whose
/// basket does not sum exactly to `ThreeDsRequest::price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketItem {
    pub id: String,
    pub name: String,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeDsRequest {
    pub conversation_id: String,
    pub basket_id: String,
    pub price: Money,
    pub paid_price: Money,
    pub currency: String,
    pub callback_url: String,
    pub buyer: Buyer,
    pub shipping_address: Address,
    pub basket: Vec<BasketItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeDsInitiation {
    pub status: GatewayStatus,
    /// Challenge page the client must render to continue.
    pub redirect_html: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPayment {
    pub status: GatewayStatus,
    pub payment_id: Option<String>,
    pub conversation_id: Option<String>,
    pub paid_price: Option<Money>,
    pub transaction_ids: Vec<String>,
    pub error_message: Option<String>,
}

impl RetrievedPayment {
    pub fn is_successful(&self) -> bool {
        self.status == GatewayStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub conversation_id: String,
    pub transaction_id: String,
    pub amount: Money,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub status: GatewayStatus,
    pub refund_transaction_id: Option<String>,
    pub error_message: Option<String>,
}
