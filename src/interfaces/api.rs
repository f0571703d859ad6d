//! Request-facing surface of the payment core.
//!
//! Each handler turns orchestrator results into what the storefront sees: a
//! `{message, success, data}` envelope, or for the 3DS callback a redirect. Only
//! messages that are safe to show a shopper leave this module.

use crate::application::checkout::{
    CheckoutRequest, CompletionOutcome, PaymentOrchestrator, ThreeDsChallenge,
};
use crate::application::refund::{RefundOrchestrator, RefundReceipt};
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

const GENERIC_FAILURE: &str = "payment could not be processed, please try again later";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            success: true,
            data: Some(data),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
            data: None,
        }
    }
}

/// Where the shopper's browser is sent after the 3DS callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
}

pub struct CheckoutApi {
    payments: Arc<PaymentOrchestrator>,
    refunds: Arc<RefundOrchestrator>,
    config: PaymentConfig,
}

impl CheckoutApi {
    pub fn new(
        payments: Arc<PaymentOrchestrator>,
        refunds: Arc<RefundOrchestrator>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            payments,
            refunds,
            config,
        }
    }

    pub async fn submit_card_payment(
        &self,
        request: CheckoutRequest,
    ) -> ApiResponse<ThreeDsChallenge> {
        match self.payments.initiate(request).await {
            Ok(challenge) => ApiResponse::ok("3DS verification required", challenge),
            Err(err) => {
                warn!(error = %err, "card payment rejected");
                ApiResponse::rejected(client_message(&err))
            }
        }
    }

    pub async fn three_ds_callback(&self, payment_id: &str, conversation_id: &str) -> Redirect {
        match self.payments.complete(payment_id, conversation_id).await {
            Ok(CompletionOutcome::Completed { order, warnings }) => {
                if !warnings.is_empty() {
                    info!(
                        order_number = %order.order_number,
                        warnings = warnings.len(),
                        "order completed with post-commit warnings"
                    );
                }
                self.redirect(&self.config.success_redirect, "order", &order.order_number)
            }
            Ok(CompletionOutcome::AlreadyCompleted { order }) => {
                self.redirect(&self.config.success_redirect, "order", &order.order_number)
            }
            Ok(CompletionOutcome::Failed { reason }) => {
                self.redirect(&self.config.failure_redirect, "reason", &reason)
            }
            Err(err) => {
                error!(error = %err, "3DS callback could not be completed");
                self.redirect(&self.config.failure_redirect, "reason", &client_message(&err))
            }
        }
    }

    pub async fn refund(&self, identifier: &str, amount: Decimal) -> ApiResponse<RefundReceipt> {
        match self.refunds.refund(identifier, amount).await {
            Ok(receipt) => ApiResponse::ok("refund issued", receipt),
            Err(err) => {
                warn!(error = %err, "refund rejected");
                ApiResponse::rejected(client_message(&err))
            }
        }
    }

    fn redirect(&self, base: &str, key: &str, value: &str) -> Redirect {
        let location = match Url::parse_with_params(base, &[(key, value)]) {
            Ok(url) => url.to_string(),
            Err(err) => {
                error!(%base, error = %err, "invalid redirect base url");
                base.to_string()
            }
        };
        Redirect { location }
    }
}

/// Text that may be shown to the shopper or operator for an error.
pub fn client_message(err: &PaymentError) -> String {
    match err {
        PaymentError::ValidationError(message) | PaymentError::GatewayError(message) => {
            message.clone()
        }
        PaymentError::ReconciliationError(_) => "refund target not found".to_string(),
        _ => GENERIC_FAILURE.to_string(),
    }
}
