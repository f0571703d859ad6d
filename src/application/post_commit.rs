use crate::domain::catalog::CouponUsage;
use crate::domain::order::Order;
use crate::domain::ports::{CartStoreRef, CouponStoreRef, NotifierRef, ProductStoreRef};
use crate::domain::session::PendingTransactionSession;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Work that follows a committed order. None of it may undo the order: the money
/// has already moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCommitAction {
    DecrementStock,
    ConsumeCoupon,
    ClearCart,
    QueueConfirmationEmail,
    NotifyAdmins,
}

impl PostCommitAction {
    pub const ALL: [PostCommitAction; 5] = [
        PostCommitAction::DecrementStock,
        PostCommitAction::ConsumeCoupon,
        PostCommitAction::ClearCart,
        PostCommitAction::QueueConfirmationEmail,
        PostCommitAction::NotifyAdmins,
    ];
}

impl fmt::Display for PostCommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostCommitAction::DecrementStock => "decrement_stock",
            PostCommitAction::ConsumeCoupon => "consume_coupon",
            PostCommitAction::ClearCart => "clear_cart",
            PostCommitAction::QueueConfirmationEmail => "queue_confirmation_email",
            PostCommitAction::NotifyAdmins => "notify_admins",
        };
        f.write_str(name)
    }
}

/// A post-commit action that failed. Logged, never returned as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostCommitWarning {
    pub action: PostCommitAction,
    pub reason: String,
}

pub struct PostCommitRunner {
    products: ProductStoreRef,
    coupons: CouponStoreRef,
    carts: CartStoreRef,
    notifier: NotifierRef,
}

impl PostCommitRunner {
    pub fn new(
        products: ProductStoreRef,
        coupons: CouponStoreRef,
        carts: CartStoreRef,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            products,
            coupons,
            carts,
            notifier,
        }
    }

    /// Runs every action in order; a failure is recorded and the next action runs anyway.
    pub async fn run_all(
        &self,
        order: &Order,
        session: &PendingTransactionSession,
    ) -> Vec<PostCommitWarning> {
        let mut warnings = Vec::new();
        for action in PostCommitAction::ALL {
            if let Err(err) = self.run(action, order, session).await {
                warn!(
                    order_number = %order.order_number,
                    %action,
                    error = %err,
                    "post-commit action failed; order stands"
                );
                warnings.push(PostCommitWarning {
                    action,
                    reason: err.to_string(),
                });
            }
        }
        info!(
            order_number = %order.order_number,
            failed = warnings.len(),
            "post-commit actions finished"
        );
        warnings
    }

    async fn run(
        &self,
        action: PostCommitAction,
        order: &Order,
        session: &PendingTransactionSession,
    ) -> Result<()> {
        match action {
            PostCommitAction::DecrementStock => self.decrement_stock(session).await,
            PostCommitAction::ConsumeCoupon => match session.coupon_code.as_deref() {
                Some(code) => {
                    let usage = CouponUsage {
                        order_number: order.order_number.clone(),
                        buyer_id: order.buyer.id.clone(),
                        used_at: Utc::now(),
                    };
                    self.coupons.mark_used(code, usage).await
                }
                None => Ok(()),
            },
            PostCommitAction::ClearCart => match session.cart_id.as_deref() {
                Some(cart_id) => self.carts.clear(cart_id).await,
                None => Ok(()),
            },
            PostCommitAction::QueueConfirmationEmail => {
                self.notifier.queue_order_confirmation(order).await
            }
            PostCommitAction::NotifyAdmins => self.notifier.notify_admins(order, order.status).await,
        }
    }

    /// Decrements every line, even after one fails, and reports the failures together.
    async fn decrement_stock(&self, session: &PendingTransactionSession) -> Result<()> {
        let mut failures = Vec::new();
        for item in &session.items {
            if let Err(err) = self
                .products
                .decrement_stock(item.product_id, item.stock_required)
                .await
            {
                failures.push(err.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PaymentError::StorageError(failures.join("; ")))
        }
    }
}
