use super::Dependencies;
use super::coupon::CouponReconciler;
use super::post_commit::{PostCommitRunner, PostCommitWarning};
use super::pricing::PriceValidator;
use crate::config::PaymentConfig;
use crate::domain::audit::{AuditStatus, PaymentAuditRecord};
use crate::domain::catalog::LineItemRequest;
use crate::domain::gateway::{BasketItem, GatewayStatus, RetrievedPayment, ThreeDsRequest};
use crate::domain::money::Money;
use crate::domain::order::{Address, Buyer, Order, OrderItem, OrderStatus};
use crate::domain::ports::{AuditStoreRef, CartStoreRef, GatewayRef, OrderStoreRef};
use crate::domain::session::{PendingTransactionSession, RefundContext};
use crate::error::{PaymentError, Result};
use crate::infrastructure::session_store::SessionStore;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// A card payment as submitted by the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub buyer: Buyer,
    pub shipping_address: Address,
    pub cart_id: Option<String>,
    /// Coupon the client believes is applied. Only cross-checked against the cart.
    pub coupon_code: Option<String>,
    /// Lines to pay for; when empty the cart's lines are used.
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
    pub declared_subtotal: Decimal,
}

/// What the storefront needs to show the 3DS challenge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeDsChallenge {
    pub conversation_id: String,
    pub order_number: String,
    pub charge_amount: Money,
    pub redirect_html: String,
}

impl ThreeDsChallenge {
    /// A challenge is only handed out once the gateway accepted the payment.
    pub fn state(&self) -> PaymentState {
        PaymentState::ThreeDsPending
    }
}

/// Where a payment stands in the handshake, as seen by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    ThreeDsPending,
    Completed,
    Failed,
}

#[derive(Debug)]
pub enum CompletionOutcome {
    /// The order was created by this call.
    Completed {
        order: Order,
        warnings: Vec<PostCommitWarning>,
    },
    /// A replayed callback for a payment whose order already exists.
    AlreadyCompleted { order: Order },
    /// The gateway did not confirm the payment; no order exists.
    Failed { reason: String },
}

impl CompletionOutcome {
    pub fn state(&self) -> PaymentState {
        match self {
            CompletionOutcome::Completed { .. } | CompletionOutcome::AlreadyCompleted { .. } => {
                PaymentState::Completed
            }
            CompletionOutcome::Failed { .. } => PaymentState::Failed,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            CompletionOutcome::Completed { order, .. }
            | CompletionOutcome::AlreadyCompleted { order } => Some(order),
            CompletionOutcome::Failed { .. } => None,
        }
    }
}

/// Drives a card payment from the client's submission to a persisted order.
///
/// `initiate` and `complete` for the same payment arrive on unrelated requests;
/// the pending-session store is the only state they share.
pub struct PaymentOrchestrator {
    config: PaymentConfig,
    pricing: PriceValidator,
    coupons: CouponReconciler,
    carts: CartStoreRef,
    orders: OrderStoreRef,
    audits: AuditStoreRef,
    gateway: GatewayRef,
    sessions: Arc<SessionStore<PendingTransactionSession>>,
    refund_contexts: Arc<SessionStore<RefundContext>>,
    post_commit: PostCommitRunner,
}

impl PaymentOrchestrator {
    pub fn new(
        config: PaymentConfig,
        deps: Dependencies,
        sessions: Arc<SessionStore<PendingTransactionSession>>,
        refund_contexts: Arc<SessionStore<RefundContext>>,
    ) -> Self {
        Self {
            pricing: PriceValidator::new(deps.products.clone(), config.price_tolerance),
            coupons: CouponReconciler::new(deps.coupons.clone()),
            post_commit: PostCommitRunner::new(
                deps.products,
                deps.coupons,
                deps.carts.clone(),
                deps.notifier,
            ),
            carts: deps.carts,
            orders: deps.orders,
            audits: deps.audits,
            gateway: deps.gateway,
            sessions,
            refund_contexts,
            config,
        }
    }

    /// Validates the order server-side and starts the 3DS handshake.
    ///
    /// Every check runs before the gateway is contacted; a rejected request leaves
    /// no trace at the gateway.
    #[instrument(skip(self, request), fields(buyer_id = %request.buyer.id))]
    pub async fn initiate(&self, request: CheckoutRequest) -> Result<ThreeDsChallenge> {
        let cart = match request.cart_id.as_deref() {
            Some(cart_id) => Some(self.carts.get(cart_id).await?.ok_or_else(|| {
                PaymentError::ValidationError(format!("cart {} not found", cart_id))
            })?),
            None => None,
        };

        let lines = if request.items.is_empty() {
            cart.as_ref().map(|cart| cart.items.clone()).unwrap_or_default()
        } else {
            request.items.clone()
        };

        let basket = self.pricing.validate(&lines).await?;
        let declared_subtotal = Money::new(request.declared_subtotal);
        if !basket
            .subtotal
            .within(declared_subtotal, self.config.price_tolerance)
        {
            return Err(PaymentError::ValidationError(format!(
                "subtotal mismatch: expected {}, got {}",
                basket.subtotal, declared_subtotal
            )));
        }

        let coupon = self
            .coupons
            .resolve(cart.as_ref(), request.coupon_code.as_deref())
            .await?;
        let discount = coupon
            .as_ref()
            .map(|coupon| coupon.discount)
            .unwrap_or(Money::ZERO);
        let reconciled = CouponReconciler::reconcile(basket, discount);

        if reconciled.charge_amount.value() < self.config.minimum_charge {
            return Err(PaymentError::ValidationError(format!(
                "charge amount {} is below the minimum of {}",
                reconciled.charge_amount, self.config.minimum_charge
            )));
        }

        let conversation_id = Uuid::new_v4().to_string();
        let order_number = new_order_number();
        let mut audit = PaymentAuditRecord::pending(
            conversation_id.clone(),
            order_number.clone(),
            request.buyer.id.clone(),
            reconciled.charge_amount,
            self.config.currency.clone(),
        );
        self.audits.save_payment(audit.clone()).await?;

        let gateway_request = ThreeDsRequest {
            conversation_id: conversation_id.clone(),
            basket_id: order_number.clone(),
            price: reconciled.charge_amount,
            paid_price: reconciled.charge_amount,
            currency: self.config.currency.clone(),
            callback_url: self.config.callback_url.clone(),
            buyer: request.buyer.clone(),
            shipping_address: request.shipping_address.clone(),
            basket: reconciled
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| BasketItem {
                    id: format!("{}-{}", item.product_id, index + 1),
                    name: item.name.clone(),
                    price: item.charge,
                })
                .collect(),
        };

        let rejection = match self.gateway.initiate_three_ds(gateway_request).await {
            Ok(initiation) if initiation.status == GatewayStatus::Success => {
                match initiation.redirect_html {
                    Some(redirect_html) => {
                        let session = PendingTransactionSession {
                            conversation_id: conversation_id.clone(),
                            order_number: order_number.clone(),
                            payment_audit_id: audit.id,
                            buyer: request.buyer,
                            shipping_address: request.shipping_address,
                            cart_id: request.cart_id,
                            coupon_code: coupon.map(|coupon| coupon.code),
                            discount: reconciled.discount,
                            subtotal: reconciled.subtotal,
                            charge_amount: reconciled.charge_amount,
                            items: reconciled.items,
                        };
                        self.sessions.put(
                            conversation_id.clone(),
                            Some(order_number.clone()),
                            session,
                        );
                        info!(
                            %conversation_id,
                            %order_number,
                            charge_amount = %reconciled.charge_amount,
                            "3DS challenge issued"
                        );
                        return Ok(ThreeDsChallenge {
                            conversation_id,
                            order_number,
                            charge_amount: reconciled.charge_amount,
                            redirect_html,
                        });
                    }
                    None => "gateway returned no challenge page".to_string(),
                }
            }
            Ok(initiation) => initiation
                .error_message
                .unwrap_or_else(|| "3DS initiation was rejected".to_string()),
            Err(err) => gateway_message(err),
        };

        warn!(%conversation_id, reason = %rejection, "3DS initiation failed");
        audit.fail(rejection.clone())?;
        self.audits.save_payment(audit).await?;
        Err(PaymentError::GatewayError(rejection))
    }

    /// Handles the gateway's 3DS callback.
    ///
    /// Safe to replay: the pending session is claimed atomically, so a second
    /// delivery never creates a second order.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        payment_id: &str,
        conversation_id: &str,
    ) -> Result<CompletionOutcome> {
        // Transport errors leave the audit and session untouched so the callback can be retried.
        let payment = self
            .gateway
            .retrieve_payment(payment_id)
            .await
            .map_err(|err| PaymentError::GatewayError(gateway_message(err)))?;

        // Nothing is touched for a payment that belongs to another conversation.
        if let Some(reported) = payment.conversation_id.as_deref()
            && reported != conversation_id
        {
            warn!(reported, "callback conversation id does not match the payment");
            return Ok(CompletionOutcome::Failed {
                reason: "conversation id does not match payment".to_string(),
            });
        }

        if !payment.is_successful() {
            let reason = payment
                .error_message
                .clone()
                .unwrap_or_else(|| "payment was not successful".to_string());
            // A failure the gateway cannot tie to this conversation must not close a
            // live session; expiry reclaims the session either way.
            if payment.conversation_id.is_some()
                || self.sessions.get_by_primary(conversation_id).is_none()
            {
                self.record_failure(conversation_id, payment_id, &reason)
                    .await?;
                warn!(%reason, "payment rejected by gateway");
            } else {
                warn!(%reason, "unattributable payment failure ignored for live session");
            }
            return Ok(CompletionOutcome::Failed { reason });
        }

        let canonical_payment_id = payment
            .payment_id
            .clone()
            .unwrap_or_else(|| payment_id.to_string());

        let Some(session) = self.sessions.take(conversation_id) else {
            if let Some(order) = self.orders.by_payment_id(&canonical_payment_id).await? {
                info!(order_number = %order.order_number, "callback replay for completed order");
                return Ok(CompletionOutcome::AlreadyCompleted { order });
            }
            error!(
                payment_id = %canonical_payment_id,
                "payment captured but its session is unknown or expired"
            );
            return Err(PaymentError::ValidationError(format!(
                "payment session {} is unknown or has expired",
                conversation_id
            )));
        };

        let order = self.build_order(&session, &payment, &canonical_payment_id);
        if let Err(err) = self.orders.create(order.clone()).await {
            error!(order_number = %order.order_number, error = %err, "order persistence failed");
            self.sessions.put(
                session.conversation_id.clone(),
                Some(session.order_number.clone()),
                session,
            );
            return Err(err);
        }
        info!(
            order_number = %order.order_number,
            payment_id = %canonical_payment_id,
            amount = %order.charged_amount,
            "order created"
        );

        // The order is committed; audit trouble from here on is logged, not returned.
        if let Err(err) = self
            .record_success(&session, &canonical_payment_id)
            .await
        {
            error!(order_number = %order.order_number, error = %err, "payment audit update failed");
        }

        let warnings = self.post_commit.run_all(&order, &session).await;

        self.refund_contexts.put(
            canonical_payment_id,
            Some(order.order_number.clone()),
            RefundContext::from(&order),
        );

        Ok(CompletionOutcome::Completed { order, warnings })
    }

    /// Evicts pending sessions whose callback never arrived and closes their
    /// audit records as failed. Returns the number of sessions evicted.
    pub async fn sweep_expired_sessions(&self) -> Result<usize> {
        let expired = self.sessions.evict_expired();
        for session in &expired {
            if let Some(mut audit) = self
                .audits
                .payment_by_conversation(&session.conversation_id)
                .await?
                && audit.status == AuditStatus::Pending
            {
                audit.fail("payment session expired")?;
                self.audits.save_payment(audit).await?;
            }
            info!(
                conversation_id = %session.conversation_id,
                order_number = %session.order_number,
                "expired payment session evicted"
            );
        }
        self.refund_contexts.evict_expired();
        Ok(expired.len())
    }

    /// Runs [`PaymentOrchestrator::sweep_expired_sessions`] on the configured interval.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_expired_sessions().await {
                    warn!(error = %err, "session sweep failed");
                }
            }
        })
    }

    fn build_order(
        &self,
        session: &PendingTransactionSession,
        payment: &RetrievedPayment,
        payment_id: &str,
    ) -> Order {
        if let Some(paid) = payment.paid_price
            && paid != session.charge_amount
        {
            warn!(%paid, expected = %session.charge_amount, "gateway paid price differs from session");
        }
        let transaction_id = payment
            .transaction_ids
            .first()
            .cloned()
            .unwrap_or_else(|| payment_id.to_string());
        let now = Utc::now();

        Order {
            order_number: session.order_number.clone(),
            buyer: session.buyer.clone(),
            address: session.shipping_address.clone(),
            items: session.items.iter().map(OrderItem::from).collect(),
            cart_id: session.cart_id.clone(),
            coupon_code: session.coupon_code.clone(),
            subtotal: session.subtotal,
            discount: session.discount,
            charged_amount: session.charge_amount,
            refunded_amount: Money::ZERO,
            currency: self.config.currency.clone(),
            payment_id: payment_id.to_string(),
            transaction_id,
            status: OrderStatus::Paid,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn record_success(
        &self,
        session: &PendingTransactionSession,
        payment_id: &str,
    ) -> Result<()> {
        let mut audit = match self
            .audits
            .payment_by_conversation(&session.conversation_id)
            .await?
        {
            Some(audit) => audit,
            None => PaymentAuditRecord::pending(
                session.conversation_id.clone(),
                session.order_number.clone(),
                session.buyer.id.clone(),
                session.charge_amount,
                self.config.currency.clone(),
            ),
        };
        audit.succeed(payment_id)?;
        self.audits.save_payment(audit).await
    }

    /// Marks the attempt failed, creating the audit record if initiate never wrote one.
    async fn record_failure(
        &self,
        conversation_id: &str,
        payment_id: &str,
        reason: &str,
    ) -> Result<()> {
        let mut audit = match self.audits.payment_by_conversation(conversation_id).await? {
            Some(audit) => audit,
            None => {
                let session = self.sessions.get_by_primary(conversation_id);
                PaymentAuditRecord::pending(
                    conversation_id,
                    session
                        .as_ref()
                        .map(|s| s.order_number.clone())
                        .unwrap_or_default(),
                    session
                        .as_ref()
                        .map(|s| s.buyer.id.clone())
                        .unwrap_or_default(),
                    session.as_ref().map(|s| s.charge_amount).unwrap_or_default(),
                    self.config.currency.clone(),
                )
            }
        };

        if audit.status != AuditStatus::Pending {
            warn!(
                audit_id = %audit.id,
                status = ?audit.status,
                "ignoring failure for an already settled payment audit"
            );
            return Ok(());
        }
        audit.payment_id = Some(payment_id.to_string());
        audit.fail(reason)?;
        self.audits.save_payment(audit).await
    }
}

fn new_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

/// Unwraps the gateway's own message so it is not prefixed twice.
pub(crate) fn gateway_message(err: PaymentError) -> String {
    match err {
        PaymentError::GatewayError(message) => message,
        other => other.to_string(),
    }
}
