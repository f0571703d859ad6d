use super::Dependencies;
use super::checkout::gateway_message;
use crate::config::PaymentConfig;
use crate::domain::audit::{PaymentAuditRecord, RefundAuditRecord, RefundStatus};
use crate::domain::gateway::{GatewayStatus, RefundRequest, RetrievedPayment};
use crate::domain::money::{Money, PositiveAmount};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{AuditStoreRef, GatewayRef, NotifierRef, OrderStoreRef};
use crate::domain::session::RefundContext;
use crate::error::{PaymentError, Result};
use crate::infrastructure::session_store::SessionStore;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A payment located for refunding.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundTarget {
    pub context: RefundContext,
    /// The persisted order, when the resolver went through the order store.
    pub order: Option<Order>,
}

/// One strategy for turning an operator-supplied identifier into a refund target.
#[async_trait]
pub trait RefundResolver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, identifier: &str) -> Result<Option<RefundTarget>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKey {
    PaymentId,
    OrderNumber,
}

/// Looks the identifier up among cached refund contexts.
pub struct ContextResolver {
    contexts: Arc<SessionStore<RefundContext>>,
    key: ContextKey,
}

impl ContextResolver {
    pub fn new(contexts: Arc<SessionStore<RefundContext>>, key: ContextKey) -> Self {
        Self { contexts, key }
    }
}

#[async_trait]
impl RefundResolver for ContextResolver {
    fn name(&self) -> &'static str {
        match self.key {
            ContextKey::PaymentId => "context_by_payment_id",
            ContextKey::OrderNumber => "context_by_order_number",
        }
    }

    async fn resolve(&self, identifier: &str) -> Result<Option<RefundTarget>> {
        let context = match self.key {
            ContextKey::PaymentId => self.contexts.get_by_primary(identifier),
            ContextKey::OrderNumber => self.contexts.get_by_secondary(identifier),
        };
        Ok(context.map(|context| RefundTarget {
            context,
            order: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    OrderNumber,
    TransactionId,
    PaymentId,
}

/// Looks the identifier up in the persisted orders and rebuilds the refund context.
pub struct OrderResolver {
    orders: OrderStoreRef,
    key: OrderKey,
}

impl OrderResolver {
    pub fn new(orders: OrderStoreRef, key: OrderKey) -> Self {
        Self { orders, key }
    }
}

#[async_trait]
impl RefundResolver for OrderResolver {
    fn name(&self) -> &'static str {
        match self.key {
            OrderKey::OrderNumber => "order_by_order_number",
            OrderKey::TransactionId => "order_by_transaction_id",
            OrderKey::PaymentId => "order_by_payment_id",
        }
    }

    async fn resolve(&self, identifier: &str) -> Result<Option<RefundTarget>> {
        let order = match self.key {
            OrderKey::OrderNumber => self.orders.by_order_number(identifier).await?,
            OrderKey::TransactionId => self.orders.by_transaction_id(identifier).await?,
            OrderKey::PaymentId => self.orders.by_payment_id(identifier).await?,
        };
        Ok(order.map(|order| RefundTarget {
            context: RefundContext::from(&order),
            order: Some(order),
        }))
    }
}

/// The lookup order used in production: cached contexts first, then the order
/// store by each identifier the gateway may have handed out.
pub fn default_resolvers(
    contexts: Arc<SessionStore<RefundContext>>,
    orders: OrderStoreRef,
) -> Vec<Box<dyn RefundResolver>> {
    vec![
        Box::new(ContextResolver::new(contexts.clone(), ContextKey::PaymentId)),
        Box::new(ContextResolver::new(contexts, ContextKey::OrderNumber)),
        Box::new(OrderResolver::new(orders.clone(), OrderKey::OrderNumber)),
        Box::new(OrderResolver::new(orders.clone(), OrderKey::TransactionId)),
        Box::new(OrderResolver::new(orders, OrderKey::PaymentId)),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundReceipt {
    pub order_number: String,
    pub payment_id: String,
    pub refund_transaction_id: Option<String>,
    pub amount: Money,
    pub resolved_by: String,
}

/// Releases the per-order refund claim when dropped.
struct RefundClaim<'a> {
    in_flight: &'a DashMap<String, ()>,
    order_number: String,
}

impl Drop for RefundClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.order_number);
    }
}

/// Locates a completed payment from whatever identifier the operator has and
/// refunds it at the gateway.
pub struct RefundOrchestrator {
    config: PaymentConfig,
    resolvers: Vec<Box<dyn RefundResolver>>,
    orders: OrderStoreRef,
    audits: AuditStoreRef,
    gateway: GatewayRef,
    notifier: NotifierRef,
    refund_contexts: Arc<SessionStore<RefundContext>>,
    in_flight: DashMap<String, ()>,
}

impl RefundOrchestrator {
    pub fn new(
        config: PaymentConfig,
        deps: Dependencies,
        refund_contexts: Arc<SessionStore<RefundContext>>,
    ) -> Self {
        let resolvers = default_resolvers(refund_contexts.clone(), deps.orders.clone());
        Self::with_resolvers(config, deps, refund_contexts, resolvers)
    }

    pub fn with_resolvers(
        config: PaymentConfig,
        deps: Dependencies,
        refund_contexts: Arc<SessionStore<RefundContext>>,
        resolvers: Vec<Box<dyn RefundResolver>>,
    ) -> Self {
        Self {
            config,
            resolvers,
            orders: deps.orders,
            audits: deps.audits,
            gateway: deps.gateway,
            notifier: deps.notifier,
            refund_contexts,
            in_flight: DashMap::new(),
        }
    }

    /// Tries each resolver in turn; the first hit wins.
    pub async fn locate(&self, identifier: &str) -> Result<(RefundTarget, &'static str)> {
        for resolver in &self.resolvers {
            if let Some(target) = resolver.resolve(identifier).await? {
                debug!(resolver = resolver.name(), "refund target located");
                return Ok((target, resolver.name()));
            }
        }
        Err(PaymentError::ReconciliationError(
            "refund target not found".to_string(),
        ))
    }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn refund(&self, identifier: &str, amount: Decimal) -> Result<RefundReceipt> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(PaymentError::ValidationError(
                "refund identifier is empty".to_string(),
            ));
        }
        let amount = PositiveAmount::new(amount)?.money();

        let (target, resolved_by) = self.locate(identifier).await?;
        let RefundTarget {
            context,
            order: snapshot,
        } = target;

        let _claim = self.claim(&context.order_number)?;
        // The lookup may have raced another refund; only state read under the
        // claim counts.
        let order = self.reload(&context, snapshot.as_ref()).await?;
        if order.is_none()
            && self
                .refund_contexts
                .get_by_primary(&context.payment_id)
                .is_none()
        {
            return Err(PaymentError::ValidationError(format!(
                "payment for order {} is no longer refundable",
                context.order_number
            )));
        }

        let charged = order
            .as_ref()
            .map_or(context.charged_amount, |order| order.charged_amount);
        if amount > charged {
            return Err(PaymentError::ValidationError(format!(
                "refund amount {} exceeds the original charge of {}",
                amount, charged
            )));
        }
        let order = match order {
            Some(order) => Some(self.reserve(order).await?),
            None => None,
        };

        let (payment_id, refund_transaction_id) =
            match self.issue(&context, order.as_ref(), amount).await {
                Ok(issued) => issued,
                Err(err) => {
                    if let Some(order) = order {
                        self.release(order).await;
                    }
                    return Err(err);
                }
            };

        if let Some(mut order) = order {
            let expected_version = order.version;
            order.mark_refunded(amount);
            self.orders
                .update_if_version(order.clone(), expected_version)
                .await
                .inspect_err(|err| {
                    error!(order_number = %order.order_number, error = %err, "refund issued but order was not updated");
                })?;
            if let Err(err) = self
                .notifier
                .notify_admins(&order, OrderStatus::Refunded)
                .await
            {
                warn!(order_number = %order.order_number, error = %err, "refund notification failed");
            }
        } else {
            warn!(order_number = %context.order_number, "refunded payment has no persisted order");
        }

        self.refund_contexts.remove(&context.payment_id);
        self.refund_contexts.remove_by_secondary(&context.order_number);

        info!(
            order_number = %context.order_number,
            %payment_id,
            %amount,
            resolved_by,
            "refund issued"
        );
        Ok(RefundReceipt {
            order_number: context.order_number,
            payment_id,
            refund_transaction_id,
            amount,
            resolved_by: resolved_by.to_string(),
        })
    }

    /// Reads the order again, by order number first and then by the gateway ids of
    /// the copy the resolver saw.
    async fn reload(
        &self,
        context: &RefundContext,
        snapshot: Option<&Order>,
    ) -> Result<Option<Order>> {
        if let Some(order) = self.orders.by_order_number(&context.order_number).await? {
            return Ok(Some(order));
        }
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        if let Some(order) = self
            .orders
            .by_transaction_id(&snapshot.transaction_id)
            .await?
        {
            return Ok(Some(order));
        }
        self.orders.by_payment_id(&snapshot.payment_id).await
    }

    /// Moves the order to `RefundPending` through the version check, so a writer
    /// in another process that read the same order loses before any money moves.
    async fn reserve(&self, mut order: Order) -> Result<Order> {
        if !order.status.is_refundable() {
            let reason = match order.status {
                OrderStatus::RefundPending => "a refund is already in progress",
                _ => "it has already been refunded",
            };
            return Err(PaymentError::ValidationError(format!(
                "order {} cannot be refunded: {}",
                order.order_number, reason
            )));
        }
        let expected_version = order.version;
        order.begin_refund();
        self.orders
            .update_if_version(order.clone(), expected_version)
            .await?;
        Ok(order)
    }

    /// Puts a reserved order back to `Paid` after a refund that did not go through.
    async fn release(&self, mut order: Order) {
        let expected_version = order.version;
        order.abort_refund();
        let order_number = order.order_number.clone();
        if let Err(err) = self.orders.update_if_version(order, expected_version).await {
            error!(%order_number, error = %err, "refund reservation could not be released");
        }
    }

    /// Verifies the payment and refunds it at the gateway, auditing the attempt.
    /// Returns the canonical payment id and the gateway's refund transaction id.
    async fn issue(
        &self,
        context: &RefundContext,
        order: Option<&Order>,
        amount: Money,
    ) -> Result<(String, Option<String>)> {
        let payment_audit = self.payment_audit_for(context).await?;

        let verified = match self.verify(context, order).await {
            Ok(verified) => verified,
            Err(reason) => {
                self.record_attempt(
                    &payment_audit,
                    context,
                    &context.transaction_id,
                    amount,
                    Err(reason.as_str()),
                )
                .await;
                return Err(PaymentError::GatewayError(reason));
            }
        };

        let payment_id = verified
            .payment_id
            .clone()
            .unwrap_or_else(|| context.payment_id.clone());
        let transaction_id = verified
            .transaction_ids
            .first()
            .cloned()
            .unwrap_or_else(|| context.transaction_id.clone());

        let response = self
            .gateway
            .create_refund(RefundRequest {
                conversation_id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                amount,
                currency: context.currency.clone(),
            })
            .await;

        let refund_transaction_id = match response {
            Ok(response) if response.status == GatewayStatus::Success => {
                response.refund_transaction_id
            }
            Ok(response) => {
                let reason = response
                    .error_message
                    .unwrap_or_else(|| "refund was rejected".to_string());
                self.record_attempt(
                    &payment_audit,
                    context,
                    &transaction_id,
                    amount,
                    Err(reason.as_str()),
                )
                .await;
                warn!(order_number = %context.order_number, %reason, "refund rejected");
                return Err(PaymentError::GatewayError(reason));
            }
            Err(err) => {
                let reason = gateway_message(err);
                self.record_attempt(
                    &payment_audit,
                    context,
                    &transaction_id,
                    amount,
                    Err(reason.as_str()),
                )
                .await;
                warn!(order_number = %context.order_number, %reason, "refund call failed");
                return Err(PaymentError::GatewayError(reason));
            }
        };

        self.record_attempt(
            &payment_audit,
            context,
            &transaction_id,
            amount,
            Ok(refund_transaction_id.as_deref()),
        )
        .await;
        Ok((payment_id, refund_transaction_id))
    }

    fn claim(&self, order_number: &str) -> Result<RefundClaim<'_>> {
        match self.in_flight.entry(order_number.to_string()) {
            Entry::Occupied(_) => Err(PaymentError::ValidationError(format!(
                "a refund for order {} is already in progress",
                order_number
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RefundClaim {
                    in_flight: &self.in_flight,
                    order_number: order_number.to_string(),
                })
            }
        }
    }

    /// Confirms the payment with the gateway, falling back to the alternate stored
    /// identifier for records that kept the wrong id in the payment id field.
    async fn verify(
        &self,
        context: &RefundContext,
        order: Option<&Order>,
    ) -> std::result::Result<RetrievedPayment, String> {
        let mut candidates = vec![context.payment_id.clone()];
        for alternate in [
            Some(context.transaction_id.clone()),
            order.map(|order| order.payment_id.clone()),
            order.map(|order| order.transaction_id.clone()),
        ]
        .into_iter()
        .flatten()
        {
            if !candidates.contains(&alternate) {
                candidates.push(alternate);
            }
        }

        let mut last_error = "payment could not be verified".to_string();
        for candidate in candidates {
            match self.gateway.retrieve_payment(&candidate).await {
                Ok(payment) if payment.is_successful() => return Ok(payment),
                Ok(payment) => {
                    last_error = payment
                        .error_message
                        .unwrap_or_else(|| "payment is not in a successful state".to_string());
                }
                Err(err) => last_error = gateway_message(err),
            }
            warn!(%candidate, reason = %last_error, "payment verification failed, trying alternate id");
        }
        Err(last_error)
    }

    async fn payment_audit_for(&self, context: &RefundContext) -> Result<PaymentAuditRecord> {
        if let Some(record) = self.audits.payment_by_payment_id(&context.payment_id).await? {
            return Ok(record);
        }
        if let Some(record) = self
            .audits
            .payment_by_order_number(&context.order_number)
            .await?
        {
            return Ok(record);
        }
        let record = PaymentAuditRecord::synthetic(context);
        info!(order_number = %context.order_number, audit_id = %record.id, "created synthetic payment audit");
        self.audits.save_payment(record.clone()).await?;
        Ok(record)
    }

    /// Writes the refund audit. A failure to write is logged; it must not mask the
    /// gateway outcome.
    async fn record_attempt(
        &self,
        payment_audit: &PaymentAuditRecord,
        context: &RefundContext,
        transaction_id: &str,
        amount: Money,
        outcome: std::result::Result<Option<&str>, &str>,
    ) {
        let (status, refund_transaction_id, error_message) = match outcome {
            Ok(refund_id) => (RefundStatus::Success, refund_id.map(str::to_string), None),
            Err(reason) => (RefundStatus::Failed, None, Some(reason.to_string())),
        };
        let record = RefundAuditRecord {
            id: Uuid::new_v4(),
            payment_audit_id: payment_audit.id,
            order_number: context.order_number.clone(),
            payment_id: context.payment_id.clone(),
            transaction_id: transaction_id.to_string(),
            amount,
            currency: self.config.currency.clone(),
            status,
            refund_transaction_id,
            error_message,
            created_at: Utc::now(),
        };
        if let Err(err) = self.audits.save_refund(record).await {
            error!(order_number = %context.order_number, error = %err, "refund audit could not be written");
        }
    }
}
