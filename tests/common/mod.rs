#![allow(dead_code)]

use pleatpay::application::Dependencies;
use pleatpay::application::checkout::{CheckoutRequest, PaymentOrchestrator, ThreeDsChallenge};
use pleatpay::application::refund::RefundOrchestrator;
use pleatpay::config::PaymentConfig;
use pleatpay::domain::catalog::{Cart, Coupon, LineItemRequest, Product};
use pleatpay::domain::money::Money;
use pleatpay::domain::order::{Address, Buyer, Order, OrderStatus};
use pleatpay::domain::ports::{CartStore, CouponStore, Notifier, NotifierRef, ProductStore};
use pleatpay::domain::session::{PendingTransactionSession, RefundContext};
use pleatpay::error::{PaymentError, Result};
use pleatpay::infrastructure::in_memory::{
    InMemoryAuditStore, InMemoryCartStore, InMemoryCouponStore, InMemoryOrderStore,
    InMemoryProductStore,
};
use pleatpay::infrastructure::notifications::{Notification, QueuedNotifier};
use pleatpay::infrastructure::sandbox_gateway::SandboxGateway;
use pleatpay::infrastructure::session_store::SessionStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const SHEER: u64 = 1;
pub const VELVET: u64 = 2;
pub const LINEN: u64 = 3;

/// Every adapter in memory, wired to both orchestrators.
pub struct Harness {
    pub config: PaymentConfig,
    pub products: Arc<InMemoryProductStore>,
    pub carts: Arc<InMemoryCartStore>,
    pub coupons: Arc<InMemoryCouponStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub audits: Arc<InMemoryAuditStore>,
    pub gateway: Arc<SandboxGateway>,
    pub sessions: Arc<SessionStore<PendingTransactionSession>>,
    pub refund_contexts: Arc<SessionStore<RefundContext>>,
    pub payments: Arc<PaymentOrchestrator>,
    pub refunds: Arc<RefundOrchestrator>,
    pub outbox: Option<UnboundedReceiver<Notification>>,
}

impl Harness {
    pub async fn new() -> Self {
        let (notifier, outbox) = QueuedNotifier::channel();
        let mut harness = Self::build(PaymentConfig::default(), Arc::new(notifier)).await;
        harness.outbox = Some(outbox);
        harness
    }

    pub async fn with_notifier(notifier: NotifierRef) -> Self {
        Self::build(PaymentConfig::default(), notifier).await
    }

    pub async fn with_config(config: PaymentConfig) -> Self {
        let (notifier, outbox) = QueuedNotifier::channel();
        let mut harness = Self::build(config, Arc::new(notifier)).await;
        harness.outbox = Some(outbox);
        harness
    }

    async fn build(config: PaymentConfig, notifier: NotifierRef) -> Self {
        let products = Arc::new(InMemoryProductStore::new());
        let carts = Arc::new(InMemoryCartStore::new());
        let coupons = Arc::new(InMemoryCouponStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let audits = Arc::new(InMemoryAuditStore::new());
        let gateway = Arc::new(SandboxGateway::new());

        let deps = Dependencies {
            products: products.clone(),
            carts: carts.clone(),
            coupons: coupons.clone(),
            orders: orders.clone(),
            audits: audits.clone(),
            notifier,
            gateway: gateway.clone(),
        };
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        let refund_contexts = Arc::new(SessionStore::new(config.refund_context_ttl));
        let payments = Arc::new(PaymentOrchestrator::new(
            config.clone(),
            deps.clone(),
            sessions.clone(),
            refund_contexts.clone(),
        ));
        let refunds = Arc::new(RefundOrchestrator::new(
            config.clone(),
            deps,
            refund_contexts.clone(),
        ));

        let harness = Self {
            config,
            products,
            carts,
            coupons,
            orders,
            audits,
            gateway,
            sessions,
            refund_contexts,
            payments,
            refunds,
            outbox: None,
        };
        harness.seed_catalog().await;
        harness
    }

    async fn seed_catalog(&self) {
        for (id, name, unit_price, stock) in [
            (SHEER, "Linen Sheer", dec!(50), dec!(100)),
            (VELVET, "Velvet Blackout", dec!(40), dec!(100)),
            (LINEN, "Natural Linen", dec!(100), dec!(3)),
        ] {
            self.products
                .store(Product {
                    id,
                    name: name.to_string(),
                    unit_price: Money::new(unit_price),
                    stock,
                })
                .await
                .unwrap();
        }
    }

    pub async fn add_cart_with_coupon(&self, cart_id: &str, code: &str, discount: Decimal) {
        let mut cart = Cart::new(cart_id, "buyer-1");
        cart.items = two_line_basket();
        cart.coupon_code = Some(code.to_string());
        self.carts.store(cart).await.unwrap();
        self.coupons
            .store(Coupon::new(code, Money::new(discount)))
            .await
            .unwrap();
    }

    /// The harness's adapters, with a notifier that always fails.
    pub fn dependencies(&self) -> Dependencies {
        Dependencies {
            products: self.products.clone(),
            carts: self.carts.clone(),
            coupons: self.coupons.clone(),
            orders: self.orders.clone(),
            audits: self.audits.clone(),
            notifier: Arc::new(BrokenNotifier),
            gateway: self.gateway.clone(),
        }
    }

    /// Runs initiate, approves the challenge and delivers the callback.
    pub async fn checkout(&self, request: CheckoutRequest) -> (ThreeDsChallenge, String, Order) {
        let challenge = self.payments.initiate(request).await.unwrap();
        let payment_id = self
            .gateway
            .approve_challenge(&challenge.conversation_id)
            .await
            .unwrap();
        let outcome = self
            .payments
            .complete(&payment_id, &challenge.conversation_id)
            .await
            .unwrap();
        let order = outcome.order().cloned().unwrap();
        (challenge, payment_id, order)
    }
}

pub fn buyer() -> Buyer {
    Buyer {
        id: "buyer-1".to_string(),
        name: "Ada".to_string(),
        surname: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: Some("+905551112233".to_string()),
        identity_number: Some("11111111111".to_string()),
        ip: Some("127.0.0.1".to_string()),
    }
}

pub fn address() -> Address {
    Address {
        contact_name: "Ada Lovelace".to_string(),
        city: "Istanbul".to_string(),
        country: "Turkey".to_string(),
        line: "Bagdat Cd. 1".to_string(),
        zip_code: Some("34710".to_string()),
    }
}

pub fn line(
    product_id: u64,
    name: &str,
    width: Decimal,
    pattern: &str,
    price: Decimal,
) -> LineItemRequest {
    LineItemRequest {
        product_id,
        name: name.to_string(),
        width,
        height: dec!(2.6),
        pleat_pattern: pattern.to_string(),
        quantity: 1,
        price,
    }
}

/// 150.00 + 100.00 = 250.00.
pub fn two_line_basket() -> Vec<LineItemRequest> {
    vec![
        line(SHEER, "Linen Sheer", dec!(1.5), "1x2", dec!(150)),
        line(VELVET, "Velvet Blackout", dec!(1.25), "1x2", dec!(100)),
    ]
}

pub fn request(items: Vec<LineItemRequest>, declared_subtotal: Decimal) -> CheckoutRequest {
    CheckoutRequest {
        buyer: buyer(),
        shipping_address: address(),
        cart_id: None,
        coupon_code: None,
        items,
        declared_subtotal,
    }
}

/// A single 100.00 line declared at `price`.
pub fn linen_request(price: Decimal) -> CheckoutRequest {
    request(
        vec![line(LINEN, "Natural Linen", dec!(1), "1", price)],
        price,
    )
}

/// A notifier whose every call fails.
pub struct BrokenNotifier;

#[async_trait::async_trait]
impl Notifier for BrokenNotifier {
    async fn queue_order_confirmation(&self, _order: &Order) -> Result<()> {
        Err(PaymentError::NotificationError("smtp relay down".to_string()))
    }

    async fn notify_admins(&self, _order: &Order, _status: OrderStatus) -> Result<()> {
        Err(PaymentError::NotificationError("push service down".to_string()))
    }
}

pub fn short_ttl_config() -> PaymentConfig {
    PaymentConfig {
        session_ttl: Duration::from_millis(50),
        ..PaymentConfig::default()
    }
}
