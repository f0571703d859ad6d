use crate::domain::audit::{PaymentAuditRecord, RefundAuditRecord};
use crate::domain::catalog::{Cart, Coupon, CouponUsage, Product};
use crate::domain::order::Order;
use crate::domain::ports::{AuditStore, CartStore, CouponStore, OrderStore, ProductStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory product catalog.
#[derive(Default, Clone)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<u64, Product>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn store(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        products.insert(product.id, product);
        Ok(())
    }

    async fn get(&self, product_id: u64) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.get(&product_id).cloned())
    }

    async fn decrement_stock(&self, product_id: u64, metres: Decimal) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&product_id).ok_or_else(|| {
            PaymentError::StorageError(format!("product {} not found", product_id))
        })?;
        if product.stock < metres {
            return Err(PaymentError::StorageError(format!(
                "product {} has {} m left, cannot take {} m",
                product_id, product.stock, metres
            )));
        }
        product.stock -= metres;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn store(&self, cart: Cart) -> Result<()> {
        let mut carts = self.carts.write().await;
        carts.insert(cart.id.clone(), cart);
        Ok(())
    }

    async fn get(&self, cart_id: &str) -> Result<Option<Cart>> {
        let carts = self.carts.read().await;
        Ok(carts.get(cart_id).cloned())
    }

    async fn clear(&self, cart_id: &str) -> Result<()> {
        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| PaymentError::StorageError(format!("cart {} not found", cart_id)))?;
        cart.clear();
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<String, Coupon>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn store(&self, coupon: Coupon) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(code).cloned())
    }

    async fn mark_used(&self, code: &str, usage: CouponUsage) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .get_mut(code)
            .ok_or_else(|| PaymentError::StorageError(format!("coupon {} not found", code)))?;
        coupon.usage = Some(usage);
        Ok(())
    }
}

#[derive(Default)]
struct OrderTables {
    orders: HashMap<String, Order>,
    by_transaction: HashMap<String, String>,
    by_payment: HashMap<String, String>,
}

/// In-memory order store.
///
/// The order and both lookup indices sit behind one lock, so a create is
/// all-or-nothing for concurrent readers.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.order_number) {
            return Err(PaymentError::StorageError(format!(
                "order {} already exists",
                order.order_number
            )));
        }
        tables
            .by_transaction
            .insert(order.transaction_id.clone(), order.order_number.clone());
        tables
            .by_payment
            .insert(order.payment_id.clone(), order.order_number.clone());
        tables.orders.insert(order.order_number.clone(), order);
        Ok(())
    }

    async fn by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_number).cloned())
    }

    async fn by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_transaction
            .get(transaction_id)
            .and_then(|number| tables.orders.get(number))
            .cloned())
    }

    async fn by_payment_id(&self, payment_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_payment
            .get(payment_id)
            .and_then(|number| tables.orders.get(number))
            .cloned())
    }

    async fn update_if_version(&self, order: Order, expected_version: u64) -> Result<()> {
        let mut tables = self.tables.write().await;
        let current = tables.orders.get(&order.order_number).ok_or_else(|| {
            PaymentError::StorageError(format!("order {} not found", order.order_number))
        })?;
        if current.version != expected_version {
            return Err(PaymentError::ValidationError(format!(
                "order {} was modified concurrently (version {} != {})",
                order.order_number, current.version, expected_version
            )));
        }
        tables.orders.insert(order.order_number.clone(), order);
        Ok(())
    }
}

#[derive(Default)]
struct AuditTables {
    payments: HashMap<Uuid, PaymentAuditRecord>,
    refunds: Vec<RefundAuditRecord>,
}

/// Append-only in-memory audit log.
#[derive(Default, Clone)]
pub struct InMemoryAuditStore {
    tables: Arc<RwLock<AuditTables>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payment audit record, oldest first.
    pub async fn payments(&self) -> Vec<PaymentAuditRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables.payments.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    pub async fn refunds(&self) -> Vec<RefundAuditRecord> {
        self.tables.read().await.refunds.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn save_payment(&self, record: PaymentAuditRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.payments.insert(record.id, record);
        Ok(())
    }

    async fn payment_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<PaymentAuditRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|record| record.conversation_id == conversation_id)
            .cloned())
    }

    async fn payment_by_payment_id(&self, payment_id: &str) -> Result<Option<PaymentAuditRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|record| record.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn payment_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<PaymentAuditRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|record| record.order_number == order_number)
            .max_by_key(|record| record.updated_at)
            .cloned())
    }

    async fn save_refund(&self, record: RefundAuditRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.refunds.push(record);
        Ok(())
    }

    async fn refunds_for(&self, payment_audit_id: Uuid) -> Result<Vec<RefundAuditRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refunds
            .iter()
            .filter(|record| record.payment_audit_id == payment_audit_id)
            .cloned()
            .collect())
    }
}
