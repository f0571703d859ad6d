use crate::domain::audit::{PaymentAuditRecord, RefundAuditRecord};
use crate::domain::order::Order;
use crate::domain::ports::{AuditStore, OrderStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Orders keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// `transaction:<id>` and `payment:<id>` keys pointing at an order number.
pub const CF_ORDER_INDEX: &str = "order_index";
/// Payment audit records keyed by record id.
pub const CF_PAYMENT_AUDITS: &str = "payment_audits";
/// `conversation:`, `payment:` and `order:` keys pointing at a payment audit id.
pub const CF_PAYMENT_AUDIT_INDEX: &str = "payment_audit_index";
/// Refund audit records keyed by `<payment audit id>/<refund id>`.
pub const CF_REFUND_AUDITS: &str = "refund_audits";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_ORDERS,
    CF_ORDER_INDEX,
    CF_PAYMENT_AUDITS,
    CF_PAYMENT_AUDIT_INDEX,
    CF_REFUND_AUDITS,
];

/// Durable order and audit storage on RocksDB.
///
/// An order and its index entries are written in one `WriteBatch`. Writers
/// that read before writing (duplicate check, version check) are serialized
/// through `write_lock`.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates the database at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::StorageError(format!("column family {} not found", name)))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_string(&self, cf_name: &str, key: &str) -> Result<Option<String>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| PaymentError::StorageError(format!("corrupt index entry: {}", e))),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn order_via_index(&self, index_key: &str) -> Result<Option<Order>> {
        match self.get_string(CF_ORDER_INDEX, index_key)? {
            Some(order_number) => self.get_json(CF_ORDERS, order_number.as_bytes()),
            None => Ok(None),
        }
    }

    fn payment_via_index(&self, index_key: &str) -> Result<Option<PaymentAuditRecord>> {
        match self.get_string(CF_PAYMENT_AUDIT_INDEX, index_key)? {
            Some(audit_id) => self.get_json(CF_PAYMENT_AUDITS, audit_id.as_bytes()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn create(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let orders = self.cf(CF_ORDERS)?;
        if self
            .db
            .get_pinned_cf(orders, order.order_number.as_bytes())?
            .is_some()
        {
            return Err(PaymentError::StorageError(format!(
                "order {} already exists",
                order.order_number
            )));
        }

        let index = self.cf(CF_ORDER_INDEX)?;
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.order_number.as_bytes(), &order)?;
        batch.put_cf(
            index,
            format!("transaction:{}", order.transaction_id),
            order.order_number.as_bytes(),
        );
        batch.put_cf(
            index,
            format!("payment:{}", order.payment_id),
            order.order_number.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, order_number.as_bytes())
    }

    async fn by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>> {
        self.order_via_index(&format!("transaction:{}", transaction_id))
    }

    async fn by_payment_id(&self, payment_id: &str) -> Result<Option<Order>> {
        self.order_via_index(&format!("payment:{}", payment_id))
    }

    async fn update_if_version(&self, order: Order, expected_version: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current: Order = self
            .get_json(CF_ORDERS, order.order_number.as_bytes())?
            .ok_or_else(|| {
                PaymentError::StorageError(format!("order {} not found", order.order_number))
            })?;
        if current.version != expected_version {
            return Err(PaymentError::ValidationError(format!(
                "order {} was modified concurrently (version {} != {})",
                order.order_number, current.version, expected_version
            )));
        }
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.order_number.as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for RocksDBStore {
    async fn save_payment(&self, record: PaymentAuditRecord) -> Result<()> {
        let index = self.cf(CF_PAYMENT_AUDIT_INDEX)?;
        let id = record.id.to_string();
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PAYMENT_AUDITS, id.as_bytes(), &record)?;
        batch.put_cf(
            index,
            format!("conversation:{}", record.conversation_id),
            id.as_bytes(),
        );
        batch.put_cf(index, format!("order:{}", record.order_number), id.as_bytes());
        if let Some(payment_id) = record.payment_id.as_deref() {
            batch.put_cf(index, format!("payment:{}", payment_id), id.as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn payment_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<PaymentAuditRecord>> {
        self.payment_via_index(&format!("conversation:{}", conversation_id))
    }

    async fn payment_by_payment_id(&self, payment_id: &str) -> Result<Option<PaymentAuditRecord>> {
        self.payment_via_index(&format!("payment:{}", payment_id))
    }

    async fn payment_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<PaymentAuditRecord>> {
        self.payment_via_index(&format!("order:{}", order_number))
    }

    async fn save_refund(&self, record: RefundAuditRecord) -> Result<()> {
        let key = format!("{}/{}", record.payment_audit_id, record.id);
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_REFUND_AUDITS, key.as_bytes(), &record)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn refunds_for(&self, payment_audit_id: Uuid) -> Result<Vec<RefundAuditRecord>> {
        let cf = self.cf(CF_REFUND_AUDITS)?;
        let prefix = format!("{}/", payment_audit_id);
        let mut records = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            records.push(serde_json::from_slice::<RefundAuditRecord>(&value)?);
        }
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
