use super::money::Money;
use super::session::RefundContext;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
}

/// Append-only trace of one payment attempt at the gateway.
///
/// Status only ever moves out of `Pending`; once `Success` or `Failed` the record
/// is final, whatever happens to the order afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAuditRecord {
    pub id: Uuid,
    pub conversation_id: String,
    pub order_number: String,
    pub payment_id: Option<String>,
    pub buyer_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    /// Set when the record was reconstructed after the fact rather than written at initiate time.
    pub synthetic: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAuditRecord {
    pub fn pending(
        conversation_id: impl Into<String>,
        order_number: impl Into<String>,
        buyer_id: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            order_number: order_number.into(),
            payment_id: None,
            buyer_id: buyer_id.into(),
            amount,
            currency: currency.into(),
            status: AuditStatus::Pending,
            error_message: None,
            synthetic: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds a completed record for a payment that has no audit trail of its own,
    /// so a refund against it still has something to link to.
    pub fn synthetic(context: &RefundContext) -> Self {
        let mut record = Self::pending(
            format!("synthetic-{}", Uuid::new_v4()),
            context.order_number.clone(),
            context.buyer.id.clone(),
            context.charged_amount,
            context.currency.clone(),
        );
        record.payment_id = Some(context.payment_id.clone());
        record.status = AuditStatus::Success;
        record.synthetic = true;
        record
    }

    pub fn succeed(&mut self, payment_id: impl Into<String>) -> Result<(), PaymentError> {
        self.transition(AuditStatus::Success)?;
        self.payment_id = Some(payment_id.into());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PaymentError> {
        self.transition(AuditStatus::Failed)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: AuditStatus) -> Result<(), PaymentError> {
        if self.status != AuditStatus::Pending || next == AuditStatus::Pending {
            return Err(PaymentError::ValidationError(format!(
                "payment audit {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundStatus {
    Success,
    Failed,
}

/// Trace of one refund attempt, linked to the payment it reverses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundAuditRecord {
    pub id: Uuid,
    pub payment_audit_id: Uuid,
    pub order_number: String,
    pub payment_id: String,
    pub transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: RefundStatus,
    pub refund_transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
