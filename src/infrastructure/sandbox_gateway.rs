use crate::domain::gateway::{
    GatewayStatus, RefundRequest, RefundResponse, RetrievedPayment, ThreeDsInitiation,
    ThreeDsRequest,
};
use crate::domain::money::Money;
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Challenge {
    Pending,
    Approved,
    Declined,
}

#[derive(Debug, Clone)]
struct SandboxPayment {
    payment_id: String,
    conversation_id: String,
    price: Money,
    transaction_ids: Vec<String>,
    challenge: Challenge,
    refunded: Money,
}

#[derive(Default)]
struct SandboxState {
    payments: HashMap<String, SandboxPayment>,
    by_conversation: HashMap<String, String>,
}

/// An in-process stand-in for the card gateway.
///
/// Enforces the basket-consistency check, keeps 3DS payments pending until the
/// challenge is approved or declined, and counts every call so callers can
/// assert that no gateway traffic happened.
#[derive(Default)]
pub struct SandboxGateway {
    state: Mutex<SandboxState>,
    decline_initiate: AtomicBool,
    decline_refunds: AtomicBool,
    unreachable: AtomicBool,
    initiate_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_decline_initiate(&self, decline: bool) {
        self.decline_initiate.store(decline, Ordering::SeqCst);
    }

    pub fn set_decline_refunds(&self, decline: bool) {
        self.decline_refunds.store(decline, Ordering::SeqCst);
    }

    /// Makes every call fail as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn initiate_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.initiate_calls() + self.retrieve_calls() + self.refund_calls()
    }

    /// Simulates the cardholder passing the challenge. Returns the payment id the
    /// gateway will post to the callback.
    pub async fn approve_challenge(&self, conversation_id: &str) -> Option<String> {
        self.resolve_challenge(conversation_id, Challenge::Approved)
            .await
    }

    pub async fn decline_challenge(&self, conversation_id: &str) -> Option<String> {
        self.resolve_challenge(conversation_id, Challenge::Declined)
            .await
    }

    /// Registers an already-settled payment, e.g. one taken before this process started.
    pub async fn register_settled_payment(
        &self,
        payment_id: &str,
        conversation_id: &str,
        price: Money,
        transaction_ids: Vec<String>,
    ) {
        let mut state = self.state.lock().await;
        state
            .by_conversation
            .insert(conversation_id.to_string(), payment_id.to_string());
        state.payments.insert(
            payment_id.to_string(),
            SandboxPayment {
                payment_id: payment_id.to_string(),
                conversation_id: conversation_id.to_string(),
                price,
                transaction_ids,
                challenge: Challenge::Approved,
                refunded: Money::ZERO,
            },
        );
    }

    async fn resolve_challenge(&self, conversation_id: &str, outcome: Challenge) -> Option<String> {
        let mut state = self.state.lock().await;
        let payment_id = state.by_conversation.get(conversation_id)?.clone();
        let payment = state.payments.get_mut(&payment_id)?;
        if payment.challenge == Challenge::Pending {
            payment.challenge = outcome;
        }
        Some(payment_id)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PaymentError::GatewayError(
                "gateway did not respond".to_string(),
            ));
        }
        Ok(())
    }
}

fn short_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &simple[..12])
}

fn challenge_page(request: &ThreeDsRequest) -> String {
    format!(
        "<html><body><form id=\"threeds\" method=\"post\" action=\"{}\">\
         <input type=\"hidden\" name=\"conversationId\" value=\"{}\"/>\
         <input type=\"hidden\" name=\"amount\" value=\"{}\"/>\
         </form></body></html>",
        request.callback_url, request.conversation_id, request.paid_price
    )
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn initiate_three_ds(&self, request: ThreeDsRequest) -> Result<ThreeDsInitiation> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let failure = |message: &str| ThreeDsInitiation {
            status: GatewayStatus::Failure,
            redirect_html: None,
            error_message: Some(message.to_string()),
        };

        if self.decline_initiate.load(Ordering::SeqCst) {
            return Ok(failure("Card declined by issuer"));
        }
        if request.basket.is_empty() {
            return Ok(failure("Basket must contain at least one item"));
        }
        let basket_total: Money = request.basket.iter().map(|item| item.price).sum();
        if basket_total != request.price {
            return Ok(failure("Basket items total does not match price"));
        }

        let payment_id = short_id("pay");
        let transaction_ids = request.basket.iter().map(|_| short_id("txn")).collect();

        let mut state = self.state.lock().await;
        state
            .by_conversation
            .insert(request.conversation_id.clone(), payment_id.clone());
        state.payments.insert(
            payment_id.clone(),
            SandboxPayment {
                payment_id,
                conversation_id: request.conversation_id.clone(),
                price: request.paid_price,
                transaction_ids,
                challenge: Challenge::Pending,
                refunded: Money::ZERO,
            },
        );

        Ok(ThreeDsInitiation {
            status: GatewayStatus::Success,
            redirect_html: Some(challenge_page(&request)),
            error_message: None,
        })
    }

    async fn retrieve_payment(&self, payment_id: &str) -> Result<RetrievedPayment> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let state = self.state.lock().await;
        let failure = |message: &str| RetrievedPayment {
            status: GatewayStatus::Failure,
            payment_id: None,
            conversation_id: None,
            paid_price: None,
            transaction_ids: Vec::new(),
            error_message: Some(message.to_string()),
        };

        let Some(payment) = state.payments.get(payment_id) else {
            return Ok(failure("Payment not found"));
        };
        // A known payment reports its ids whatever the outcome.
        let known_failure = |message: &str| RetrievedPayment {
            payment_id: Some(payment.payment_id.clone()),
            conversation_id: Some(payment.conversation_id.clone()),
            ..failure(message)
        };
        match payment.challenge {
            Challenge::Approved => Ok(RetrievedPayment {
                status: GatewayStatus::Success,
                payment_id: Some(payment.payment_id.clone()),
                conversation_id: Some(payment.conversation_id.clone()),
                paid_price: Some(payment.price),
                transaction_ids: payment.transaction_ids.clone(),
                error_message: None,
            }),
            Challenge::Declined => Ok(known_failure("3DS authentication failed")),
            Challenge::Pending => Ok(known_failure("3DS authentication not completed")),
        }
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let failure = |message: &str| RefundResponse {
            status: GatewayStatus::Failure,
            refund_transaction_id: None,
            error_message: Some(message.to_string()),
        };

        if self.decline_refunds.load(Ordering::SeqCst) {
            return Ok(failure("Refund rejected by acquirer"));
        }

        let mut state = self.state.lock().await;
        let Some(payment) = state
            .payments
            .values_mut()
            .find(|payment| payment.transaction_ids.contains(&request.transaction_id))
        else {
            return Ok(failure("Transaction not found"));
        };
        if payment.refunded + request.amount > payment.price {
            return Ok(failure("Refund amount exceeds the captured amount"));
        }
        payment.refunded += request.amount;

        Ok(RefundResponse {
            status: GatewayStatus::Success,
            refund_transaction_id: Some(short_id("rfd")),
            error_message: None,
        })
    }
}
