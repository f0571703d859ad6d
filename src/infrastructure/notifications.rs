use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::Notifier;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderConfirmation {
        order_number: String,
        email: String,
        amount: Money,
    },
    AdminAlert {
        order_number: String,
        status: OrderStatus,
        amount: Money,
    },
}

/// Enqueues notifications on an unbounded channel and returns immediately.
///
/// Delivery happens on whatever task drains the receiver; the caller never waits
/// for it and only learns about failures to enqueue.
#[derive(Clone)]
pub struct QueuedNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl QueuedNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn enqueue(&self, notification: Notification) -> Result<()> {
        self.sender
            .send(notification)
            .map_err(|_| PaymentError::NotificationError("notification queue is closed".to_string()))
    }
}

#[async_trait]
impl Notifier for QueuedNotifier {
    async fn queue_order_confirmation(&self, order: &Order) -> Result<()> {
        self.enqueue(Notification::OrderConfirmation {
            order_number: order.order_number.clone(),
            email: order.buyer.email.clone(),
            amount: order.charged_amount,
        })
    }

    async fn notify_admins(&self, order: &Order, status: OrderStatus) -> Result<()> {
        self.enqueue(Notification::AdminAlert {
            order_number: order.order_number.clone(),
            status,
            amount: order.charged_amount,
        })
    }
}

/// Drains the queue, logging each message in place of an SMTP/push transport.
pub fn spawn_log_delivery(mut receiver: mpsc::UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = receiver.recv().await {
            match &notification {
                Notification::OrderConfirmation {
                    order_number,
                    email,
                    amount,
                } => info!(%order_number, %email, %amount, "order confirmation delivered"),
                Notification::AdminAlert {
                    order_number,
                    status,
                    amount,
                } => info!(%order_number, ?status, %amount, "admin alert delivered"),
            }
        }
    })
}
