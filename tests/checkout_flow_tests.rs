mod common;

use common::*;
use pleatpay::application::checkout::{CompletionOutcome, PaymentState};
use pleatpay::application::post_commit::PostCommitAction;
use pleatpay::config::PaymentConfig;
use pleatpay::domain::audit::AuditStatus;
use pleatpay::domain::money::Money;
use pleatpay::domain::order::OrderStatus;
use pleatpay::domain::ports::{CartStore, CouponStore, OrderStore, ProductStore};
use pleatpay::error::PaymentError;
use pleatpay::infrastructure::notifications::Notification;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_coupon_checkout_end_to_end() {
    let mut harness = Harness::new().await;
    harness.add_cart_with_coupon("cart-1", "SPRING", dec!(50)).await;

    let mut checkout = request(Vec::new(), dec!(250));
    checkout.cart_id = Some("cart-1".to_string());
    checkout.coupon_code = Some("SPRING".to_string());

    let (challenge, payment_id, order) = harness.checkout(checkout).await;
    assert_eq!(challenge.charge_amount, Money::new(dec!(200)));
    assert!(challenge.redirect_html.contains(&challenge.conversation_id));

    assert_eq!(order.subtotal, Money::new(dec!(250)));
    assert_eq!(order.discount, Money::new(dec!(50)));
    assert_eq!(order.charged_amount, Money::new(dec!(200)));
    assert_eq!(order.items[0].charged, Money::new(dec!(120)));
    assert_eq!(order.items[1].charged, Money::new(dec!(80)));
    assert_eq!(order.payment_id, payment_id);
    assert_eq!(order.status, OrderStatus::Paid);

    let audits = harness.audits.payments().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Success);
    assert_eq!(audits[0].payment_id.as_deref(), Some(payment_id.as_str()));

    // Post-commit effects.
    let sheer = harness.products.get(SHEER).await.unwrap().unwrap();
    assert_eq!(sheer.stock, dec!(97));
    let coupon = harness.coupons.get("SPRING").await.unwrap().unwrap();
    assert_eq!(
        coupon.usage.map(|usage| usage.order_number),
        Some(order.order_number.clone())
    );
    let cart = harness.carts.get("cart-1").await.unwrap().unwrap();
    assert!(cart.items.is_empty());
    assert!(harness.sessions.is_empty());

    let outbox = harness.outbox.as_mut().unwrap();
    assert!(matches!(
        outbox.recv().await,
        Some(Notification::OrderConfirmation { .. })
    ));
    assert!(matches!(
        outbox.recv().await,
        Some(Notification::AdminAlert {
            status: OrderStatus::Paid,
            ..
        })
    ));
}

#[tokio::test]
async fn test_replayed_callback_is_idempotent() {
    let harness = Harness::new().await;
    let (challenge, payment_id, order) = harness.checkout(linen_request(dec!(100))).await;

    let replay = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await
        .unwrap();
    assert_eq!(replay.state(), PaymentState::Completed);
    match replay {
        CompletionOutcome::AlreadyCompleted { order: existing } => {
            assert_eq!(existing.order_number, order.order_number);
        }
        other => panic!("expected AlreadyCompleted, got {:?}", other),
    }

    // Stock was only taken once.
    let linen = harness.products.get(LINEN).await.unwrap().unwrap();
    assert_eq!(linen.stock, dec!(2));
    assert_eq!(harness.audits.payments().await.len(), 1);
}

#[tokio::test]
async fn test_declined_challenge_fails_without_order() {
    let harness = Harness::new().await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let payment_id = harness
        .gateway
        .decline_challenge(&challenge.conversation_id)
        .await
        .unwrap();

    let outcome = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Failed);
    assert!(outcome.order().is_none());

    let audits = harness.audits.payments().await;
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(
        audits[0].error_message.as_deref(),
        Some("3DS authentication failed")
    );
    assert!(
        harness
            .orders
            .by_order_number(&challenge.order_number)
            .await
            .unwrap()
            .is_none()
    );
    // Left for expiry to reclaim.
    assert_eq!(harness.sessions.len(), 1);
}

#[tokio::test]
async fn test_unattributable_failure_keeps_live_session() {
    let harness = Harness::new().await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();

    let outcome = harness
        .payments
        .complete("pay-bogus", &challenge.conversation_id)
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Failed);
    assert_eq!(harness.sessions.len(), 1);
    assert_eq!(
        harness.audits.payments().await[0].status,
        AuditStatus::Pending
    );

    // The genuine callback still completes the order.
    let payment_id = harness
        .gateway
        .approve_challenge(&challenge.conversation_id)
        .await
        .unwrap();
    let outcome = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Completed);
    assert!(
        harness
            .orders
            .by_order_number(&challenge.order_number)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(
        harness.audits.payments().await[0].status,
        AuditStatus::Success
    );
}

#[tokio::test]
async fn test_failure_for_another_conversation_changes_nothing() {
    let harness = Harness::new().await;
    let victim = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let other = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let declined = harness
        .gateway
        .decline_challenge(&other.conversation_id)
        .await
        .unwrap();

    let outcome = harness
        .payments
        .complete(&declined, &victim.conversation_id)
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Failed);
    assert_eq!(harness.sessions.len(), 2);
    assert!(
        harness
            .audits
            .payments()
            .await
            .iter()
            .all(|audit| audit.status == AuditStatus::Pending)
    );
}

#[tokio::test]
async fn test_price_within_tolerance_is_accepted() {
    let harness = Harness::new().await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(99.99)))
        .await
        .unwrap();
    // The server price is charged, not the client's.
    assert_eq!(challenge.charge_amount, Money::new(dec!(100)));
    assert_eq!(challenge.state(), PaymentState::ThreeDsPending);
}

#[tokio::test]
async fn test_price_outside_tolerance_never_reaches_gateway() {
    let harness = Harness::new().await;
    let result = harness.payments.initiate(linen_request(dec!(99.98))).await;

    match result {
        Err(PaymentError::ValidationError(message)) => {
            assert!(message.contains("Natural Linen"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(harness.gateway.total_calls(), 0);
    assert!(harness.audits.payments().await.is_empty());
}

#[tokio::test]
async fn test_extreme_line_values_do_not_abort_checkout() {
    let harness = Harness::new().await;

    let mut hostile_pattern = linen_request(dec!(100));
    hostile_pattern.items[0].pleat_pattern =
        "0.0000000000000000000000000001x79228162514264337593543950335".to_string();
    let challenge = harness.payments.initiate(hostile_pattern).await.unwrap();
    assert_eq!(challenge.charge_amount, Money::new(dec!(100)));

    let mut huge_width = linen_request(dec!(100));
    huge_width.items[0].width = rust_decimal::Decimal::MAX;
    huge_width.items[0].quantity = u32::MAX;
    let result = harness.payments.initiate(huge_width).await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}

#[tokio::test]
async fn test_stock_is_checked_across_lines() {
    let harness = Harness::new().await;
    let items = vec![
        line(LINEN, "Natural Linen", dec!(2), "1", dec!(200)),
        line(LINEN, "Natural Linen", dec!(2), "1", dec!(200)),
    ];
    let result = harness.payments.initiate(request(items, dec!(400))).await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
    assert_eq!(harness.gateway.total_calls(), 0);
}

#[tokio::test]
async fn test_renamed_product_is_rejected() {
    let harness = Harness::new().await;
    let items = vec![line(LINEN, " natural linen ", dec!(1), "1", dec!(100))];
    assert!(
        harness
            .payments
            .initiate(request(items, dec!(100)))
            .await
            .is_ok()
    );

    let items = vec![line(LINEN, "Old Linen", dec!(1), "1", dec!(100))];
    let result = harness.payments.initiate(request(items, dec!(100))).await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}

#[tokio::test]
async fn test_charge_below_minimum_is_rejected() {
    let harness = Harness::new().await;
    harness
        .add_cart_with_coupon("cart-1", "ALMOST", dec!(249.50))
        .await;
    let mut checkout = request(Vec::new(), dec!(250));
    checkout.cart_id = Some("cart-1".to_string());

    let result = harness.payments.initiate(checkout).await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
    assert_eq!(harness.gateway.total_calls(), 0);
}

#[tokio::test]
async fn test_initiate_decline_marks_audit_failed() {
    let harness = Harness::new().await;
    harness.gateway.set_decline_initiate(true);

    let result = harness.payments.initiate(linen_request(dec!(100))).await;
    assert!(matches!(result, Err(PaymentError::GatewayError(_))));

    let audits = harness.audits.payments().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn test_notification_failures_do_not_undo_order() {
    let harness = Harness::with_notifier(Arc::new(BrokenNotifier)).await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let payment_id = harness
        .gateway
        .approve_challenge(&challenge.conversation_id)
        .await
        .unwrap();

    let outcome = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await
        .unwrap();
    let CompletionOutcome::Completed { order, warnings } = outcome else {
        panic!("expected a completed order");
    };
    let failed: Vec<_> = warnings.iter().map(|warning| warning.action).collect();
    assert_eq!(
        failed,
        vec![
            PostCommitAction::QueueConfirmationEmail,
            PostCommitAction::NotifyAdmins
        ]
    );

    assert!(
        harness
            .orders
            .by_order_number(&order.order_number)
            .await
            .unwrap()
            .is_some()
    );
    let linen = harness.products.get(LINEN).await.unwrap().unwrap();
    assert_eq!(linen.stock, dec!(2));
}

#[tokio::test]
async fn test_unreachable_gateway_keeps_session_for_retry() {
    let harness = Harness::new().await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let payment_id = harness
        .gateway
        .approve_challenge(&challenge.conversation_id)
        .await
        .unwrap();

    harness.gateway.set_unreachable(true);
    let result = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await;
    assert!(matches!(result, Err(PaymentError::GatewayError(_))));
    assert_eq!(harness.sessions.len(), 1);
    assert_eq!(
        harness.audits.payments().await[0].status,
        AuditStatus::Pending
    );

    harness.gateway.set_unreachable(false);
    let outcome = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Completed);
}

#[tokio::test]
async fn test_unknown_session_is_rejected() {
    let harness = Harness::new().await;
    harness
        .gateway
        .register_settled_payment(
            "pay-orphan",
            "conv-orphan",
            Money::new(dec!(100)),
            vec!["txn-orphan".to_string()],
        )
        .await;

    let result = harness.payments.complete("pay-orphan", "conv-orphan").await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
    assert!(harness.orders.by_payment_id("pay-orphan").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mismatched_conversation_is_not_completed() {
    let harness = Harness::new().await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();
    let payment_id = harness
        .gateway
        .approve_challenge(&challenge.conversation_id)
        .await
        .unwrap();

    let outcome = harness
        .payments
        .complete(&payment_id, "someone-elses-conversation")
        .await
        .unwrap();
    assert_eq!(outcome.state(), PaymentState::Failed);
    assert_eq!(harness.sessions.len(), 1);
}

#[tokio::test]
async fn test_expired_sessions_are_swept() {
    let harness = Harness::with_config(short_ttl_config()).await;
    let challenge = harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(harness.payments.sweep_expired_sessions().await.unwrap(), 1);
    assert!(harness.sessions.is_empty());

    let audits = harness.audits.payments().await;
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(
        audits[0].error_message.as_deref(),
        Some("payment session expired")
    );

    // A late callback finds nothing to complete.
    let payment_id = harness
        .gateway
        .approve_challenge(&challenge.conversation_id)
        .await
        .unwrap();
    let result = harness
        .payments
        .complete(&payment_id, &challenge.conversation_id)
        .await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}

#[tokio::test]
async fn test_background_sweeper_evicts_expired_sessions() {
    let config = PaymentConfig {
        sweep_interval: Duration::from_millis(20),
        ..short_ttl_config()
    };
    let harness = Harness::with_config(config).await;
    harness
        .payments
        .initiate(linen_request(dec!(100)))
        .await
        .unwrap();

    let sweeper = harness.payments.clone().spawn_sweeper();
    tokio::time::sleep(Duration::from_millis(200)).await;
    sweeper.abort();

    assert!(harness.sessions.is_empty());
    assert_eq!(
        harness.audits.payments().await[0].status,
        AuditStatus::Failed
    );
}

#[tokio::test]
async fn test_used_coupon_is_rejected() {
    let harness = Harness::new().await;
    harness.add_cart_with_coupon("cart-1", "SPRING", dec!(50)).await;
    let mut checkout = request(Vec::new(), dec!(250));
    checkout.cart_id = Some("cart-1".to_string());
    harness.checkout(checkout).await;

    // The cart was cleared; put the coupon back on a fresh one.
    let mut cart = harness.carts.get("cart-1").await.unwrap().unwrap();
    cart.items = two_line_basket();
    cart.coupon_code = Some("SPRING".to_string());
    harness.carts.store(cart).await.unwrap();

    let mut again = request(Vec::new(), dec!(250));
    again.cart_id = Some("cart-1".to_string());
    let result = harness.payments.initiate(again).await;
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}
