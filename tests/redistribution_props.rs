//! Property tests for coupon redistribution: whatever the basket and discount,
//! the per-line charges must add up to the charged amount to the cent.

use pleatpay::application::coupon::CouponReconciler;
use pleatpay::application::pricing::PricedBasket;
use pleatpay::domain::catalog::ValidatedLineItem;
use pleatpay::domain::money::Money;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn cents_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..5_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn basket_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(cents_strategy(), 1..12)
}

fn basket(prices: &[Decimal]) -> PricedBasket {
    let items: Vec<ValidatedLineItem> = prices
        .iter()
        .enumerate()
        .map(|(index, price)| ValidatedLineItem {
            product_id: index as u64 + 1,
            name: format!("fabric {}", index),
            width: Decimal::ONE,
            height: Decimal::ONE,
            pleat_pattern: "1x1".to_string(),
            quantity: 1,
            server_price: Money::new(*price),
            stock_required: Decimal::ONE,
            charge: Money::new(*price),
        })
        .collect();
    PricedBasket {
        subtotal: items.iter().map(|item| item.server_price).sum(),
        items,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn line_charges_sum_to_charge_amount(prices in basket_strategy(), discount in cents_strategy()) {
        let reconciled = CouponReconciler::reconcile(basket(&prices), Money::new(discount));
        prop_assert_eq!(reconciled.line_charge_total(), reconciled.charge_amount);
    }

    #[test]
    fn line_charges_are_never_negative(prices in basket_strategy(), discount in cents_strategy()) {
        let reconciled = CouponReconciler::reconcile(basket(&prices), Money::new(discount));
        for item in &reconciled.items {
            prop_assert!(item.charge.value() >= Decimal::ZERO, "negative line charge {}", item.charge);
        }
    }

    #[test]
    fn charge_amount_is_subtotal_minus_discount(prices in basket_strategy(), discount in cents_strategy()) {
        let priced = basket(&prices);
        let subtotal = priced.subtotal;
        let reconciled = CouponReconciler::reconcile(priced, Money::new(discount));
        prop_assert_eq!(reconciled.charge_amount, subtotal.saturating_sub(Money::new(discount)));
        prop_assert!(reconciled.items.iter().all(|item| item.charge.value().scale() <= 2));
    }
}
