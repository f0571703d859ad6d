use super::pricing::PricedBasket;
use crate::domain::catalog::{Cart, ValidatedLineItem};
use crate::domain::money::Money;
use crate::domain::ports::CouponStoreRef;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// A coupon taken from the buyer's cart.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Money,
}

/// The amount to charge and the per-line charges that add up to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub subtotal: Money,
    pub discount: Money,
    pub charge_amount: Money,
    pub items: Vec<ValidatedLineItem>,
}

impl Reconciliation {
    pub fn line_charge_total(&self) -> Money {
        self.items.iter().map(|item| item.charge).sum()
    }
}

/// Resolves the cart's coupon and spreads its discount over the basket.
pub struct CouponReconciler {
    coupons: CouponStoreRef,
}

impl CouponReconciler {
    pub fn new(coupons: CouponStoreRef) -> Self {
        Self { coupons }
    }

    /// Looks up the coupon attached to the cart.
    ///
    /// The code the client submitted is only compared with the cart's and a
    /// mismatch is logged; the cart is what counts.
    pub async fn resolve(
        &self,
        cart: Option<&Cart>,
        client_code: Option<&str>,
    ) -> Result<Option<AppliedCoupon>> {
        let cart_code = cart.and_then(|cart| cart.coupon_code.as_deref());
        let client_code = client_code.map(str::trim).filter(|code| !code.is_empty());

        if client_code != cart_code {
            warn!(
                cart_coupon = ?cart_code,
                client_coupon = ?client_code,
                "client coupon differs from cart coupon, using cart"
            );
        }

        let Some(code) = cart_code else {
            return Ok(None);
        };
        let coupon = self.coupons.get(code).await?.ok_or_else(|| {
            PaymentError::ValidationError(format!("coupon {} does not exist", code))
        })?;
        if !coupon.is_redeemable() {
            return Err(PaymentError::ValidationError(format!(
                "coupon {} is no longer valid",
                code
            )));
        }

        Ok(Some(AppliedCoupon {
            code: coupon.code,
            discount: coupon.discount,
        }))
    }

    /// Applies `discount` to the basket.
    ///
    /// Each line is charged its proportional share of the discounted total, rounded
    /// to the minor unit; the rounding remainder goes to the last line so the
    /// charges always sum to exactly `charge_amount`.
    pub fn reconcile(basket: PricedBasket, discount: Money) -> Reconciliation {
        let PricedBasket { subtotal, mut items } = basket;
        let charge_amount = subtotal.saturating_sub(discount);

        if !discount.is_positive() || !subtotal.is_positive() {
            for item in items.iter_mut() {
                item.charge = item.server_price;
            }
            return Reconciliation {
                subtotal,
                discount: Money::ZERO,
                charge_amount: subtotal,
                items,
            };
        }

        let ratio = charge_amount.value() / subtotal.value();
        let mut running = Money::ZERO;
        for item in items.iter_mut() {
            item.charge = Money::rounded(item.server_price * ratio);
            running += item.charge;
        }

        let remainder = charge_amount - running;
        if remainder != Money::ZERO {
            apply_remainder(&mut items, remainder);
        }
        debug!(%subtotal, %discount, %charge_amount, "discount redistributed");

        Reconciliation {
            subtotal,
            discount,
            charge_amount,
            items,
        }
    }
}

/// Adds the rounding remainder to the last line. When the remainder is negative
/// and larger than the last line's charge, the rest is taken from the largest
/// lines in turn so no line goes below zero.
fn apply_remainder(items: &mut [ValidatedLineItem], remainder: Money) {
    let Some(last) = items.len().checked_sub(1) else {
        return;
    };
    if remainder.value() >= Decimal::ZERO {
        items[last].charge += remainder;
        return;
    }

    let mut donors: Vec<usize> = (0..last).collect();
    donors.sort_by(|a, b| items[*b].charge.cmp(&items[*a].charge));
    donors.insert(0, last);

    let mut owed = Money::ZERO - remainder;
    for index in donors {
        let taken = owed.min(items[index].charge);
        items[index].charge -= taken;
        owed -= taken;
        if owed == Money::ZERO {
            break;
        }
    }
}
