use super::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A fabric sold by the metre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    /// Price of one metre of fabric before the pleat multiplier.
    pub unit_price: Money,
    /// Fabric available, in metres.
    pub stock: Decimal,
}

/// Billable-width multiplier derived from a pleat pattern such as `"1x2.5"`.
///
/// The right-hand side is divided by the left-hand side and a bare number is taken
/// as the multiplier itself. Anything unparseable or out of range falls back to `1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PleatPattern(Decimal);

impl PleatPattern {
    pub fn parse(pattern: &str) -> Self {
        Self(parse_multiplier(pattern).unwrap_or(Decimal::ONE))
    }

    pub fn multiplier(&self) -> Decimal {
        self.0
    }
}

fn parse_multiplier(pattern: &str) -> Option<Decimal> {
    let pattern = pattern.trim().to_ascii_lowercase();
    let value = match pattern.split_once('x') {
        Some((left, right)) => {
            let left = Decimal::from_str(left.trim()).ok()?;
            let right = Decimal::from_str(right.trim()).ok()?;
            if left <= Decimal::ZERO {
                return None;
            }
            right.checked_div(left)?
        }
        None => Decimal::from_str(&pattern).ok()?,
    };
    (value > Decimal::ZERO).then_some(value)
}

/// A line as submitted by the client. Nothing here is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: u64,
    /// Product name as the client saw it in its (possibly stale) catalog.
    pub name: String,
    /// Width in metres.
    pub width: Decimal,
    /// Height in metres. Recorded on the order, not billed.
    pub height: Decimal,
    pub pleat_pattern: String,
    pub quantity: u32,
    /// Line price the client expects to pay.
    pub price: Decimal,
}

/// A line whose price and stock requirement were recomputed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLineItem {
    pub product_id: u64,
    pub name: String,
    pub width: Decimal,
    pub height: Decimal,
    pub pleat_pattern: String,
    pub quantity: u32,
    /// Authoritative line price before any coupon.
    pub server_price: Money,
    /// Fabric consumed by this line, in metres.
    pub stock_required: Decimal,
    /// Amount charged at the gateway for this line after coupon redistribution.
    pub charge: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub buyer_id: String,
    pub items: Vec<LineItemRequest>,
    pub coupon_code: Option<String>,
}

impl Cart {
    pub fn new(id: impl Into<String>, buyer_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            buyer_id: buyer_id.into(),
            items: Vec::new(),
            coupon_code: None,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon_code = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub order_number: String,
    pub buyer_id: String,
    pub used_at: DateTime<Utc>,
}

/// A fixed-amount discount code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Money,
    pub active: bool,
    pub usage: Option<CouponUsage>,
}

impl Coupon {
    pub fn new(code: impl Into<String>, discount: Money) -> Self {
        Self {
            code: code.into(),
            discount,
            active: true,
            usage: None,
        }
    }

    pub fn is_redeemable(&self) -> bool {
        self.active && self.usage.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pleat_pattern_ratio() {
        assert_eq!(PleatPattern::parse("1x2.5").multiplier(), dec!(2.5));
        assert_eq!(PleatPattern::parse("2x3").multiplier(), dec!(1.5));
        assert_eq!(PleatPattern::parse(" 1X3 ").multiplier(), dec!(3));
    }

    #[test]
    fn test_pleat_pattern_bare_number() {
        assert_eq!(PleatPattern::parse("2").multiplier(), dec!(2));
    }

    #[test]
    fn test_pleat_pattern_fallback() {
        assert_eq!(PleatPattern::parse("").multiplier(), Decimal::ONE);
        assert_eq!(PleatPattern::parse("wave").multiplier(), Decimal::ONE);
        assert_eq!(PleatPattern::parse("0x2").multiplier(), Decimal::ONE);
        assert_eq!(PleatPattern::parse("1x-2").multiplier(), Decimal::ONE);
    }

    #[test]
    fn test_pleat_pattern_overflow_falls_back() {
        let pattern = "0.0000000000000000000000000001x79228162514264337593543950335";
        assert_eq!(PleatPattern::parse(pattern).multiplier(), Decimal::ONE);
        assert_eq!(
            PleatPattern::parse("1x99999999999999999999999999999999").multiplier(),
            Decimal::ONE
        );
    }

    #[test]
    fn test_coupon_redeemable() {
        let mut coupon = Coupon::new("SPRING", Money::new(dec!(10)));
        assert!(coupon.is_redeemable());
        coupon.usage = Some(CouponUsage {
            order_number: "ORD-1".to_string(),
            buyer_id: "b-1".to_string(),
            used_at: Utc::now(),
        });
        assert!(!coupon.is_redeemable());
    }

    #[test]
    fn test_cart_clear() {
        let mut cart = Cart::new("cart-1", "buyer-1");
        cart.coupon_code = Some("SPRING".to_string());
        cart.clear();
        assert!(cart.items.is_empty());
        assert!(cart.coupon_code.is_none());
    }
}
