use crate::domain::catalog::{LineItemRequest, PleatPattern, ValidatedLineItem};
use crate::domain::money::Money;
use crate::domain::ports::ProductStoreRef;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Line items whose prices were recomputed from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedBasket {
    pub subtotal: Money,
    pub items: Vec<ValidatedLineItem>,
}

/// Metres of fabric a line consumes: `width × multiplier × quantity`.
pub fn fabric_required(width: Decimal, multiplier: Decimal, quantity: u32) -> Option<Decimal> {
    width
        .checked_mul(multiplier)?
        .checked_mul(Decimal::from(quantity))
}

/// Billable price of one line: `unit_price × width × multiplier × quantity`,
/// rounded half-up to the minor unit. `None` when the product overflows.
pub fn line_price(
    unit_price: Money,
    width: Decimal,
    multiplier: Decimal,
    quantity: u32,
) -> Option<Money> {
    let metres = fabric_required(width, multiplier, quantity)?;
    unit_price.value().checked_mul(metres).map(Money::rounded)
}

/// Re-derives every line's price and stock requirement from the catalog.
///
/// The client's prices are only compared against, never used.
pub struct PriceValidator {
    products: ProductStoreRef,
    tolerance: Decimal,
}

impl PriceValidator {
    pub fn new(products: ProductStoreRef, tolerance: Decimal) -> Self {
        Self {
            products,
            tolerance,
        }
    }

    pub async fn validate(&self, requests: &[LineItemRequest]) -> Result<PricedBasket> {
        if requests.is_empty() {
            return Err(PaymentError::ValidationError(
                "order contains no line items".to_string(),
            ));
        }

        // Lines for the same fabric draw from the same stock.
        let mut reserved: HashMap<u64, Decimal> = HashMap::new();
        let mut items = Vec::with_capacity(requests.len());

        for request in requests {
            let product = self.products.get(request.product_id).await?.ok_or_else(|| {
                PaymentError::ValidationError(format!("product {} not found", request.product_id))
            })?;

            if !names_match(&product.name, &request.name) {
                warn!(
                    product_id = product.id,
                    catalog_name = %product.name,
                    declared_name = %request.name,
                    "declared product name does not match catalog"
                );
                return Err(PaymentError::ValidationError(format!(
                    "product {} is no longer listed as '{}'",
                    product.id, request.name
                )));
            }

            if request.width <= Decimal::ZERO || request.quantity == 0 {
                return Err(PaymentError::ValidationError(format!(
                    "invalid width or quantity for product '{}'",
                    product.name
                )));
            }

            let multiplier = PleatPattern::parse(&request.pleat_pattern).multiplier();
            let out_of_range = || {
                PaymentError::ValidationError(format!(
                    "line for product '{}' is out of range",
                    product.name
                ))
            };
            let stock_required = fabric_required(request.width, multiplier, request.quantity)
                .ok_or_else(out_of_range)?;
            let already_reserved = reserved.entry(product.id).or_insert(Decimal::ZERO);
            let total_required = already_reserved
                .checked_add(stock_required)
                .ok_or_else(out_of_range)?;
            if total_required > product.stock {
                return Err(PaymentError::ValidationError(format!(
                    "insufficient stock for '{}': {} m requested, {} m available",
                    product.name, total_required, product.stock
                )));
            }
            *already_reserved = total_required;

            let server_price = line_price(
                product.unit_price,
                request.width,
                multiplier,
                request.quantity,
            )
            .ok_or_else(out_of_range)?;
            let declared = Money::new(request.price);
            if !server_price.within(declared, self.tolerance) {
                warn!(
                    product_id = product.id,
                    %server_price,
                    %declared,
                    "declared line price rejected"
                );
                return Err(PaymentError::ValidationError(format!(
                    "price mismatch for '{}': expected {}, got {}",
                    product.name, server_price, declared
                )));
            }

            items.push(ValidatedLineItem {
                product_id: product.id,
                name: product.name,
                width: request.width,
                height: request.height,
                pleat_pattern: request.pleat_pattern.clone(),
                quantity: request.quantity,
                server_price,
                stock_required,
                charge: server_price,
            });
        }

        let subtotal = items
            .iter()
            .try_fold(Money::ZERO, |total, item| total.checked_add(item.server_price))
            .ok_or_else(|| {
                PaymentError::ValidationError("order total is out of range".to_string())
            })?;
        Ok(PricedBasket { subtotal, items })
    }
}

fn names_match(catalog: &str, declared: &str) -> bool {
    catalog.trim().to_lowercase() == declared.trim().to_lowercase()
}
