//! Limits and sizing for the run engine.
//!
//! Defaults match the caps the rest of the system assumes (100 products and 100
//! members per run). Deployments override them through environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `GROUP_RUN_MAX_PRODUCTS` | `max_products_per_run` |
//! | `GROUP_RUN_MAX_MEMBERS` | `max_members_per_run` |
//! | `GROUP_RUN_MAX_BID_QUANTITY` | `max_bid_quantity` |
//! | `GROUP_RUN_MAX_PURCHASE_QUANTITY` | `max_purchase_quantity` |
//! | `GROUP_RUN_MAX_PRICE` | `max_price_per_unit` |
//! | `GROUP_RUN_MAILBOX_SIZE` | `mailbox_size` |

use crate::model::{Money, Quantity};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Distinct products a single run may carry bids for.
    pub max_products_per_run: usize,
    /// Participations (including the leader) a run may hold.
    pub max_members_per_run: usize,
    /// Upper bound for a single bid.
    pub max_bid_quantity: Quantity,
    /// Upper bound for the quantity recorded on one purchase.
    pub max_purchase_quantity: Quantity,
    /// Upper bound for a recorded unit price. A purchase total may not exceed
    /// this price times `max_purchase_quantity`.
    pub max_price_per_unit: Money,
    /// Capacity of each run actor's mailbox.
    pub mailbox_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_products_per_run: 100,
            max_members_per_run: 100,
            max_bid_quantity: Quantity::from_hundredths(999_999),
            max_purchase_quantity: Quantity::from_hundredths(9_999_999),
            max_price_per_unit: Money::from_cents(9_999_999),
            mailbox_size: 32,
        }
    }
}

impl RunConfig {
    /// Defaults, overridden by any `GROUP_RUN_*` variable that is set and parses.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, "GROUP_RUN_MAX_PRODUCTS") {
            config.max_products_per_run = value;
        }
        if let Some(value) = parse_var(&lookup, "GROUP_RUN_MAX_MEMBERS") {
            config.max_members_per_run = value;
        }
        if let Some(value) = parse_var::<f64>(&lookup, "GROUP_RUN_MAX_BID_QUANTITY") {
            match Quantity::from_f64(value) {
                Ok(quantity) if !quantity.is_negative() => config.max_bid_quantity = quantity,
                _ => warn!(value, "Ignoring GROUP_RUN_MAX_BID_QUANTITY"),
            }
        }
        if let Some(value) = parse_var::<f64>(&lookup, "GROUP_RUN_MAX_PURCHASE_QUANTITY") {
            match Quantity::from_f64(value) {
                Ok(cap) if !cap.is_negative() => config.max_purchase_quantity = cap,
                _ => warn!(value, "Ignoring GROUP_RUN_MAX_PURCHASE_QUANTITY"),
            }
        }
        if let Some(value) = parse_var::<f64>(&lookup, "GROUP_RUN_MAX_PRICE") {
            match Money::from_f64(value) {
                Ok(price) if !price.is_negative() => config.max_price_per_unit = price,
                _ => warn!(value, "Ignoring GROUP_RUN_MAX_PRICE"),
            }
        }
        if let Some(value) = parse_var(&lookup, "GROUP_RUN_MAILBOX_SIZE") {
            config.mailbox_size = value;
        }
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, raw = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GROUP_RUN_MAX_PRODUCTS", "5"),
            ("GROUP_RUN_MAX_MEMBERS", "lots"),
            ("GROUP_RUN_MAX_BID_QUANTITY", "12.5"),
            ("GROUP_RUN_MAX_PRICE", "-3"),
            ("GROUP_RUN_MAX_PURCHASE_QUANTITY", "40"),
        ]);
        let config = RunConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_products_per_run, 5);
        assert_eq!(config.max_members_per_run, 100);
        assert_eq!(config.max_bid_quantity, Quantity::from_hundredths(1250));
        assert_eq!(config.max_purchase_quantity, Quantity::units(40));
        assert_eq!(config.max_price_per_unit, Money::from_cents(9_999_999));
        assert_eq!(config.mailbox_size, 32);
    }
}
