//! Threshold rules over [`ProductMetrics`], producing the run's alert list.
//!
//! Every rule is evaluated independently per product against the fixed
//! values in [`Config`]; nothing here is adaptive. A rule only fires when
//! the data it needs is actually present: no inventory data means no
//! stockout alert, zero revenue means no margin alert.

use serde::Serialize;
use tracing::info;

use std::fmt::Display;

use crate::config::Config;
use crate::metrics::{Metrics, ProductMetrics};
use crate::usd::Usd;

/// How urgent an alert is. Ordered, so `Critical` sorts above `Warning`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The rule that fired.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AlertKind {
    Stockout,
    LowMargin,
    WastedSpend,
    LowRating,
    Overstock,
}

impl AlertKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Stockout => "Stockout risk",
            AlertKind::LowMargin => "Low margin",
            AlertKind::WastedSpend => "Wasted ad spend",
            AlertKind::LowRating => "Low rating",
            AlertKind::Overstock => "Overstock",
        }
    }
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One alert for one product.
#[derive(Clone, Debug, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub sku: String,
    pub product: String,
    pub message: String,
}

/// Applies every threshold rule to every product.
///
/// The returned list is ordered most urgent first, then by SKU, then by
/// rule, so two runs over the same data always agree.
#[must_use]
pub fn evaluate(metrics: &Metrics, config: &Config) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for product in metrics.products.values() {
        check_stock(product, config, &mut alerts);
        check_margin(product, config, &mut alerts);
        check_ad_spend(product, config, &mut alerts);
        check_rating(product, config, &mut alerts);
    }
    alerts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.sku.cmp(&b.sku))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    info!("{} alert(s) generated", alerts.len());
    alerts
}

fn push(
    alerts: &mut Vec<Alert>,
    product: &ProductMetrics,
    kind: AlertKind,
    severity: Severity,
    message: String,
) {
    alerts.push(Alert {
        kind,
        severity,
        sku: product.sku.clone(),
        product: product.product.clone(),
        message,
    });
}

fn check_stock(product: &ProductMetrics, config: &Config, alerts: &mut Vec<Alert>) {
    let Some(days) = product.stock_days else {
        return;
    };
    if days < config.stockout_days {
        let severity = if days <= config.stockout_days / 2.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        push(
            alerts,
            product,
            AlertKind::Stockout,
            severity,
            format!(
                "{days:.1} days of stock left (threshold {:.0})",
                config.stockout_days
            ),
        );
    } else if days > config.overstock_days && product.stock.unwrap_or(0) > 0 {
        let message = if days.is_infinite() {
            format!(
                "{} units on hand with no sales in the observed window",
                product.stock.unwrap_or(0)
            )
        } else {
            format!(
                "{days:.0} days of stock on hand (threshold {:.0})",
                config.overstock_days
            )
        };
        push(alerts, product, AlertKind::Overstock, Severity::Info, message);
    }
}

fn check_margin(product: &ProductMetrics, config: &Config, alerts: &mut Vec<Alert>) {
    if product.revenue.is_zero() || product.margin >= config.low_margin {
        return;
    }
    let severity = if product.profit.is_negative() {
        Severity::Critical
    } else {
        Severity::Warning
    };
    push(
        alerts,
        product,
        AlertKind::LowMargin,
        severity,
        format!(
            "margin {:.1}% below target {:.1}%",
            product.margin * 100.0,
            config.low_margin * 100.0
        ),
    );
}

fn check_ad_spend(product: &ProductMetrics, config: &Config, alerts: &mut Vec<Alert>) {
    if !config.wasted_spend {
        return;
    }
    if product.ad_spend > Usd::ZERO && product.ad_orders == 0 && product.ad_attributed.is_zero() {
        push(
            alerts,
            product,
            AlertKind::WastedSpend,
            Severity::Warning,
            format!("{} ad spend with no attributed orders", product.ad_spend),
        );
    }
}

fn check_rating(product: &ProductMetrics, config: &Config, alerts: &mut Vec<Alert>) {
    let Some(rating) = product.avg_rating else {
        return;
    };
    if rating >= config.low_rating {
        return;
    }
    let severity = if rating < 2.0 {
        Severity::Critical
    } else {
        Severity::Warning
    };
    push(
        alerts,
        product,
        AlertKind::LowRating,
        severity,
        format!(
            "average rating {rating:.1} from {} review(s)",
            product.review_count
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{AdRow, InventoryRow, ReviewRow, SalesRow, Tables};
    use crate::metrics::compute;
    use chrono::NaiveDate;

    // One dated sale of one unit gives a one-day window, so stock level and
    // stock-days coincide and the thresholds are easy to steer.
    fn tables_with_stock(stock: i64) -> Tables {
        Tables {
            sales: vec![SalesRow {
                order_id: "1".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1),
                sku: "A1".into(),
                product: "Widget".into(),
                units: 1,
                unit_price: Usd::from_cents(5000),
                total: Usd::from_cents(5000),
                cost_of_goods: Usd::from_cents(1000),
                fulfillment_fee: Usd::ZERO,
            }],
            inventory: vec![InventoryRow {
                sku: "A1".into(),
                product: "Widget".into(),
                stock,
                inbound: 0,
            }],
            ..Tables::default()
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn zero_stock_with_sales_is_a_critical_stockout() {
        let alerts = evaluate(&compute(&tables_with_stock(0)), &Config::default());
        let stockout = alerts
            .iter()
            .find(|a| a.kind == AlertKind::Stockout)
            .unwrap();
        assert_eq!(stockout.severity, Severity::Critical);
        assert_eq!(stockout.sku, "A1");
    }

    #[test]
    fn stockout_severity_scales_with_days_remaining() {
        let config = Config::default();
        let warn = evaluate(&compute(&tables_with_stock(5)), &config);
        assert_eq!(
            warn.iter().find(|a| a.kind == AlertKind::Stockout).unwrap().severity,
            Severity::Warning
        );
        let critical = evaluate(&compute(&tables_with_stock(3)), &config);
        assert_eq!(
            critical.iter().find(|a| a.kind == AlertKind::Stockout).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn ample_stock_is_an_overstock_info_alert() {
        let alerts = evaluate(&compute(&tables_with_stock(40)), &Config::default());
        let overstock = alerts
            .iter()
            .find(|a| a.kind == AlertKind::Overstock)
            .unwrap();
        assert_eq!(overstock.severity, Severity::Info);
    }

    #[test]
    fn no_inventory_data_means_no_stock_alerts() {
        let mut tables = tables_with_stock(0);
        tables.inventory.clear();
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert!(!kinds(&alerts).contains(&AlertKind::Stockout));
        assert!(!kinds(&alerts).contains(&AlertKind::Overstock));
    }

    #[test]
    fn low_margin_warns_and_losses_are_critical() {
        let mut tables = tables_with_stock(10);
        // margin 10%: below the 15% target but still profitable
        tables.sales[0].cost_of_goods = Usd::from_cents(4500);
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert_eq!(
            alerts.iter().find(|a| a.kind == AlertKind::LowMargin).unwrap().severity,
            Severity::Warning
        );

        // selling at a loss
        tables.sales[0].cost_of_goods = Usd::from_cents(6000);
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert_eq!(
            alerts.iter().find(|a| a.kind == AlertKind::LowMargin).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn zero_revenue_products_are_not_margin_flagged() {
        let tables = Tables {
            inventory: vec![InventoryRow {
                sku: "A1".into(),
                product: "Widget".into(),
                stock: 10,
                inbound: 0,
            }],
            ..Tables::default()
        };
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert!(!kinds(&alerts).contains(&AlertKind::LowMargin));
    }

    #[test]
    fn spend_without_conversions_is_wasted_spend() {
        let ad = AdRow {
            date: None,
            campaign: "Auto".into(),
            sku: Some("A1".into()),
            spend: Usd::from_cents(5000),
            clicks: 20,
            impressions: 800,
            orders: 0,
            attributed_sales: Usd::ZERO,
        };
        let tables = Tables {
            advertising: vec![ad.clone()],
            ..Tables::default()
        };
        let alerts = evaluate(&compute(&tables), &Config::default());
        let wasted = alerts
            .iter()
            .find(|a| a.kind == AlertKind::WastedSpend)
            .unwrap();
        assert_eq!(wasted.severity, Severity::Warning);
        assert!(wasted.message.contains("$50.00"));

        let disabled = Config {
            wasted_spend: false,
            ..Config::default()
        };
        let alerts = evaluate(&compute(&tables), &disabled);
        assert!(!kinds(&alerts).contains(&AlertKind::WastedSpend));

        // Any attributed order clears the rule.
        let mut converted = ad;
        converted.orders = 1;
        let tables = Tables {
            advertising: vec![converted],
            ..Tables::default()
        };
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert!(!kinds(&alerts).contains(&AlertKind::WastedSpend));
    }

    #[test]
    fn low_ratings_warn_and_very_low_are_critical() {
        let review = |rating| ReviewRow {
            date: None,
            sku: Some("A1".into()),
            product: "Widget".into(),
            rating,
            verified: true,
        };
        let tables = Tables {
            reviews: vec![review(2.0), review(3.0)],
            ..Tables::default()
        };
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert_eq!(
            alerts.iter().find(|a| a.kind == AlertKind::LowRating).unwrap().severity,
            Severity::Warning
        );

        let tables = Tables {
            reviews: vec![review(1.0)],
            ..Tables::default()
        };
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert_eq!(
            alerts.iter().find(|a| a.kind == AlertKind::LowRating).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn alerts_are_ordered_most_urgent_first() {
        let mut tables = tables_with_stock(0);
        tables.advertising.push(AdRow {
            date: None,
            campaign: "Auto".into(),
            sku: Some("B2".into()),
            spend: Usd::from_cents(1000),
            clicks: 0,
            impressions: 0,
            orders: 0,
            attributed_sales: Usd::ZERO,
        });
        let alerts = evaluate(&compute(&tables), &Config::default());
        assert!(alerts.len() >= 2);
        for pair in alerts.windows(2) {
            assert!(pair[0].severity >= pair[1].severity, "out of order: {pair:?}");
        }
    }
}
