//! The metric engine: joins the four normalized tables on SKU and derives
//! per-product and whole-run business metrics.
//!
//! Products are the union of SKUs seen anywhere; a product missing from one
//! source keeps zero (or `None`) for that source's fields rather than being
//! dropped. Division edge cases use sentinels, never errors: margin is 0 at
//! zero revenue, stock-days is infinite at zero sales velocity, and ad ROI
//! is `None` at zero spend.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use std::collections::{BTreeMap, HashMap};

use crate::load::Tables;
use crate::usd::Usd;

/// Canonical form of a SKU for joining across sources: trimmed and
/// upper-cased, exact match otherwise.
#[must_use]
pub fn normalize_sku(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Derived metrics for one product.
#[derive(Clone, Debug, Serialize)]
pub struct ProductMetrics {
    pub sku: String,
    pub product: String,
    pub units: i64,
    pub revenue: Usd,
    /// Cost of goods plus fulfillment fees.
    pub cost: Usd,
    pub ad_spend: Usd,
    /// Revenue minus cost minus attributed ad spend.
    pub profit: Usd,
    /// Profit over revenue; 0.0 when revenue is zero.
    pub margin: f64,
    /// `None` when the product never appeared in inventory data.
    pub stock: Option<i64>,
    pub inbound: i64,
    pub avg_daily_units: f64,
    /// Days of stock left at current velocity. `None` without inventory
    /// data; infinite when the product is not selling.
    pub stock_days: Option<f64>,
    pub ad_clicks: i64,
    pub ad_impressions: i64,
    pub ad_orders: i64,
    pub ad_attributed: Usd,
    /// Attributed revenue over spend; `None` when spend is zero.
    pub ad_roi: Option<f64>,
    pub review_count: u32,
    pub avg_rating: Option<f64>,
}

/// Spend and results aggregated per campaign, for the advertising sheet.
/// Includes campaign rows that carry no SKU.
#[derive(Clone, Debug, Serialize)]
pub struct CampaignStats {
    pub campaign: String,
    pub spend: Usd,
    pub clicks: i64,
    pub impressions: i64,
    pub orders: i64,
    pub attributed_sales: Usd,
    pub roas: Option<f64>,
}

/// Whole-run totals shown on the dashboard sheet.
#[derive(Clone, Debug, Serialize)]
pub struct Totals {
    pub revenue: Usd,
    pub cost: Usd,
    /// All advertising spend, including campaign rows with no SKU.
    pub ad_spend: Usd,
    pub profit: Usd,
    pub margin: f64,
    pub units: i64,
    pub transactions: usize,
    pub products: usize,
    pub review_count: u32,
    pub avg_rating: Option<f64>,
}

/// Revenue bucketed by calendar month, for the trend chart.
#[derive(Clone, Debug, Serialize)]
pub struct MonthRevenue {
    pub month: String,
    pub revenue: Usd,
}

/// Everything the metric engine derives from one run's tables.
#[derive(Clone, Debug, Serialize)]
pub struct Metrics {
    pub products: BTreeMap<String, ProductMetrics>,
    pub campaigns: Vec<CampaignStats>,
    pub monthly_revenue: Vec<MonthRevenue>,
    pub totals: Totals,
    /// Length in days of the observed sales window, first to last order
    /// date inclusive; 0 with no dated sales.
    pub window_days: i64,
}

#[derive(Debug, Default)]
struct Acc {
    product: String,
    units: i64,
    revenue: Usd,
    cogs: Usd,
    fees: Usd,
    stock: Option<i64>,
    inbound: i64,
    ad_spend: Usd,
    ad_clicks: i64,
    ad_impressions: i64,
    ad_orders: i64,
    ad_attributed: Usd,
    rating_sum: f64,
    review_count: u32,
}

impl Acc {
    fn name_product(&mut self, name: &str) {
        if self.product.is_empty() && !name.trim().is_empty() {
            self.product = name.trim().to_string();
        }
    }
}

#[derive(Debug, Default)]
struct CampaignAcc {
    spend: Usd,
    clicks: i64,
    impressions: i64,
    orders: i64,
    attributed: Usd,
}

/// Computes [`Metrics`] from one run's loaded tables.
#[must_use]
pub fn compute(tables: &Tables) -> Metrics {
    let window = sales_window(tables);
    let window_days = window.map_or(0, |(first, last)| (last - first).num_days() + 1);

    let mut products: BTreeMap<String, Acc> = BTreeMap::new();
    // Product-name lookup for review rows that carry no SKU column.
    let mut name_index: HashMap<String, String> = HashMap::new();
    let mut monthly: BTreeMap<String, Usd> = BTreeMap::new();

    for row in &tables.sales {
        let key = normalize_sku(&row.sku);
        let acc = products.entry(key.clone()).or_default();
        acc.name_product(&row.product);
        acc.units += row.units;
        acc.revenue += row.total;
        acc.cogs += row.cost_of_goods;
        acc.fees += row.fulfillment_fee;
        name_index
            .entry(row.product.trim().to_lowercase())
            .or_insert_with(|| key.clone());
        if let Some(d) = row.date {
            *monthly
                .entry(format!("{:04}-{:02}", d.year(), d.month()))
                .or_default() += row.total;
        }
    }

    for row in &tables.inventory {
        let key = normalize_sku(&row.sku);
        let acc = products.entry(key.clone()).or_default();
        acc.name_product(&row.product);
        *acc.stock.get_or_insert(0) += row.stock;
        acc.inbound += row.inbound;
        name_index
            .entry(row.product.trim().to_lowercase())
            .or_insert(key);
    }

    let mut campaigns: BTreeMap<String, CampaignAcc> = BTreeMap::new();
    let mut total_ad_spend = Usd::ZERO;
    let mut attributed_ad_spend = Usd::ZERO;
    for row in &tables.advertising {
        total_ad_spend += row.spend;
        let camp = campaigns.entry(row.campaign.clone()).or_default();
        camp.spend += row.spend;
        camp.clicks += row.clicks;
        camp.impressions += row.impressions;
        camp.orders += row.orders;
        camp.attributed += row.attributed_sales;
        if let Some(sku) = &row.sku {
            attributed_ad_spend += row.spend;
            let acc = products.entry(normalize_sku(sku)).or_default();
            acc.ad_spend += row.spend;
            acc.ad_clicks += row.clicks;
            acc.ad_impressions += row.impressions;
            acc.ad_orders += row.orders;
            acc.ad_attributed += row.attributed_sales;
        }
    }

    let mut total_rating_sum = 0.0;
    let mut total_review_count: u32 = 0;
    for row in &tables.reviews {
        total_rating_sum += row.rating;
        total_review_count += 1;
        let key = match &row.sku {
            Some(sku) => Some(normalize_sku(sku)),
            None => name_index.get(&row.product.trim().to_lowercase()).cloned(),
        };
        if let Some(key) = key {
            let acc = products.entry(key).or_default();
            acc.name_product(&row.product);
            acc.rating_sum += row.rating;
            acc.review_count += 1;
        }
    }

    let products: BTreeMap<String, ProductMetrics> = products
        .into_iter()
        .map(|(sku, acc)| {
            let metrics = finalize(&sku, acc, window_days);
            (sku, metrics)
        })
        .collect();

    let revenue: Usd = products.values().map(|p| p.revenue).sum();
    let cost: Usd = products.values().map(|p| p.cost).sum();
    let units: i64 = products.values().map(|p| p.units).sum();
    // Campaign spend carrying no SKU still counts against the run's profit.
    let unattributed_spend = total_ad_spend - attributed_ad_spend;
    let product_profit: Usd = products.values().map(|p| p.profit).sum();
    let profit = product_profit - unattributed_spend;

    let totals = Totals {
        revenue,
        cost,
        ad_spend: total_ad_spend,
        profit,
        margin: profit.ratio(revenue),
        units,
        transactions: tables.sales.len(),
        products: products.len(),
        review_count: total_review_count,
        avg_rating: (total_review_count > 0)
            .then(|| total_rating_sum / f64::from(total_review_count)),
    };
    info!(
        "computed metrics for {} product(s) over a {window_days}-day sales window",
        products.len()
    );

    Metrics {
        products,
        campaigns: campaign_stats(campaigns),
        monthly_revenue: monthly
            .into_iter()
            .map(|(month, revenue)| MonthRevenue { month, revenue })
            .collect(),
        totals,
        window_days,
    }
}

fn sales_window(tables: &Tables) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = tables.sales.iter().filter_map(|r| r.date);
    let first = dates.next()?;
    let (min, max) = dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d)));
    Some((min, max))
}

fn finalize(sku: &str, acc: Acc, window_days: i64) -> ProductMetrics {
    let cost = acc.cogs + acc.fees;
    let profit = acc.revenue - cost - acc.ad_spend;
    let avg_daily_units = if window_days > 0 {
        acc.units as f64 / window_days as f64
    } else {
        0.0
    };
    let stock_days = acc.stock.map(|stock| {
        if avg_daily_units <= 0.0 {
            f64::INFINITY
        } else {
            stock as f64 / avg_daily_units
        }
    });
    let ad_roi = (!acc.ad_spend.is_zero()).then(|| acc.ad_attributed.ratio(acc.ad_spend));
    ProductMetrics {
        sku: sku.to_string(),
        product: acc.product,
        units: acc.units,
        revenue: acc.revenue,
        cost,
        ad_spend: acc.ad_spend,
        profit,
        margin: profit.ratio(acc.revenue),
        stock: acc.stock,
        inbound: acc.inbound,
        avg_daily_units,
        stock_days,
        ad_clicks: acc.ad_clicks,
        ad_impressions: acc.ad_impressions,
        ad_orders: acc.ad_orders,
        ad_attributed: acc.ad_attributed,
        ad_roi,
        review_count: acc.review_count,
        avg_rating: (acc.review_count > 0).then(|| acc.rating_sum / f64::from(acc.review_count)),
    }
}

fn campaign_stats(campaigns: BTreeMap<String, CampaignAcc>) -> Vec<CampaignStats> {
    let mut stats: Vec<CampaignStats> = campaigns
        .into_iter()
        .map(|(campaign, acc)| CampaignStats {
            campaign,
            spend: acc.spend,
            clicks: acc.clicks,
            impressions: acc.impressions,
            orders: acc.orders,
            attributed_sales: acc.attributed,
            roas: (!acc.spend.is_zero()).then(|| acc.attributed.ratio(acc.spend)),
        })
        .collect();
    // Biggest spenders first; name breaks ties so the order is stable.
    stats.sort_by(|a, b| b.spend.cmp(&a.spend).then_with(|| a.campaign.cmp(&b.campaign)));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{AdRow, InventoryRow, ReviewRow, SalesRow};
    use chrono::NaiveDate;

    fn sale(sku: &str, date: Option<NaiveDate>, units: i64, total: Usd, cogs: Usd, fee: Usd) -> SalesRow {
        SalesRow {
            order_id: "1".into(),
            date,
            sku: sku.into(),
            product: format!("Product {sku}"),
            units,
            unit_price: Usd::ZERO,
            total,
            cost_of_goods: cogs,
            fulfillment_fee: fee,
        }
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, d)
    }

    #[test]
    fn profit_margin_and_roi_worked_example() {
        let tables = Tables {
            sales: vec![sale(
                "A1",
                day(1),
                1,
                Usd::from_cents(10000),
                Usd::from_cents(5000),
                Usd::from_cents(1000),
            )],
            advertising: vec![AdRow {
                date: day(1),
                campaign: "Brand".into(),
                sku: Some("A1".into()),
                spend: Usd::from_cents(1000),
                clicks: 10,
                impressions: 100,
                orders: 1,
                attributed_sales: Usd::from_cents(2000),
            }],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        let p = &metrics.products["A1"];
        assert_eq!(p.profit, Usd::from_cents(3000));
        assert_eq!(p.margin, 0.3);
        assert_eq!(p.ad_roi, Some(2.0));
        assert_eq!(metrics.totals.profit, Usd::from_cents(3000));
        assert_eq!(metrics.totals.margin, 0.3);
    }

    #[test]
    fn zero_revenue_and_zero_spend_use_sentinels() {
        let tables = Tables {
            inventory: vec![InventoryRow {
                sku: "A1".into(),
                product: "Widget".into(),
                stock: 50,
                inbound: 0,
            }],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        let p = &metrics.products["A1"];
        assert_eq!(p.margin, 0.0, "margin must be 0 at zero revenue");
        assert_eq!(p.ad_roi, None, "ROI must be undefined at zero spend");
        assert_eq!(p.stock_days, Some(f64::INFINITY));
        assert_eq!(metrics.totals.margin, 0.0);
    }

    #[test]
    fn zero_stock_with_sales_velocity_gives_zero_days() {
        let tables = Tables {
            sales: vec![sale(
                "A1",
                day(1),
                5,
                Usd::from_cents(5000),
                Usd::ZERO,
                Usd::ZERO,
            )],
            inventory: vec![InventoryRow {
                sku: "A1".into(),
                product: "Widget".into(),
                stock: 0,
                inbound: 0,
            }],
            ..Tables::default()
        };
        let p = &compute(&tables).products["A1"];
        assert_eq!(p.stock_days, Some(0.0));
    }

    #[test]
    fn products_are_the_union_of_all_sources() {
        let tables = Tables {
            sales: vec![sale("A1", day(1), 1, Usd::from_cents(1000), Usd::ZERO, Usd::ZERO)],
            advertising: vec![AdRow {
                date: None,
                campaign: "Auto".into(),
                sku: Some("B2".into()),
                spend: Usd::from_cents(500),
                clicks: 0,
                impressions: 0,
                orders: 0,
                attributed_sales: Usd::ZERO,
            }],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        assert_eq!(metrics.products.len(), 2);
        let b2 = &metrics.products["B2"];
        assert_eq!(b2.revenue, Usd::ZERO);
        assert_eq!(b2.ad_spend, Usd::from_cents(500));
        assert_eq!(b2.stock, None);
    }

    #[test]
    fn sku_join_is_case_and_whitespace_insensitive() {
        let tables = Tables {
            sales: vec![sale(" a1 ", day(1), 1, Usd::from_cents(1000), Usd::ZERO, Usd::ZERO)],
            inventory: vec![InventoryRow {
                sku: "A1".into(),
                product: "Widget".into(),
                stock: 10,
                inbound: 0,
            }],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        assert_eq!(metrics.products.len(), 1);
        let p = &metrics.products["A1"];
        assert_eq!(p.stock, Some(10));
        assert_eq!(p.revenue, Usd::from_cents(1000));
    }

    #[test]
    fn reviews_join_through_product_name_when_sku_is_missing() {
        let mut sales_row = sale("A1", day(1), 1, Usd::from_cents(1000), Usd::ZERO, Usd::ZERO);
        sales_row.product = "Wireless Earbuds Pro".into();
        let tables = Tables {
            sales: vec![sales_row],
            reviews: vec![
                ReviewRow {
                    date: None,
                    sku: None,
                    product: "wireless earbuds pro".into(),
                    rating: 4.0,
                    verified: true,
                },
                ReviewRow {
                    date: None,
                    sku: None,
                    product: "Unknown Gadget".into(),
                    rating: 1.0,
                    verified: false,
                },
            ],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        let p = &metrics.products["A1"];
        assert_eq!(p.review_count, 1);
        assert_eq!(p.avg_rating, Some(4.0));
        // The unmatched review still counts toward the run totals.
        assert_eq!(metrics.totals.review_count, 2);
        assert_eq!(metrics.totals.avg_rating, Some(2.5));
    }

    #[test]
    fn monthly_revenue_buckets_by_calendar_month() {
        let tables = Tables {
            sales: vec![
                sale("A1", day(1), 1, Usd::from_cents(1000), Usd::ZERO, Usd::ZERO),
                sale("A1", day(20), 1, Usd::from_cents(2000), Usd::ZERO, Usd::ZERO),
                sale(
                    "A1",
                    NaiveDate::from_ymd_opt(2024, 2, 3),
                    1,
                    Usd::from_cents(4000),
                    Usd::ZERO,
                    Usd::ZERO,
                ),
            ],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        assert_eq!(metrics.window_days, 34);
        assert_eq!(metrics.monthly_revenue.len(), 2);
        assert_eq!(metrics.monthly_revenue[0].month, "2024-01");
        assert_eq!(metrics.monthly_revenue[0].revenue, Usd::from_cents(3000));
        assert_eq!(metrics.monthly_revenue[1].month, "2024-02");
    }

    #[test]
    fn unattributed_spend_reduces_total_profit_only() {
        let tables = Tables {
            sales: vec![sale("A1", day(1), 1, Usd::from_cents(10000), Usd::ZERO, Usd::ZERO)],
            advertising: vec![AdRow {
                date: None,
                campaign: "Display".into(),
                sku: None,
                spend: Usd::from_cents(2000),
                clicks: 0,
                impressions: 0,
                orders: 0,
                attributed_sales: Usd::ZERO,
            }],
            ..Tables::default()
        };
        let metrics = compute(&tables);
        assert_eq!(metrics.products["A1"].profit, Usd::from_cents(10000));
        assert_eq!(metrics.totals.profit, Usd::from_cents(8000));
        assert_eq!(metrics.totals.ad_spend, Usd::from_cents(2000));
        assert_eq!(metrics.campaigns.len(), 1);
        assert_eq!(metrics.campaigns[0].roas, Some(0.0));
    }
}
