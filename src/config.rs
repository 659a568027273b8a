/// Threshold settings for a single reporting run.
///
/// Every run owns its own `Config`; the loaders, metric engine, and alert
/// rules all take it by reference, so two runs with different thresholds
/// never interfere.
///
/// The defaults mirror the thresholds Amazon sellers commonly work to:
/// restock below a week of cover, flag margins under 15%, and treat ratings
/// under 3 stars as a problem.
#[derive(Debug, Clone)]
pub struct Config {
    /// Days of stock below which a product is at stockout risk.
    pub stockout_days: f64,
    /// Days of stock above which a product is overstocked.
    pub overstock_days: f64,
    /// Profit margin (as a ratio of revenue) below which a product is
    /// flagged.
    pub low_margin: f64,
    /// Average review rating below which a product is flagged.
    pub low_rating: f64,
    /// Whether to flag products with ad spend but no attributed orders.
    pub wasted_spend: bool,
    /// How many products the dashboard's top-performers table shows.
    pub top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stockout_days: 7.0,
            overstock_days: 30.0,
            low_margin: 0.15,
            low_rating: 3.0,
            wasted_spend: true,
            top_n: 10,
        }
    }
}
