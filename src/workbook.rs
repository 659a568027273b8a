//! The dashboard writer: renders computed metrics and alerts into one
//! formatted `.xlsx` workbook.
//!
//! Sheet names, sheet order, and the severity color legend are part of the
//! contract with the people who read these dashboards; change them and
//! somebody's morning routine breaks. Alert shading is applied directly as
//! cell styling, not as spreadsheet formulas.

use chrono::Local;
use rust_xlsxwriter::{
    Chart, ChartType, Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError,
};
use tracing::info;

use std::path::Path;

use crate::alerts::{Alert, Severity};
use crate::config::Config;
use crate::metrics::{Metrics, ProductMetrics};
use crate::usd::Usd;

const DASHBOARD_SHEET: &str = "Executive Dashboard";
const SALES_SHEET: &str = "Sales Analysis";
const INVENTORY_SHEET: &str = "Inventory Health";
const ADVERTISING_SHEET: &str = "Advertising ROI";
const REVIEWS_SHEET: &str = "Customer Reviews";
const ALERTS_SHEET: &str = "Actionable Alerts";

// The fixed color legend.
const CRITICAL_RED: u32 = 0xFFC7CE;
const WARNING_YELLOW: u32 = 0xFFEB9C;
const GOOD_GREEN: u32 = 0xC6EFCE;
const INFO_BLUE: u32 = 0xBDD7EE;
const HEADER_BLUE: u32 = 0x4472C4;
const TITLE_INK: u32 = 0x2F5496;

struct Styles {
    title: Format,
    stamp: Format,
    header: Format,
    subheader: Format,
    label: Format,
    text: Format,
    money: Format,
    percent: Format,
    percent_bad: Format,
    number: Format,
    days: Format,
    days_low: Format,
    days_out: Format,
    rating_low: Format,
    money_wasted: Format,
    critical: Format,
    warning: Format,
    info: Format,
    good: Format,
}

impl Styles {
    fn new() -> Self {
        let fill = |color: u32| Format::new().set_background_color(Color::RGB(color));
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(16)
                .set_font_color(Color::RGB(TITLE_INK))
                .set_align(FormatAlign::Center),
            stamp: Format::new().set_italic().set_align(FormatAlign::Center),
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(HEADER_BLUE))
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin),
            subheader: Format::new().set_bold().set_font_color(Color::RGB(TITLE_INK)),
            label: Format::new().set_bold(),
            text: Format::new(),
            money: Format::new().set_num_format("$#,##0.00"),
            percent: Format::new().set_num_format("0.0%"),
            percent_bad: Format::new()
                .set_num_format("0.0%")
                .set_background_color(Color::RGB(CRITICAL_RED)),
            number: Format::new().set_num_format("#,##0"),
            days: Format::new().set_num_format("0.0"),
            days_low: Format::new()
                .set_num_format("0.0")
                .set_background_color(Color::RGB(WARNING_YELLOW)),
            days_out: Format::new()
                .set_num_format("0.0")
                .set_background_color(Color::RGB(CRITICAL_RED)),
            rating_low: Format::new()
                .set_num_format("0.0")
                .set_background_color(Color::RGB(WARNING_YELLOW)),
            money_wasted: Format::new()
                .set_num_format("$#,##0.00")
                .set_background_color(Color::RGB(WARNING_YELLOW)),
            critical: fill(CRITICAL_RED).set_bold(),
            warning: fill(WARNING_YELLOW),
            info: fill(INFO_BLUE),
            good: fill(GOOD_GREEN),
        }
    }

    fn severity(&self, severity: Severity) -> &Format {
        match severity {
            Severity::Critical => &self.critical,
            Severity::Warning => &self.warning,
            Severity::Info => &self.info,
        }
    }
}

/// Writes the full dashboard workbook to `path`, overwriting any existing
/// file.
///
/// # Errors
///
/// Returns any error from building or saving the workbook. A failure
/// partway through saving can leave an incomplete file behind; the run
/// treats that as fatal and makes no attempt to clean up.
pub fn write(
    metrics: &Metrics,
    alerts: &[Alert],
    config: &Config,
    path: &Path,
) -> Result<(), XlsxError> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    dashboard_sheet(workbook.add_worksheet(), &styles, metrics, alerts, config)?;
    sales_sheet(workbook.add_worksheet(), &styles, metrics, config)?;
    inventory_sheet(workbook.add_worksheet(), &styles, metrics, config)?;
    advertising_sheet(workbook.add_worksheet(), &styles, metrics, config)?;
    reviews_sheet(workbook.add_worksheet(), &styles, metrics, config)?;
    alerts_sheet(workbook.add_worksheet(), &styles, alerts)?;
    workbook.save(path)?;
    info!("workbook saved to {}", path.display());
    Ok(())
}

fn product_label(product: &ProductMetrics) -> &str {
    if product.product.is_empty() {
        &product.sku
    } else {
        &product.product
    }
}

fn dashboard_sheet(
    ws: &mut Worksheet,
    s: &Styles,
    metrics: &Metrics,
    alerts: &[Alert],
    config: &Config,
) -> Result<(), XlsxError> {
    ws.set_name(DASHBOARD_SHEET)?;
    ws.merge_range(0, 0, 0, 6, "Amazon Seller Executive Dashboard", &s.title)?;
    let stamp = format!("Generated on {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    ws.merge_range(1, 0, 1, 6, &stamp, &s.stamp)?;

    let t = &metrics.totals;
    let mut row: u32 = 3;
    let kpi_money = |ws: &mut Worksheet, row: &mut u32, label: &str, value: Usd| {
        ws.write_string_with_format(*row, 0, label, &s.label)?;
        ws.write_number_with_format(*row, 1, value.to_dollars(), &s.money)?;
        *row += 1;
        Ok::<(), XlsxError>(())
    };
    kpi_money(ws, &mut row, "Total revenue", t.revenue)?;
    kpi_money(ws, &mut row, "Total profit", t.profit)?;
    ws.write_string_with_format(row, 0, "Overall margin", &s.label)?;
    ws.write_number_with_format(row, 1, t.margin, &s.percent)?;
    row += 1;
    ws.write_string_with_format(row, 0, "Units sold", &s.label)?;
    ws.write_number_with_format(row, 1, t.units as f64, &s.number)?;
    row += 1;
    ws.write_string_with_format(row, 0, "Transactions", &s.label)?;
    ws.write_number_with_format(row, 1, t.transactions as f64, &s.number)?;
    row += 1;
    ws.write_string_with_format(row, 0, "Products", &s.label)?;
    ws.write_number_with_format(row, 1, t.products as f64, &s.number)?;
    row += 1;
    kpi_money(ws, &mut row, "Ad spend", t.ad_spend)?;
    ws.write_string_with_format(row, 0, "Average rating", &s.label)?;
    match t.avg_rating {
        Some(rating) => ws.write_string(row, 1, format!("{rating:.1}/5"))?,
        None => ws.write_string(row, 1, "n/a")?,
    };
    row += 1;
    ws.write_string_with_format(row, 0, "Alerts", &s.label)?;
    ws.write_number_with_format(row, 1, alerts.len() as f64, &s.number)?;

    // Color legend, beside the KPI block.
    ws.write_string_with_format(3, 3, "Color legend", &s.subheader)?;
    ws.write_string_with_format(4, 3, "CRITICAL", &s.critical)?;
    ws.write_string(4, 4, "act today")?;
    ws.write_string_with_format(5, 3, "WARNING", &s.warning)?;
    ws.write_string(5, 4, "needs attention")?;
    ws.write_string_with_format(6, 3, "INFO", &s.info)?;
    ws.write_string(6, 4, "worth knowing")?;
    ws.write_string_with_format(7, 3, "OK", &s.good)?;
    ws.write_string(7, 4, "no action needed")?;

    row += 2;
    ws.write_string_with_format(row, 0, "Top alerts", &s.subheader)?;
    row += 1;
    for alert in alerts.iter().take(5) {
        ws.write_string_with_format(row, 0, alert.severity.label(), s.severity(alert.severity))?;
        ws.write_string(row, 1, alert.kind.label())?;
        ws.write_string(row, 2, alert.sku.as_str())?;
        ws.write_string(row, 3, alert.message.as_str())?;
        row += 1;
    }
    if alerts.is_empty() {
        ws.write_string_with_format(row, 0, "OK", &s.good)?;
        ws.write_string(row, 1, "no alerts this run")?;
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Top products by profit", &s.subheader)?;
    row += 1;
    for (col, header) in ["Product", "Revenue", "Profit", "Margin"].iter().enumerate() {
        ws.write_string_with_format(row, col as u16, *header, &s.header)?;
    }
    row += 1;

    let mut top: Vec<&ProductMetrics> = metrics.products.values().collect();
    top.sort_by(|a, b| b.profit.cmp(&a.profit).then_with(|| a.sku.cmp(&b.sku)));
    top.truncate(config.top_n);
    let table_first = row;
    for product in &top {
        ws.write_string(row, 0, product_label(product))?;
        ws.write_number_with_format(row, 1, product.revenue.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 2, product.profit.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 3, product.margin, &s.percent)?;
        row += 1;
    }
    if !top.is_empty() {
        let last = row - 1;
        let mut chart = Chart::new(ChartType::Column);
        chart
            .add_series()
            .set_categories((DASHBOARD_SHEET, table_first, 0, last, 0))
            .set_values((DASHBOARD_SHEET, table_first, 2, last, 2))
            .set_name("Profit");
        chart.title().set_name("Top products by profit");
        chart.legend().set_hidden();
        ws.insert_chart(table_first, 5, &chart)?;
    }

    ws.set_column_width(0, 24)?;
    ws.set_column_width(1, 14)?;
    ws.set_column_width(2, 14)?;
    ws.set_column_width(3, 14)?;
    ws.set_column_width(4, 18)?;
    Ok(())
}

fn sales_sheet(
    ws: &mut Worksheet,
    s: &Styles,
    metrics: &Metrics,
    config: &Config,
) -> Result<(), XlsxError> {
    ws.set_name(SALES_SHEET)?;
    let headers = [
        "SKU", "Product", "Units", "Revenue", "Cost", "Ad spend", "Profit", "Margin",
    ];
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &s.header)?;
    }
    let mut row: u32 = 1;
    for product in metrics.products.values() {
        if product.units == 0 && product.revenue.is_zero() {
            continue;
        }
        ws.write_string(row, 0, product.sku.as_str())?;
        ws.write_string(row, 1, product.product.as_str())?;
        ws.write_number_with_format(row, 2, product.units as f64, &s.number)?;
        ws.write_number_with_format(row, 3, product.revenue.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 4, product.cost.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 5, product.ad_spend.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 6, product.profit.to_dollars(), &s.money)?;
        let margin_format = if !product.revenue.is_zero() && product.margin < config.low_margin {
            &s.percent_bad
        } else {
            &s.percent
        };
        ws.write_number_with_format(row, 7, product.margin, margin_format)?;
        row += 1;
    }
    if row > 1 {
        ws.autofilter(0, 0, row - 1, (headers.len() - 1) as u16)?;
    }
    ws.set_freeze_panes(1, 0)?;
    ws.set_column_width(0, 14)?;
    ws.set_column_width(1, 30)?;

    // Monthly revenue trend, off to the right of the product table.
    ws.write_string_with_format(0, 9, "Month", &s.header)?;
    ws.write_string_with_format(0, 10, "Revenue", &s.header)?;
    for (i, month) in metrics.monthly_revenue.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 9, month.month.as_str())?;
        ws.write_number_with_format(row, 10, month.revenue.to_dollars(), &s.money)?;
    }
    if !metrics.monthly_revenue.is_empty() {
        let last = metrics.monthly_revenue.len() as u32;
        let mut chart = Chart::new(ChartType::Line);
        chart
            .add_series()
            .set_categories((SALES_SHEET, 1, 9, last, 9))
            .set_values((SALES_SHEET, 1, 10, last, 10))
            .set_name("Revenue");
        chart.title().set_name("Monthly revenue");
        chart.legend().set_hidden();
        ws.insert_chart(last + 2, 9, &chart)?;
    }
    Ok(())
}

fn inventory_sheet(
    ws: &mut Worksheet,
    s: &Styles,
    metrics: &Metrics,
    config: &Config,
) -> Result<(), XlsxError> {
    ws.set_name(INVENTORY_SHEET)?;
    let headers = [
        "SKU",
        "Product",
        "Stock",
        "Inbound",
        "Avg daily sales",
        "Days of stock",
    ];
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &s.header)?;
    }
    let mut row: u32 = 1;
    for product in metrics.products.values() {
        let Some(stock) = product.stock else { continue };
        ws.write_string(row, 0, product.sku.as_str())?;
        ws.write_string(row, 1, product.product.as_str())?;
        ws.write_number_with_format(row, 2, stock as f64, &s.number)?;
        ws.write_number_with_format(row, 3, product.inbound as f64, &s.number)?;
        ws.write_number_with_format(row, 4, product.avg_daily_units, &s.days)?;
        match product.stock_days {
            Some(days) if days.is_infinite() => {
                ws.write_string(row, 5, "no sales")?;
            }
            Some(days) => {
                let format = if days <= config.stockout_days / 2.0 {
                    &s.days_out
                } else if days < config.stockout_days {
                    &s.days_low
                } else {
                    &s.days
                };
                ws.write_number_with_format(row, 5, days, format)?;
            }
            None => {
                ws.write_string(row, 5, "n/a")?;
            }
        }
        row += 1;
    }
    if row > 1 {
        ws.autofilter(0, 0, row - 1, (headers.len() - 1) as u16)?;
    }
    ws.set_freeze_panes(1, 0)?;
    ws.set_column_width(0, 14)?;
    ws.set_column_width(1, 30)?;
    ws.set_column_width(4, 14)?;
    ws.set_column_width(5, 14)?;
    Ok(())
}

fn advertising_sheet(
    ws: &mut Worksheet,
    s: &Styles,
    metrics: &Metrics,
    config: &Config,
) -> Result<(), XlsxError> {
    ws.set_name(ADVERTISING_SHEET)?;
    let headers = [
        "SKU",
        "Product",
        "Spend",
        "Clicks",
        "Impressions",
        "Orders",
        "Attributed sales",
        "ROI",
    ];
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &s.header)?;
    }
    let mut row: u32 = 1;
    for product in metrics.products.values() {
        if product.ad_spend.is_zero() && product.ad_clicks == 0 {
            continue;
        }
        let wasted = config.wasted_spend
            && product.ad_spend > Usd::ZERO
            && product.ad_orders == 0
            && product.ad_attributed.is_zero();
        ws.write_string(row, 0, product.sku.as_str())?;
        ws.write_string(row, 1, product.product.as_str())?;
        let spend_format = if wasted { &s.money_wasted } else { &s.money };
        ws.write_number_with_format(row, 2, product.ad_spend.to_dollars(), spend_format)?;
        ws.write_number_with_format(row, 3, product.ad_clicks as f64, &s.number)?;
        ws.write_number_with_format(row, 4, product.ad_impressions as f64, &s.number)?;
        ws.write_number_with_format(row, 5, product.ad_orders as f64, &s.number)?;
        ws.write_number_with_format(row, 6, product.ad_attributed.to_dollars(), &s.money)?;
        match product.ad_roi {
            Some(roi) => {
                ws.write_number_with_format(row, 7, roi, &s.days)?;
            }
            None => {
                ws.write_string(row, 7, "n/a")?;
            }
        }
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Campaigns", &s.subheader)?;
    row += 1;
    let campaign_headers = [
        "Campaign",
        "Spend",
        "Clicks",
        "Impressions",
        "Orders",
        "Attributed sales",
        "ROAS",
    ];
    for (col, header) in campaign_headers.iter().enumerate() {
        ws.write_string_with_format(row, col as u16, *header, &s.header)?;
    }
    row += 1;
    for campaign in &metrics.campaigns {
        ws.write_string(row, 0, campaign.campaign.as_str())?;
        ws.write_number_with_format(row, 1, campaign.spend.to_dollars(), &s.money)?;
        ws.write_number_with_format(row, 2, campaign.clicks as f64, &s.number)?;
        ws.write_number_with_format(row, 3, campaign.impressions as f64, &s.number)?;
        ws.write_number_with_format(row, 4, campaign.orders as f64, &s.number)?;
        ws.write_number_with_format(row, 5, campaign.attributed_sales.to_dollars(), &s.money)?;
        match campaign.roas {
            Some(roas) => {
                ws.write_number_with_format(row, 6, roas, &s.days)?;
            }
            None => {
                ws.write_string(row, 6, "n/a")?;
            }
        }
        row += 1;
    }
    ws.set_freeze_panes(1, 0)?;
    ws.set_column_width(0, 18)?;
    ws.set_column_width(1, 30)?;
    ws.set_column_width(6, 16)?;
    Ok(())
}

fn reviews_sheet(
    ws: &mut Worksheet,
    s: &Styles,
    metrics: &Metrics,
    config: &Config,
) -> Result<(), XlsxError> {
    ws.set_name(REVIEWS_SHEET)?;
    let headers = ["SKU", "Product", "Reviews", "Average rating"];
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &s.header)?;
    }
    let mut row: u32 = 1;
    for product in metrics.products.values() {
        let Some(rating) = product.avg_rating else {
            continue;
        };
        ws.write_string(row, 0, product.sku.as_str())?;
        ws.write_string(row, 1, product.product.as_str())?;
        ws.write_number_with_format(row, 2, f64::from(product.review_count), &s.number)?;
        let format = if rating < config.low_rating {
            &s.rating_low
        } else {
            &s.days
        };
        ws.write_number_with_format(row, 3, rating, format)?;
        row += 1;
    }
    row += 1;
    ws.write_string_with_format(row, 0, "All reviews", &s.label)?;
    ws.write_number_with_format(row, 2, f64::from(metrics.totals.review_count), &s.number)?;
    match metrics.totals.avg_rating {
        Some(rating) => {
            ws.write_number_with_format(row, 3, rating, &s.days)?;
        }
        None => {
            ws.write_string(row, 3, "n/a")?;
        }
    }
    ws.set_freeze_panes(1, 0)?;
    ws.set_column_width(0, 14)?;
    ws.set_column_width(1, 30)?;
    ws.set_column_width(3, 14)?;
    Ok(())
}

fn alerts_sheet(ws: &mut Worksheet, s: &Styles, alerts: &[Alert]) -> Result<(), XlsxError> {
    ws.set_name(ALERTS_SHEET)?;
    let headers = ["Severity", "Alert", "SKU", "Product", "Message"];
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &s.header)?;
    }
    for (i, alert) in alerts.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string_with_format(row, 0, alert.severity.label(), s.severity(alert.severity))?;
        ws.write_string(row, 1, alert.kind.label())?;
        ws.write_string(row, 2, alert.sku.as_str())?;
        ws.write_string(row, 3, alert.product.as_str())?;
        ws.write_string(row, 4, alert.message.as_str())?;
    }
    if !alerts.is_empty() {
        ws.autofilter(0, 0, alerts.len() as u32, (headers.len() - 1) as u16)?;
    }
    ws.set_freeze_panes(1, 0)?;
    ws.set_column_width(0, 12)?;
    ws.set_column_width(1, 16)?;
    ws.set_column_width(2, 14)?;
    ws.set_column_width(3, 30)?;
    ws.set_column_width(4, 60)?;
    Ok(())
}
