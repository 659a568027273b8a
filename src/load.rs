//! Category loaders: CSV files in, normalized typed rows out.
//!
//! Each category has a fixed column schema matched by (normalized) header
//! name, never by position. A file missing a required column fails as a
//! whole and is reported; a row with a malformed numeric field is kept with
//! the field zeroed and a warning counted. No raw string ever reaches the
//! metric engine.

use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::DeserializeFromStr;
use tracing::{info, warn};

use std::{
    io,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::classify::{Category, RawFileSet};
use crate::usd::Usd;

/// One cell of a CSV row, deserialized leniently.
///
/// Deserialization never fails: blank cells become `Empty` and text that
/// does not parse as `T` becomes `Malformed`. The loader turns `Malformed`
/// into the field's zero value and counts a row warning; `Empty` is zero
/// without a warning.
#[derive(Clone, Copy, Debug)]
pub enum Field<T> {
    Value(T),
    Empty,
    Malformed,
}

impl<T: FromStr> Field<T> {
    fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            Field::Empty
        } else {
            raw.parse().map_or(Field::Malformed, Field::Value)
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Empty
    }
}

impl<'de, T: FromStr> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Field::from_raw(&raw))
    }
}

/// Takes a numeric field's value, zeroing it and counting a warning if the
/// source text was malformed.
fn numeric<T: Default>(field: Field<T>, warnings: &mut u32) -> T {
    match field {
        Field::Value(v) => v,
        Field::Empty => T::default(),
        Field::Malformed => {
            *warnings += 1;
            T::default()
        }
    }
}

fn date(field: Field<FlexDate>, warnings: &mut u32) -> Option<NaiveDate> {
    match field {
        Field::Value(d) => Some(d.0),
        Field::Empty => None,
        Field::Malformed => {
            *warnings += 1;
            None
        }
    }
}

/// A calendar date parsed against the formats seller exports actually use.
#[derive(Clone, Copy, Debug, DeserializeFromStr, PartialEq)]
pub struct FlexDate(pub NaiveDate);

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y.%m.%d"];

impl FromStr for FlexDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for format in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(s, format) {
                return Ok(Self(d));
            }
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(Self(dt.date()));
        }
        bail!("unrecognized date: {s:?}")
    }
}

/// A yes/no flag as seller exports write it: `Yes`, `true`, `1`, `y`, ...
#[derive(Clone, Copy, Debug, DeserializeFromStr, PartialEq)]
pub struct YesNo(pub bool);

impl FromStr for YesNo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Ok(Self(true)),
            "no" | "n" | "false" | "0" => Ok(Self(false)),
            other => bail!("expected yes/no value, got {other:?}"),
        }
    }
}

/// A sales transaction row.
#[derive(Clone, Debug)]
pub struct SalesRow {
    pub order_id: String,
    pub date: Option<NaiveDate>,
    pub sku: String,
    pub product: String,
    pub units: i64,
    pub unit_price: Usd,
    pub total: Usd,
    pub cost_of_goods: Usd,
    pub fulfillment_fee: Usd,
}

/// An inventory snapshot row.
#[derive(Clone, Debug)]
pub struct InventoryRow {
    pub sku: String,
    pub product: String,
    pub stock: i64,
    pub inbound: i64,
}

/// An advertising performance row. `sku` is `None` for campaign-level rows
/// that are not attributed to one product.
#[derive(Clone, Debug)]
pub struct AdRow {
    pub date: Option<NaiveDate>,
    pub campaign: String,
    pub sku: Option<String>,
    pub spend: Usd,
    pub clicks: i64,
    pub impressions: i64,
    pub orders: i64,
    pub attributed_sales: Usd,
}

/// A customer review row. Reviews usually carry only a product name; the
/// metric engine joins them to a SKU through the names seen in sales and
/// inventory data.
#[derive(Clone, Debug)]
pub struct ReviewRow {
    pub date: Option<NaiveDate>,
    pub sku: Option<String>,
    pub product: String,
    pub rating: f64,
    pub verified: bool,
}

/// A file that failed to load as a whole: unreadable, or missing a required
/// column. The category degrades to whatever its other files provided; the
/// run continues.
#[derive(Clone, Debug, Serialize)]
pub struct LoadFailure {
    pub category: Category,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything the loaders produced for one run.
#[derive(Debug, Default)]
pub struct Tables {
    pub sales: Vec<SalesRow>,
    pub inventory: Vec<InventoryRow>,
    pub advertising: Vec<AdRow>,
    pub reviews: Vec<ReviewRow>,
    pub row_warnings: u32,
    pub failures: Vec<LoadFailure>,
    pub files_loaded: usize,
}

impl Tables {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.sales.len() + self.inventory.len() + self.advertising.len() + self.reviews.len()
    }
}

/// Loads every discovered file, concatenating rows per category in the file
/// set's (sorted) order. Never fails: per-file problems become
/// [`LoadFailure`] entries and the affected category degrades.
#[must_use]
pub fn load_all(files: &RawFileSet) -> Tables {
    let mut tables = Tables::default();
    for category in Category::ALL {
        for path in files.files(category) {
            let outcome = match category {
                Category::Sales => load_sales(path).map(|(rows, w)| {
                    tables.sales.extend(rows);
                    w
                }),
                Category::Inventory => load_inventory(path).map(|(rows, w)| {
                    tables.inventory.extend(rows);
                    w
                }),
                Category::Advertising => load_advertising(path).map(|(rows, w)| {
                    tables.advertising.extend(rows);
                    w
                }),
                Category::Reviews => load_reviews(path).map(|(rows, w)| {
                    tables.reviews.extend(rows);
                    w
                }),
            };
            match outcome {
                Ok(warnings) => {
                    info!(
                        "{}: loaded as {category} ({warnings} row warning(s))",
                        path.display()
                    );
                    tables.files_loaded += 1;
                    tables.row_warnings += warnings;
                }
                Err(reason) => {
                    warn!("{}: {category} file not loaded: {reason}", path.display());
                    tables.failures.push(LoadFailure {
                        category,
                        path: path.clone(),
                        reason,
                    });
                }
            }
        }
    }
    tables
}

// Wire records: one serde struct per category, every numeric cell wrapped in
// `Field` so a bad value can never abort the row. The alias lists must stay
// in sync with the required-column tables below.

#[derive(Debug, Deserialize)]
struct SalesWire {
    order_id: String,
    #[serde(alias = "date", alias = "purchase_date")]
    order_date: Field<FlexDate>,
    sku: String,
    #[serde(alias = "product", alias = "title")]
    product_name: String,
    #[serde(alias = "qty", alias = "units")]
    quantity: Field<i64>,
    #[serde(alias = "item_price")]
    unit_price: Field<Usd>,
    #[serde(alias = "item_total", alias = "total")]
    total_amount: Field<Usd>,
    #[serde(default, alias = "cogs", alias = "unit_cost")]
    cost_of_goods: Field<Usd>,
    #[serde(default, alias = "fba_fee")]
    fulfillment_fee: Field<Usd>,
}

#[derive(Debug, Deserialize)]
struct InventoryWire {
    #[serde(alias = "sku")]
    asin: String,
    #[serde(alias = "product", alias = "title")]
    product_name: String,
    #[serde(alias = "available", alias = "stock")]
    current_stock: Field<i64>,
    #[serde(default, alias = "inbound")]
    inbound_to_amazon: Field<i64>,
}

#[derive(Debug, Deserialize)]
struct AdWire {
    #[serde(default)]
    date: Field<FlexDate>,
    #[serde(alias = "campaign")]
    campaign_name: String,
    #[serde(default, alias = "advertised_sku", alias = "asin")]
    sku: String,
    spend: Field<Usd>,
    #[serde(default)]
    clicks: Field<i64>,
    #[serde(default)]
    impressions: Field<i64>,
    #[serde(default, alias = "orders_attributed", alias = "conversions")]
    orders: Field<i64>,
    #[serde(default, alias = "attributed_sales", alias = "sales")]
    sales_attributed: Field<Usd>,
}

#[derive(Debug, Deserialize)]
struct ReviewWire {
    #[serde(default, alias = "date")]
    review_date: Field<FlexDate>,
    #[serde(default, alias = "asin")]
    sku: String,
    #[serde(alias = "product", alias = "title")]
    product_name: String,
    rating: Field<f64>,
    #[serde(default, alias = "verified")]
    verified_purchase: Field<YesNo>,
}

// Required columns per category: each entry is a column with its accepted
// aliases; at least one name from each entry must be present.

const SALES_REQUIRED: &[&[&str]] = &[
    &["order_id"],
    &["order_date", "date", "purchase_date"],
    &["sku"],
    &["product_name", "product", "title"],
    &["quantity", "qty", "units"],
    &["unit_price", "item_price"],
    &["total_amount", "item_total", "total"],
];

const INVENTORY_REQUIRED: &[&[&str]] = &[
    &["asin", "sku"],
    &["product_name", "product", "title"],
    &["current_stock", "available", "stock"],
];

const ADVERTISING_REQUIRED: &[&[&str]] = &[&["campaign_name", "campaign"], &["spend"]];

const REVIEWS_REQUIRED: &[&[&str]] = &[&["rating"], &["product_name", "product", "title"]];

/// Loads one sales CSV. Returns the rows and the row-warning count.
///
/// # Errors
///
/// Returns a reason string if the file cannot be opened or read, or if a
/// required column is missing.
pub fn load_sales(path: &Path) -> Result<(Vec<SalesRow>, u32), String> {
    let mut rdr = open(path)?;
    sales_rows(&mut rdr)
}

/// Loads one inventory CSV.
///
/// # Errors
///
/// As [`load_sales`].
pub fn load_inventory(path: &Path) -> Result<(Vec<InventoryRow>, u32), String> {
    let mut rdr = open(path)?;
    inventory_rows(&mut rdr)
}

/// Loads one advertising CSV.
///
/// # Errors
///
/// As [`load_sales`].
pub fn load_advertising(path: &Path) -> Result<(Vec<AdRow>, u32), String> {
    let mut rdr = open(path)?;
    ad_rows(&mut rdr)
}

/// Loads one reviews CSV.
///
/// # Errors
///
/// As [`load_sales`].
pub fn load_reviews(path: &Path) -> Result<(Vec<ReviewRow>, u32), String> {
    let mut rdr = open(path)?;
    review_rows(&mut rdr)
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, String> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format!("could not open: {e}"))
}

fn sales_rows<R: io::Read>(rdr: &mut csv::Reader<R>) -> Result<(Vec<SalesRow>, u32), String> {
    read_rows(rdr, SALES_REQUIRED, |wire: SalesWire, warnings| {
        if wire.sku.is_empty() {
            *warnings += 1;
            return None;
        }
        Some(SalesRow {
            order_id: wire.order_id,
            date: date(wire.order_date, warnings),
            sku: wire.sku,
            product: wire.product_name,
            units: numeric(wire.quantity, warnings),
            unit_price: numeric(wire.unit_price, warnings),
            total: numeric(wire.total_amount, warnings),
            cost_of_goods: numeric(wire.cost_of_goods, warnings),
            fulfillment_fee: numeric(wire.fulfillment_fee, warnings),
        })
    })
}

fn inventory_rows<R: io::Read>(
    rdr: &mut csv::Reader<R>,
) -> Result<(Vec<InventoryRow>, u32), String> {
    read_rows(rdr, INVENTORY_REQUIRED, |wire: InventoryWire, warnings| {
        if wire.asin.is_empty() {
            *warnings += 1;
            return None;
        }
        Some(InventoryRow {
            sku: wire.asin,
            product: wire.product_name,
            stock: numeric(wire.current_stock, warnings),
            inbound: numeric(wire.inbound_to_amazon, warnings),
        })
    })
}

fn ad_rows<R: io::Read>(rdr: &mut csv::Reader<R>) -> Result<(Vec<AdRow>, u32), String> {
    read_rows(rdr, ADVERTISING_REQUIRED, |wire: AdWire, warnings| {
        let sku = Some(wire.sku).filter(|s| !s.is_empty());
        Some(AdRow {
            date: date(wire.date, warnings),
            campaign: wire.campaign_name,
            sku,
            spend: numeric(wire.spend, warnings),
            clicks: numeric(wire.clicks, warnings),
            impressions: numeric(wire.impressions, warnings),
            orders: numeric(wire.orders, warnings),
            attributed_sales: numeric(wire.sales_attributed, warnings),
        })
    })
}

fn review_rows<R: io::Read>(rdr: &mut csv::Reader<R>) -> Result<(Vec<ReviewRow>, u32), String> {
    read_rows(rdr, REVIEWS_REQUIRED, |wire: ReviewWire, warnings| {
        let sku = Some(wire.sku).filter(|s| !s.is_empty());
        let verified: YesNo = match wire.verified_purchase {
            Field::Value(v) => v,
            Field::Empty => YesNo(false),
            Field::Malformed => {
                *warnings += 1;
                YesNo(false)
            }
        };
        Some(ReviewRow {
            date: date(wire.review_date, warnings),
            sku,
            product: wire.product_name,
            rating: numeric(wire.rating, warnings),
            verified: verified.0,
        })
    })
}

fn read_rows<R, W, T, F>(
    rdr: &mut csv::Reader<R>,
    required: &[&[&str]],
    mut convert: F,
) -> Result<(Vec<T>, u32), String>
where
    R: io::Read,
    W: serde::de::DeserializeOwned,
    F: FnMut(W, &mut u32) -> Option<T>,
{
    let headers: csv::StringRecord = rdr
        .headers()
        .map_err(|e| format!("could not read header row: {e}"))?
        .iter()
        .map(normalize_header)
        .collect();
    check_headers(&headers, required)?;

    let mut rows = Vec::new();
    let mut warnings = 0;
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping unreadable row: {e}");
                warnings += 1;
                continue;
            }
        };
        let wire: W = match record.deserialize(Some(&headers)) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("skipping row: {e}");
                warnings += 1;
                continue;
            }
        };
        if let Some(row) = convert(wire, &mut warnings) {
            rows.push(row);
        }
    }
    Ok((rows, warnings))
}

fn check_headers(headers: &csv::StringRecord, required: &[&[&str]]) -> Result<(), String> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|names| !names.iter().any(|n| headers.iter().any(|h| h == *n)))
        .map(|names| names[0])
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required column(s): {}", missing.join(", ")))
    }
}

/// Normalizes a header the way the loaders expect it: lowercased, trimmed,
/// runs of non-alphanumeric characters collapsed to one underscore. `Order
/// ID` and `order_id` name the same column.
fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut prev_underscore = false;
    for c in header.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}
