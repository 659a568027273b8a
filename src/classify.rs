use regex::RegexSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use std::{
    ffi::OsStr,
    fmt::Display,
    fs, io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// The report categories a seller export can belong to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Category {
    Sales,
    Inventory,
    Advertising,
    Reviews,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Sales,
        Category::Inventory,
        Category::Advertising,
        Category::Reviews,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Sales => "sales",
            Category::Inventory => "inventory",
            Category::Advertising => "advertising",
            Category::Reviews => "reviews",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// Keyword patterns per category, in priority order: the first category whose
// pattern matches the file name wins.
const PATTERNS: [(Category, &str); 4] = [
    (Category::Sales, r"sales|order|transaction"),
    (Category::Inventory, r"inventory|stock"),
    (
        Category::Advertising,
        r"advertis|ppc|sponsored|spend|campaign",
    ),
    (Category::Reviews, r"review|rating"),
];

fn pattern_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(PATTERNS.iter().map(|(_, p)| format!("(?i){p}")))
            .expect("category patterns are valid regexes")
    })
}

/// Returns the category for a file name, if any keyword matches.
///
/// Matching is case-insensitive, and only the file name is considered, never
/// the directory path.
///
/// # Examples
///
/// ```
/// use sellerdash::classify::{classify_name, Category};
///
/// assert_eq!(classify_name("Sample_Sales_Data.csv"), Some(Category::Sales));
/// assert_eq!(classify_name("notes.csv"), None);
/// ```
#[must_use]
pub fn classify_name(name: &str) -> Option<Category> {
    let matches = pattern_set().matches(name);
    matches.iter().next().map(|i| PATTERNS[i].0)
}

/// The CSV files discovered in a source directory, grouped by category.
///
/// Built once per run by [`discover`] and read-only afterwards. Files whose
/// names match no category keyword go in `skipped`; they take no further part
/// in the run.
#[derive(Debug, Default)]
pub struct RawFileSet {
    sales: Vec<PathBuf>,
    inventory: Vec<PathBuf>,
    advertising: Vec<PathBuf>,
    reviews: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl RawFileSet {
    #[must_use]
    pub fn files(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::Sales => &self.sales,
            Category::Inventory => &self.inventory,
            Category::Advertising => &self.advertising,
            Category::Reviews => &self.reviews,
        }
    }

    /// How many files matched any category.
    #[must_use]
    pub fn matched_count(&self) -> usize {
        Category::ALL.iter().map(|&c| self.files(c).len()).sum()
    }

    fn push(&mut self, category: Category, path: PathBuf) {
        match category {
            Category::Sales => self.sales.push(path),
            Category::Inventory => self.inventory.push(path),
            Category::Advertising => self.advertising.push(path),
            Category::Reviews => self.reviews.push(path),
        }
    }
}

/// Scans `dir` (non-recursively) for CSV files and classifies each one by
/// name.
///
/// Paths are sorted before classification, so the per-category file order,
/// and everything computed from it, is stable across runs regardless of how
/// the OS orders directory entries. Non-CSV files are ignored entirely.
///
/// # Errors
///
/// Returns any error from reading the directory. An empty or all-unmatched
/// directory is not an error here; the caller decides whether that is fatal.
pub fn discover(dir: &Path) -> io::Result<RawFileSet> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    let mut set = RawFileSet::default();
    for path in paths {
        let name = path.file_name().and_then(OsStr::to_str).unwrap_or_default();
        match classify_name(name) {
            Some(category) => {
                debug!("{name}: classified as {category}");
                set.push(category, path);
            }
            None => {
                warn!("{name}: no recognized category, skipping");
                set.skipped.push(path);
            }
        }
    }
    for category in Category::ALL {
        info!(
            "{category}: {} file(s) discovered",
            set.files(category).len()
        );
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_name_fn_matches_category_keywords() {
        assert_eq!(classify_name("sample_sales_data.csv"), Some(Category::Sales));
        assert_eq!(classify_name("ORDERS-2024.csv"), Some(Category::Sales));
        assert_eq!(classify_name("fba_inventory.csv"), Some(Category::Inventory));
        assert_eq!(classify_name("Stock Report.csv"), Some(Category::Inventory));
        assert_eq!(
            classify_name("sponsored_products.csv"),
            Some(Category::Advertising)
        );
        assert_eq!(classify_name("ppc_spend.csv"), Some(Category::Advertising));
        assert_eq!(classify_name("product_reviews.csv"), Some(Category::Reviews));
        assert_eq!(classify_name("seller-ratings.csv"), Some(Category::Reviews));
        assert_eq!(classify_name("holiday_notes.csv"), None);
    }

    #[test]
    fn classify_name_fn_first_category_wins() {
        // "stock_orders" matches both sales and inventory; sales has priority.
        assert_eq!(classify_name("stock_orders.csv"), Some(Category::Sales));
    }

    #[test]
    fn discover_fn_groups_fixture_files_by_category() {
        let set = discover(Path::new("testdata/run")).unwrap();
        assert_eq!(set.files(Category::Sales).len(), 1);
        assert_eq!(set.files(Category::Inventory).len(), 1);
        assert_eq!(set.files(Category::Advertising).len(), 1);
        assert_eq!(set.files(Category::Reviews).len(), 1);
        assert_eq!(set.matched_count(), 4);
        assert_eq!(set.skipped.len(), 1);
        assert!(set.skipped[0].ends_with("holiday_notes.csv"));
    }
}
