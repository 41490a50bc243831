//! Seat availability scraped from the public course schedule (Ders Programı).
//!
//! Each subject branch has its own search page rendering one HTML table.
//! Rows carry the CRN in column 0, the capacity (Kontenjan) in column 9 and
//! the enrolled count (Yazılan) in column 10.

use std::collections::HashMap;
use std::sync::LazyLock;

use futures::future::join_all;
use html_scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::obs::ObsClient;

const CRN_COLUMN: usize = 0;
const CAPACITY_COLUMN: usize = 9;
const ENROLLED_COLUMN: usize = 10;
const MIN_COLUMNS: usize = 11;

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Capacity figures for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatInfo {
    pub capacity: u32,
    pub enrolled: u32,
    pub open: u32,
}

impl SeatInfo {
    pub fn new(capacity: u32, enrolled: u32) -> Self {
        Self {
            capacity,
            enrolled,
            open: capacity.saturating_sub(enrolled),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open > 0
    }
}

/// Seat data for the watched CRNs, gathered across every branch page.
#[derive(Debug, Clone, Default)]
pub struct SeatReport {
    pub seats: HashMap<String, SeatInfo>,
}

impl SeatReport {
    /// Fold another page's rows in. A CRN already seen keeps its first figures.
    pub fn merge(&mut self, parsed: HashMap<String, SeatInfo>) {
        for (crn, info) in parsed {
            self.seats.entry(crn).or_insert(info);
        }
    }

    /// Watched CRNs with at least one open seat, in watch-list order.
    pub fn open_crns(&self, watch: &[String]) -> Vec<String> {
        watch
            .iter()
            .filter(|crn| self.seats.get(*crn).is_some_and(SeatInfo::is_open))
            .cloned()
            .collect()
    }

    pub fn get(&self, crn: &str) -> Option<&SeatInfo> {
        self.seats.get(crn)
    }
}

/// Parse a schedule page, keeping only rows whose CRN is in `watch`.
pub fn parse_seat_table(html: &str, watch: &[String]) -> HashMap<String, SeatInfo> {
    let document = Html::parse_document(html);
    let mut seats = HashMap::new();

    // First row is the header.
    for row in document.select(&ROW_SELECTOR).skip(1) {
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(cell_text).collect();
        if cells.len() < MIN_COLUMNS {
            debug!(cells = cells.len(), "Skipping short schedule row");
            continue;
        }

        let crn = &cells[CRN_COLUMN];
        if crn.is_empty() || !watch.iter().any(|w| w == crn) {
            continue;
        }

        let info = SeatInfo::new(
            parse_count(&cells[CAPACITY_COLUMN]),
            parse_count(&cells[ENROLLED_COLUMN]),
        );
        seats.insert(crn.clone(), info);
    }

    seats
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Counts are plain digit strings; anything else reads as zero.
fn parse_count(text: &str) -> u32 {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    text.parse().unwrap_or(0)
}

/// Polls every configured branch page for the watched CRNs.
pub struct SeatChecker {
    /// Branch code → schedule search URL.
    pages: Vec<(String, String)>,
}

impl SeatChecker {
    pub fn new(pages: Vec<(String, String)>) -> Self {
        Self { pages }
    }

    pub fn branches(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|(code, _)| code.as_str())
    }

    /// Fetch every branch page and merge the watched rows.
    ///
    /// Pages are fetched concurrently but merged in configured order. A branch
    /// that fails to load is logged and skipped; the rest still count.
    pub async fn check(&self, client: &ObsClient, watch: &[String]) -> SeatReport {
        let pages = join_all(
            self.pages
                .iter()
                .map(|(branch, url)| async move { (branch, client.fetch_schedule(url).await) }),
        )
        .await;

        let mut report = SeatReport::default();
        for (branch, page) in pages {
            match page {
                Ok(html) => {
                    let parsed = parse_seat_table(&html, watch);
                    debug!(branch = branch.as_str(), found = parsed.len(), "Parsed schedule page");
                    report.merge(parsed);
                }
                Err(e) => {
                    warn!(branch = branch.as_str(), error = %e, "Failed to fetch schedule page, skipping");
                }
            }
        }

        report
    }
}
