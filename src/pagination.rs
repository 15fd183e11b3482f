//! This module defines the common functionality for paging transaction data.

/// The config for pagination.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The number of transactions per page when not specified in a request.
    pub default_page_size: u64,
    /// The hard cap on transactions per page. Requests above this are clamped,
    /// not rejected.
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested page size to the configured cap.
    pub fn clamp_page_size(&self, requested: u64) -> u64 {
        requested.min(self.max_page_size)
    }
}

/// Parse a raw page or page-size query parameter.
///
/// Returns `None` for anything that is not an integer of at least one: the
/// caller decides how to reject the request.
pub fn parse_page_param(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|&value| value >= 1)
}

/// The number of rows to skip for the given page.
pub fn page_offset(page: u64, page_size: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(page_size)
}

/// The number of pages needed to show `total` rows, `page_size` rows at a
/// time. An empty result set has zero pages.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    (total as f64 / page_size as f64).ceil() as u64
}

#[cfg(test)]
mod tests {
    use crate::pagination::{
        PaginationConfig, page_offset, parse_page_param, total_pages,
    };

    #[test]
    fn parses_valid_page_params() {
        assert_eq!(parse_page_param("1"), Some(1));
        assert_eq!(parse_page_param("25"), Some(25));
        assert_eq!(parse_page_param(" 3 "), Some(3));
    }

    #[test]
    fn rejects_invalid_page_params() {
        for raw in ["0", "-1", "1.5", "abc", "", "2x"] {
            assert_eq!(parse_page_param(raw), None, "want None for {raw:?}");
        }
    }

    #[test]
    fn clamps_page_size_to_cap() {
        let config = PaginationConfig::default();

        assert_eq!(config.clamp_page_size(500), 100);
        assert_eq!(config.clamp_page_size(100), 100);
        assert_eq!(config.clamp_page_size(10), 10);
    }

    #[test]
    fn first_page_has_no_offset() {
        assert_eq!(page_offset(1, 10), 0);
    }

    #[test]
    fn later_pages_skip_previous_rows() {
        assert_eq!(page_offset(2, 10), 10);
        assert_eq!(page_offset(5, 25), 100);
    }

    #[test]
    fn counts_pages_rounding_up() {
        let want = [(0, 0), (1, 1), (10, 1), (11, 2), (100, 10), (101, 11)];

        for (total, pages) in want {
            let got = total_pages(total, 10);

            assert_eq!(got, pages, "want {pages} pages for {total} rows, got {got}");
        }
    }

    #[test]
    fn single_page_when_page_size_exceeds_total() {
        assert_eq!(total_pages(3, 100), 1);
    }
}
