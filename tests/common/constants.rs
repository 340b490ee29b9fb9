//! Shared constants for end-to-end tests

pub const TEST_BASE_URL: &str = "http://charts.test/charts";

pub const TEST_CHART: &str = "hot-100";

/// First publication date used by the tests (a Saturday).
pub const FIRST_WEEK: &str = "2024-01-06";

/// Rows on a complete chart page.
pub const FULL_CHART: usize = 100;
