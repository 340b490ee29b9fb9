//! Chart dates and chart records.

mod chart_date;
mod models;

pub use chart_date::{
    generate, ChartDate, ChartDates, DateRange, DateRangeError, WeekdayRounding,
    OLDEST_CHART_DATE,
};
pub use models::*;
