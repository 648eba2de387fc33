//! Analytics parameter and row types.
//!
//! Every rollup endpoint has a concrete parameter struct with a canonical
//! string form (sorted fields, resolved dates, defaults filled) and a
//! concrete row type. The canonical form feeds the cache key derivation in
//! [`key`], which is what makes identical requests hit identical cache
//! entries.

pub mod key;
pub mod params;
pub mod rows;

pub use key::{cache_key, ttl_secs, Endpoint, ANALYTICS_KEY_PREFIX};
pub use params::{
    CustomerStatsParams, DailyAggregateParams, DashboardParams, DateRange, ExamplesParams,
    GroupBy, SourceStatsParams, SummaryParams, TopicsParams, ToxicityParams, TrendParams,
};
pub use rows::{
    CustomerStatsRow, DailyAggregateRow, DashboardSummary, ExampleRow, Page, SentimentTrendPoint,
    SourceStatsRow, SummaryResponse, TopicRow, ToxicityStats, VolumePoint,
};
