pub mod analytics;
pub mod burn_watch;
pub mod supply;

pub use analytics::{AnalyticsService, PriceLookup};
pub use burn_watch::BurnMonitor;
pub use supply::SupplyService;
