// Library crate - exports shared types and screening logic

pub mod accumulation;
pub mod cache;
pub mod fundamentals;
pub mod indicators;
pub mod launchpad;
pub mod patterns;
pub mod persistence;
pub mod provider;
pub mod regime;
pub mod report;
pub mod screener;
pub mod types;

// Re-export commonly used types
pub use types::*;
pub use regime::{MarketRegime, MarketStatus};
pub use screener::DayReport;
