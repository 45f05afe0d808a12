//! Utility functions for the poolwatch indexer.
//!
//! - [`retry`] - Bounded retry with exponential backoff
//! - [`validation`] - Record checks before storage
//! - [`dedup`] - Change-significance filter
//! - [`conversion`] - Decimal scaling and payload number parsing

mod conversion;
mod dedup;
mod retry;
mod validation;

// ============================================
// Re-exports
// ============================================

// Conversion utilities
pub use conversion::{units_to_f64, value_to_f64};

// Deduplication
pub use dedup::{ChangeDeduplicator, Observation};

// Retry
pub use retry::{RetryExecutor, RetryPolicy};

// Validation utilities
pub use validation::{
    check_market_data, check_pool_snapshot, check_price_snapshot, validate_market_data,
    validate_pool_snapshot, validate_price_snapshot, Rejection,
};
