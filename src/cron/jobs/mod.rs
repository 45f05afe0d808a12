pub mod index_run;
pub mod prune_old_data;

pub use prune_old_data::{RetentionPolicy, RetentionState};
