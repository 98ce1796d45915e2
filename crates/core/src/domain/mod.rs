pub mod cohort;
pub mod listing;
pub mod money;
