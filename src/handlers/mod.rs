pub mod judge;
pub mod metrics;
