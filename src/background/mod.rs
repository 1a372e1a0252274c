// Background loops: health probing and billing drain.

pub mod prober;
pub mod sweeper;

pub use prober::HealthProber;
pub use sweeper::{BillingSweeper, SweepStats};
