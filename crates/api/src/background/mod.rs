//! Background jobs.
//!
//! Each job implements [`RecurringJob`](pulseboard_core::tasks::RecurringJob)
//! and is driven by a `RecurringTask` started in `main`.

pub mod expiry_sweeper;

pub use expiry_sweeper::ExpirySweeper;
