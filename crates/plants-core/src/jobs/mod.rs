//! Background job queue.
//!
//! `Job`, `JobKind` and `JobStatus` describe the work; `JobDb` persists it in
//! redb. The worker in `plants-server` polls `range_due` on every tick.

pub mod db;
pub mod job;

pub use db::JobDb;
pub use job::{Job, JobKind, JobStatus};
