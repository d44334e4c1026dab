//! Worker pool, batched upserts, progress reporting and recovery

pub mod audit;
mod progress;
mod recovery;
mod upsert;
mod worker;

pub use audit::{estimate_sources, purge_source, SourceEstimate};
pub use progress::{Broadcast, LogProgress, ProgressEvent, ProgressSink};
pub use recovery::Recovery;
pub use upsert::VectorUpserter;
pub use worker::{FileOutcome, ProcessingWorker, RunReport, ShutdownHandle};
