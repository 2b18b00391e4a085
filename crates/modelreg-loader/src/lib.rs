pub mod args;
pub mod client;
pub mod source;
pub mod worker;

pub use client::WorkerClient;
pub use worker::{Backoff, Job, JobOutcome, Loader, WorkerConfig};
