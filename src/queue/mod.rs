//! Job queue: submission and workers.

mod dispatcher;
mod worker;

pub use dispatcher::{Dispatcher, SubmitError};
pub use worker::{JobFailure, JobRunner, WorkerPool};
