pub mod worker_pool;

pub use worker_pool::{EvaluationWorkerPool, PoolReport};
