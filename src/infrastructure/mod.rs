// Infrastructure for calltrace: project loading, SCIP indexing and the codebase handle.

pub mod codebase;
pub mod concurrency;
pub mod index_cache;
pub mod project_loader;
pub mod scip_runner;

pub use codebase::{Codebase, OpenOptions};
