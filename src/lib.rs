//! ETL Orchestrator
//!
//! Moves tabular records from flat files and paginated JSON APIs through
//! ordered cleaning directives into a SQLite store, recording every step.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod etl;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod storage;
pub mod table;
pub mod transform;

// Re-exports for convenience
pub use client::{ApiClient, Auth, AuthType, RetryPolicy};
pub use error::{EtlError, EtlResult};
pub use etl::{Extractor, IdentityTransformer, Loader, Pipeline, Transformer};
pub use load::{LoadStrategy, SqliteStore, TableLoader, TableTarget};
pub use orchestrator::{JobSpec, Orchestrator, RunResult, RunStatus};
pub use storage::{NdjsonReader, NdjsonWriter};
pub use table::{Column, DataType, Table, Value};
