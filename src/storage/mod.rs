//! File system storage operations
//!
//! Currently just NDJSON reading and writing, used for step trail export.

mod ndjson;

pub use ndjson::{NdjsonReader, NdjsonWriter};
