//! Core ETL (Extract, Transform, Load) abstractions
//!
//! This module provides the stage traits every job is built from and the
//! [`Pipeline`] that drives one job through them.

mod extract;
mod load;
mod pipeline;
mod transform;

pub use extract::Extractor;
pub use load::Loader;
pub use pipeline::{Pipeline, PipelineCounts};
pub use transform::{IdentityTransformer, TransformSummary, Transformed, Transformer};
