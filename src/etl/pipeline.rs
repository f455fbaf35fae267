//! Single-job pipeline over the stage traits

use super::{Extractor, Loader, Transformer};
use crate::error::EtlResult;
use crate::orchestrator::{JobContext, JobState};
use serde_json::json;

/// Row counts of a completed pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    pub rows_extracted: usize,
    pub rows_transformed: usize,
    pub rows_loaded: usize,
}

/// ETL Pipeline that drives one job through Extract, Transform, and Load
///
/// # Type Parameters
/// - `E`: Extractor type
/// - `T`: Transformer type
/// - `L`: Loader type
///
/// Every stage boundary is recorded on the caller's [`JobContext`]; the first
/// failing stage moves the job to `failed` and no later stage runs.
///
/// # Example
/// ```no_run
/// use etl_orchestrator::etl::{IdentityTransformer, Pipeline};
/// use etl_orchestrator::extract::FileExtractor;
/// use etl_orchestrator::load::{LoadStrategy, SqliteStore, TableLoader, TableTarget};
/// use etl_orchestrator::orchestrator::JobContext;
///
/// # async fn example() -> etl_orchestrator::error::EtlResult<()> {
/// let loader = TableLoader::new(SqliteStore::open("data.db")?);
/// let pipeline = Pipeline::new(
///     FileExtractor::new(vec!["users.csv".into()]),
///     IdentityTransformer::new(),
///     TableTarget::new(&loader, "users", LoadStrategy::Replace, 1000),
/// );
///
/// let mut ctx = JobContext::new("users");
/// let counts = pipeline.run(&mut ctx).await?;
/// println!("Loaded {} rows", counts.rows_loaded);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<E, T, L> {
    extractor: E,
    transformer: T,
    loader: L,
}

impl<E, T, L> Pipeline<E, T, L>
where
    E: Extractor,
    T: Transformer,
    L: Loader,
{
    /// Create a new pipeline
    pub fn new(extractor: E, transformer: T, loader: L) -> Self {
        Self {
            extractor,
            transformer,
            loader,
        }
    }

    /// Run the complete ETL pipeline for one job
    ///
    /// Steps:
    /// 1. Extract a table from the source
    /// 2. Apply the transformer
    /// 3. Load the result into the target
    ///
    /// # Errors
    /// Returns the first stage error; `ctx` is then in the `failed` state
    pub async fn run(&self, ctx: &mut JobContext) -> EtlResult<PipelineCounts> {
        log::info!("Starting ETL pipeline for job '{}'", ctx.job());

        let source = self.extractor.source();
        ctx.advance(JobState::Extracting, json!({ "source": source }));
        log::debug!("Extracting from {}...", source);
        let table = match self.extractor.extract().await {
            Ok(table) => table,
            Err(e) => {
                ctx.fail(&e);
                return Err(e);
            }
        };
        let rows_extracted = table.row_count();
        log::info!(
            "Extracted {} rows, {} columns",
            rows_extracted,
            table.column_count()
        );
        ctx.advance(
            JobState::Transforming,
            json!({
                "source": source,
                "rows_extracted": rows_extracted,
                "columns": table.column_names(),
            }),
        );

        log::debug!("Transforming table...");
        let transformed = match self.transformer.transform(table) {
            Ok(transformed) => transformed,
            Err(e) => {
                ctx.fail(&e);
                return Err(e);
            }
        };
        let rows_transformed = transformed.table.row_count();
        log::info!(
            "Transformed {} rows into {}",
            rows_extracted,
            rows_transformed
        );
        ctx.advance(
            JobState::Loading,
            json!({
                "rows_before": rows_extracted,
                "rows_after": rows_transformed,
                "summary": transformed.summary(),
                "directives": transformed.diagnostics,
            }),
        );

        log::debug!("Loading to {}...", self.loader.target());
        let rows_loaded = match self.loader.load(&transformed.table).await {
            Ok(count) => count,
            Err(e) => {
                ctx.fail(&e);
                return Err(e);
            }
        };
        log::info!("Loaded {} rows into {}", rows_loaded, self.loader.target());
        ctx.advance(
            JobState::Succeeded,
            json!({
                "target": self.loader.target(),
                "rows_loaded": rows_loaded,
            }),
        );

        Ok(PipelineCounts {
            rows_extracted,
            rows_transformed,
            rows_loaded,
        })
    }
}
