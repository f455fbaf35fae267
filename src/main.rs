use clap::{Parser, Subcommand, builder::styling};
use etl_orchestrator::cli;
use etl_orchestrator::orchestrator::RunStatus;
use eyre::{Result, bail};
use owo_colors::OwoColorize;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// ETL orchestrator: extract, clean and load tabular data with an audit trail
#[derive(Parser)]
#[command(name = "etlo", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source settings from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// SQLite database to use instead of DATABASE_PATH
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job of a pipeline file
    Run {
        /// Pipeline definition (.yml, .yaml, .json or .json5)
        pipeline: PathBuf,

        /// Attempt every job even after one fails
        #[arg(long)]
        continue_on_failure: bool,

        /// Write the step trail to this NDJSON file
        #[arg(long)]
        trail: Option<PathBuf>,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline file without running it
    Check {
        /// Pipeline definition (.yml, .yaml, .json or .json5)
        pipeline: PathBuf,
    },

    /// Profile a delimited file
    Inspect {
        file: PathBuf,

        /// Field delimiter
        #[arg(short, long, default_value_t = ',')]
        delimiter: char,
    },

    /// Describe what an API endpoint returns
    Probe {
        /// Endpoint path relative to API_BASE_URL
        endpoint: String,
    },

    /// Show columns, row count and sample rows of a stored table
    Table { name: String },

    /// Copy a stored table to <name>_backup_<suffix>
    Backup {
        name: String,

        /// Backup suffix, defaults to the current UTC time
        #[arg(short, long)]
        suffix: Option<String>,
    },

    /// Show recent runs from the audit table, or the steps of a saved trail
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Read steps from an NDJSON trail written by `run --trail`
        #[arg(long)]
        trail: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = dotenvy::from_filename(&cli.env) {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let database = cli.database.as_deref();
    match cli.command {
        Commands::Run {
            pipeline,
            continue_on_failure,
            trail,
            json,
        } => {
            log::info!("Running {}", pipeline.display().bright_black());
            let run =
                cli::run_pipeline(&pipeline, database, continue_on_failure, trail.as_deref())
                    .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                cli::print_run_summary(&run);
            }
            if run.status != RunStatus::Success {
                bail!("Run '{}' finished with status {}", run.pipeline, run.status);
            }
        }
        Commands::Check { pipeline } => {
            let config = cli::check_pipeline(&pipeline)?;
            for job in &config.jobs {
                println!(
                    "  {} {} → {} ({} transform(s), {:?} load)",
                    "✓".green(),
                    job.name.cyan(),
                    job.target,
                    job.transforms.len(),
                    job.load.mode
                );
            }
        }
        Commands::Inspect { file, delimiter } => {
            let profile = cli::inspect_file(&file, delimiter)?;
            cli::print_file_profile(&profile);
        }
        Commands::Probe { endpoint } => {
            let profile = cli::probe_endpoint(&endpoint).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Table { name } => {
            let info = cli::table_info(&name, database)?;
            cli::print_table_info(&info);
        }
        Commands::Backup { name, suffix } => {
            let backup = cli::backup_table(&name, suffix.as_deref(), database)?;
            println!("{} {}", "✓".green(), backup);
        }
        Commands::History { limit, trail } => match trail {
            Some(path) => cli::print_trail(&cli::read_trail(&path, limit)?),
            None => {
                let runs = cli::history(limit, database)?;
                println!("{}", runs);
            }
        },
    }

    Ok(())
}
