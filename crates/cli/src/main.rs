mod commands;
mod datafile;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use ooh_workflow::{Workflow, WorkflowConfig};
use tracing_subscriber::EnvFilter;

use commands::{CommandError, Context};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// OOH workflow tool: invoice numbering, plan derivations and campaigns.
#[derive(Parser)]
#[command(
    name = "ooh",
    version,
    about = "OOH workflow tool: invoice numbering, plan derivations and campaigns"
)]
struct Cli {
    /// JSON data file holding the document store
    #[arg(long, global = true, default_value = "ooh-data.json")]
    data: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the documents of a seed file into the store
    Seed {
        /// JSON file mapping collection -> id -> fields
        file: PathBuf,
    },

    /// Print a document, or every document of a collection
    Show {
        collection: String,
        id: Option<String>,
    },

    /// Assign the next invoice number to a pending invoice
    NumberInvoice {
        /// Pending invoice id
        id: String,
    },

    /// Copy a plan into a new campaign and mark it converted
    ConvertPlan {
        /// Plan id
        id: String,
    },

    /// Update a document's status and run the derivations it triggers
    SetStatus {
        collection: String,
        id: String,
        status: String,
    },

    /// Derive orders for confirmed plans that have none
    Reconcile {
        /// Report missing derivations without writing
        #[arg(long)]
        dry_run: bool,
    },
}

impl Commands {
    fn writes(&self) -> bool {
        !matches!(
            self,
            Commands::Show { .. } | Commands::Reconcile { dry_run: true }
        )
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli.command, &cli.data, cli.config.as_deref(), cli.output, cli.quiet) {
        report_error(&e.to_string(), cli.output, cli.quiet);
        process::exit(e.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("OOH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(
    command: Commands,
    data: &Path,
    config: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CommandError> {
    let config = WorkflowConfig::load(config).map_err(ooh_workflow::WorkflowError::from)?;
    let store = datafile::load(data)?;
    let ctx = Context {
        workflow: Workflow::new(Arc::new(store), config),
        output,
        quiet,
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to create tokio runtime: {}", e))?;
    let result = rt.block_on(dispatch(&ctx, &command));

    if command.writes() {
        datafile::save(ctx.workflow.store(), data)?;
    }
    result
}

async fn dispatch(ctx: &Context, command: &Commands) -> Result<(), CommandError> {
    match command {
        Commands::Seed { file } => commands::seed::cmd_seed(ctx, file).await,
        Commands::Show { collection, id } => {
            commands::show::cmd_show(ctx, collection, id.as_deref()).await
        }
        Commands::NumberInvoice { id } => commands::invoice::cmd_number_invoice(ctx, id).await,
        Commands::ConvertPlan { id } => commands::plan::cmd_convert_plan(ctx, id).await,
        Commands::SetStatus {
            collection,
            id,
            status,
        } => commands::plan::cmd_set_status(ctx, collection, id, status).await,
        Commands::Reconcile { dry_run } => commands::reconcile::cmd_reconcile(ctx, *dry_run).await,
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
