use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use survey_progress::config::{DEFAULT_CONFIG_FILE, Settings};
use survey_progress::coordination::CancelFlag;
use survey_progress::runner::{IngestArgs, IngestResult, SourceMode, run_ingest};

#[derive(Parser, Clone)]
#[command(version, about = "Fetch and merge survey programme progress reports")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Download every run report of the programme and merge them
    Fetch {
        /// Report directory URL or local directory (default: portal.report_base_url)
        #[arg(long)]
        base_url: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Merge run reports saved by an earlier fetch
    Replay {
        /// Directory of saved reports (default: the raw directory of --date)
        #[arg(long)]
        from: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Clone, ClapArgs)]
struct CommonArgs {
    /// Settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Programme id (overrides program.id)
    #[arg(short, long)]
    program: Option<String>,

    /// Output root directory (overrides program.output_root)
    #[arg(short, long)]
    output_root: Option<PathBuf>,

    /// Rows dropped from the start of every run after the first
    #[arg(short, long)]
    skip_count: Option<usize>,

    /// Date of the output directory, YYYY-MM-DD (default: today, UTC)
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Print distinct value counts of these summary columns
    #[arg(long = "counts", value_name = "COLUMN", num_args = 1..)]
    counts: Vec<String>,

    /// Scatter plot of two summary columns (format: x:y)
    #[arg(long = "plot", value_name = "X:Y")]
    plots: Vec<String>,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mode, common) = match args.command {
        Command::Fetch { base_url, common } => (SourceMode::Fetch { base_url }, common),
        Command::Replay { from, common } => (SourceMode::Replay { from }, common),
    };

    run_command(mode, common).await
}

async fn run_command(mode: SourceMode, common: CommonArgs) -> anyhow::Result<()> {
    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if common.quiet {
        EnvFilter::new("survey_progress=warn")
    } else {
        EnvFilter::new("survey_progress=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let settings = Settings::load(&common.config)?;
    let plots = common
        .plots
        .iter()
        .map(|pair| cli::parse_plot_pair(pair))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut ingest_args = IngestArgs::new(settings, mode);
    ingest_args.program_id = common.program;
    ingest_args.output_root = common.output_root;
    ingest_args.skip_count = common.skip_count;
    if let Some(date) = common.date {
        ingest_args.date = date;
    }
    ingest_args.count_columns = common.counts;
    ingest_args.plots = plots;
    ingest_args.quiet = common.quiet;

    if !common.quiet {
        let program_id = ingest_args
            .program_id
            .as_deref()
            .unwrap_or(&ingest_args.settings.program.id);
        println!("Survey Progress");
        println!("===============");
        println!("Programme: {}", program_id);
        match &ingest_args.mode {
            SourceMode::Fetch { .. } => println!("Mode: fetch"),
            SourceMode::Replay { .. } => println!("Mode: replay"),
        }
        println!("Date: {}", ingest_args.date);
        println!();
    }

    // Stop before the next run when interrupted
    let cancel = CancelFlag::new();
    ingest_args.cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping before the next run");
            cancel.cancel();
        }
    });

    let result = run_ingest(ingest_args).await?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &IngestResult) {
    println!();
    println!("Ingest Summary");
    println!("==============");
    println!("Invocation ID: {}", result.invocation_id);
    println!(
        "Runs merged: {}",
        result
            .summary
            .runs()
            .iter()
            .map(|r| r.to_string())
            .collect::<String>()
    );
    if let Some(stopped_at) = result.stats.stopped_at {
        println!("Stopped at: run {} (not found)", stopped_at);
    }
    println!("Summary rows: {}", result.summary.num_rows());
    println!("Rows skipped: {}", result.stats.rows_skipped);
    println!("Bytes fetched: {}", result.stats.bytes_fetched);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    println!("Output: {}", result.output_dir.display());
    println!("Manifest: {}", result.manifest_path.display());

    for (column, counts) in &result.counts {
        println!();
        println!("Value counts of {}", column);
        let width = counts.keys().map(|k| k.len()).max().unwrap_or(0).max(6);
        for (value, count) in counts {
            let value = if value.is_empty() { "<null>" } else { value };
            println!("  {:<width$}  {}", value, count, width = width);
        }
    }

    if !result.plots.is_empty() {
        println!();
        println!("Plots:");
        for plot in &result.plots {
            println!("  {}", plot.display());
        }
    }
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    /// Parse an `x:y` column pair
    pub fn parse_plot_pair(pair: &str) -> anyhow::Result<(String, String)> {
        let parts: Vec<&str> = pair.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!(
                "Invalid plot '{}'. Expected format: 'x_column:y_column'",
                pair
            ));
        }

        let x = parts[0].trim();
        let y = parts[1].trim();
        if x.is_empty() || y.is_empty() {
            return Err(anyhow::anyhow!("Column names cannot be empty in plot '{}'", pair));
        }

        Ok((x.to_string(), y.to_string()))
    }

}
