use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mgnify_mirror::api::MgnifyHttpClient;
use mgnify_mirror::app::{App, ProgressSink};
use mgnify_mirror::config::{ConfigLoader, ConfigOverrides};
use mgnify_mirror::domain::{EntityKind, StudyRelation};
use mgnify_mirror::error::MirrorError;
use mgnify_mirror::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "mgnify-mirror")]
#[command(about = "Incrementally mirror MGnify studies and samples to a local directory")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    options: MirrorArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Mirror every sample and its latest analysis (default)")]
    Samples,
    #[command(about = "Mirror studies of the target experiment type and their TSV download")]
    Studies,
    #[command(about = "Mirror studies, then samples")]
    All,
}

#[derive(Args)]
struct MirrorArgs {
    /// Destination directory path
    #[arg(long, short = 'd', global = true)]
    dest: Option<String>,

    /// JSON config file (defaults to ./mgnify-mirror.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// MGnify API root
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(long, global = true)]
    experiment_type: Option<String>,

    /// Accept studies of any experiment type
    #[arg(long, global = true)]
    any_experiment: bool,

    /// Substring a study download id must contain
    #[arg(long, global = true)]
    file_substring: Option<String>,

    #[arg(long, global = true)]
    study_relation: Option<StudyRelation>,

    /// Pick the run/analysis with the newest value of this attribute instead of the first
    #[arg(long, global = true)]
    newest_by: Option<String>,

    /// Log failed entities and carry on instead of aborting. Failed studies are
    /// retried on the next run; a failed sample keeps its partial record and is
    /// skipped from then on
    #[arg(long, global = true)]
    keep_going: bool,

    #[arg(long, global = true)]
    page_size: Option<u32>,

    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Print the final summary as JSON
    #[arg(long, global = true)]
    json: bool,
}

impl MirrorArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            dest: self.dest.clone(),
            experiment_type: self.experiment_type.clone(),
            file_substring: self.file_substring.clone(),
            any_experiment_type: self.any_experiment,
            study_relation: self.study_relation,
            newest_by: self.newest_by.clone(),
            keep_going: self.keep_going,
            page_size: self.page_size,
            max_retries: self.retries,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<MirrorError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MirrorError) -> u8 {
    match error {
        MirrorError::ConfigRead(_)
        | MirrorError::ConfigParse(_)
        | MirrorError::InvalidConfig(_)
        | MirrorError::InvalidPattern(_) => 2,
        err if err.is_remote() => 3,
        MirrorError::MissingEndpoint(_)
        | MirrorError::MissingField { .. }
        | MirrorError::UnsafeName { .. } => 3,
        _ => 1,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOGLEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output_mode = if cli.options.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let config = ConfigLoader::resolve(cli.options.config.as_deref(), cli.options.overrides())?;
    info!(
        "Config is:\n{}",
        serde_json::to_string_pretty(&config).into_diagnostic()?
    );

    let kinds = match cli.command.unwrap_or(Commands::Samples) {
        Commands::Samples => vec![EntityKind::Sample],
        Commands::Studies => vec![EntityKind::Study],
        Commands::All => vec![EntityKind::Study, EntityKind::Sample],
    };

    let client = MgnifyHttpClient::new(&config)?;
    let app = App::new(config, client);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Text => &TextOutput,
        OutputMode::Json => &JsonOutput,
    };
    let summary = app.mirror(&kinds, sink)?;

    match output_mode {
        OutputMode::Text => TextOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
    }
    if summary.error_count() > 0 {
        return Err(miette::Report::msg(format!(
            "{} entities failed; studies are retried on re-run, failed samples keep their partial record",
            summary.error_count()
        )));
    }
    Ok(())
}
