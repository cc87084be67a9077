mod atomic;
mod registry;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use recordsmith_core::{
    Error as CoreError, ObjectSchema, SCHEMA_VERSION, SchemaSnapshot, snapshot_json_schema,
    validate_snapshot, validate_snapshot_json,
};
use recordsmith_formula::EvalContext;
use recordsmith_generate::{
    GenerationError, RecordPipeline, parse_suggestions, write_records_csv, write_records_json,
};
use recordsmith_plan::{PlanCache, analyze_object_rules};
use recordsmith_validate::{
    BatchPreValidator, Deadline, SystemClock, ValidateError, load_records, render_report,
};
use registry::{
    RunContext, RunPaths, init_run_logging, start_run, write_artifact, write_text_artifact,
};
use serde_json::{Value, json};
use settings::{Settings, SettingsError, load_or_create_settings};
use thiserror::Error;
use uuid::Uuid;

const REPORT_MAX_EXAMPLES: usize = 10;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("validation error: {0}")]
    Validate(#[from] ValidateError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("unknown object: {0}")]
    UnknownObject(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Parser, Debug)]
#[command(name = "recordsmith", version, about = "Rule-aware test record generator")]
struct Cli {
    /// Settings file; created with defaults when missing.
    #[arg(long, global = true, default_value = "recordsmith.toml")]
    config: PathBuf,
    /// Output directory for runs.
    #[arg(long, global = true, default_value = "runs")]
    run_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze the object's validation rules.
    Analyze(SnapshotArgs),
    /// Build the generation plan for an object.
    Plan(SnapshotArgs),
    /// Generate, check and repair records.
    Generate(GenerateArgs),
    /// Pre-validate a batch of records against the object's rules.
    Validate(ValidateArgs),
    /// Print the snapshot JSON Schema, or check a snapshot against it.
    Schema(SchemaArgs),
}

#[derive(Args, Debug, Clone)]
struct SnapshotArgs {
    /// Schema snapshot JSON file.
    #[arg(long, value_name = "FILE")]
    snapshot: PathBuf,
    /// Object name inside the snapshot.
    #[arg(long, value_name = "NAME")]
    object: String,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    target: SnapshotArgs,
    /// Number of records to generate.
    #[arg(long, default_value_t = 100)]
    count: u64,
    /// Seed override for this run.
    #[arg(long)]
    seed: Option<u64>,
    /// Suggestions JSON (`{ "Field": ["value"] }`).
    #[arg(long, value_name = "FILE")]
    suggestions: Option<PathBuf>,
    /// Extra directory receiving records.json and records.csv.
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    target: SnapshotArgs,
    /// Records JSON array to check.
    #[arg(long, value_name = "FILE")]
    records: PathBuf,
    /// Wall-clock budget override in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Snapshot to check instead of printing the schema.
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Schema(args) => run_schema(args),
        Command::Analyze(args) => {
            let settings = load_or_create_settings(&cli.config)?;
            run_analyze(&cli.run_dir, &settings, args)
        }
        Command::Plan(args) => {
            let settings = load_or_create_settings(&cli.config)?;
            run_plan(&cli.run_dir, &settings, args)
        }
        Command::Generate(args) => {
            let settings = load_or_create_settings(&cli.config)?;
            run_generate(&cli.run_dir, settings, args)
        }
        Command::Validate(args) => {
            let settings = load_or_create_settings(&cli.config)?;
            run_validate(&cli.run_dir, settings, args).await
        }
    }
}

fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let schema = snapshot_json_schema()?;
    match args.snapshot {
        None => {
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Some(path) => {
            let snapshot = load_snapshot(&path)?;
            println!(
                "snapshot ok: {} object(s), schema_version {}",
                snapshot.objects.len(),
                snapshot.schema_version
            );
        }
    }
    Ok(())
}

fn run_analyze(run_dir: &Path, settings: &Settings, args: SnapshotArgs) -> Result<(), CliError> {
    let timer = Instant::now();
    let (paths, snapshot) = begin(run_dir, settings, "analyze", &args, json!({}))?;
    let object = find_object(&snapshot, &args.object)?;

    let analysis = analyze_object_rules(&object.name, &object.validation_rules);
    tracing::info!(
        event = "rules_analyzed",
        object = %object.name,
        rules = analysis.rule_count,
        dependencies = analysis.dependencies.len()
    );

    let path = write_artifact(&paths, "analysis.json", &analysis)?;
    tracing::info!(event = "analysis_written", path = %path.display());
    println!("{}", path.display());

    finish(timer);
    Ok(())
}

fn run_plan(run_dir: &Path, settings: &Settings, args: SnapshotArgs) -> Result<(), CliError> {
    let timer = Instant::now();
    let (paths, snapshot) = begin(run_dir, settings, "plan", &args, json!({}))?;
    let object = find_object(&snapshot, &args.object)?;

    let plan = PlanCache::new().plan_for(object);
    tracing::info!(
        event = "plan_built",
        object = %object.name,
        steps = plan.steps.len(),
        fingerprint = %plan.fingerprint,
        diagnostics = plan.diagnostics.len()
    );

    let path = write_artifact(&paths, "plan.json", plan.as_ref())?;
    tracing::info!(event = "plan_written", path = %path.display());
    println!("{}", path.display());

    finish(timer);
    Ok(())
}

fn run_generate(run_dir: &Path, settings: Settings, args: GenerateArgs) -> Result<(), CliError> {
    let timer = Instant::now();
    let mut options = settings.generation.to_options();
    if let Some(seed) = args.seed {
        options.seed = seed;
    }

    let run_options = json!({
        "count": args.count,
        "generation": &options,
        "suggestions": args.suggestions.as_ref().map(|path| path.display().to_string()),
    });
    let (paths, snapshot) = begin(run_dir, &settings, "generate", &args.target, run_options)?;
    let object = find_object(&snapshot, &args.target.object)?;

    let suggestions = match &args.suggestions {
        Some(path) => Some(parse_suggestions(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let mut pipeline = RecordPipeline::new(options);
    let run = pipeline.run(object, args.count, suggestions.as_ref());

    let records_path = write_artifact(&paths, "records.json", &run.records)?;
    let csv_path = paths.artifact("records.csv");
    let rows = write_records_csv(&csv_path, object, &run.records).map_err(GenerationError::from)?;
    tracing::info!(
        event = "records_written",
        json = %records_path.display(),
        csv = %csv_path.display(),
        rows = rows
    );

    write_artifact(&paths, "report.json", &run.report)?;
    if !run.rejected_suggestions.is_empty() {
        write_artifact(&paths, "rejected_suggestions.json", &run.rejected_suggestions)?;
    }

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out)?;
        write_records_json(&out.join("records.json"), &run.records)?;
        write_records_csv(&out.join("records.csv"), object, &run.records)
            .map_err(GenerationError::from)?;
        tracing::info!(event = "records_copied", path = %out.display());
    }

    println!(
        "{} generated ({} accepted, {} repaired, {} flagged) -> {}",
        run.report.records_generated,
        run.report.accepted,
        run.report.repaired,
        run.report.flagged,
        paths.root.display()
    );

    finish(timer);
    Ok(())
}

async fn run_validate(
    run_dir: &Path,
    settings: Settings,
    args: ValidateArgs,
) -> Result<(), CliError> {
    let timer = Instant::now();
    let mut options = settings.validation.clone();
    if let Some(timeout_ms) = args.timeout_ms {
        options.timeout_ms = Some(timeout_ms);
    }

    let run_options = json!({
        "records": args.records.display().to_string(),
        "validation": &options,
    });
    let (paths, snapshot) = begin(run_dir, &settings, "validate", &args.target, run_options)?;
    let object = find_object(&snapshot, &args.target.object)?.clone();

    let records = load_records(&args.records)?;
    tracing::info!(event = "records_loaded", count = records.len());

    let ctx = match settings.generation.reference_date {
        Some(date) => EvalContext::at_date(date),
        None => EvalContext::now(),
    };
    let budget = options.timeout();
    let validator = BatchPreValidator::with_options(options);

    let result = tokio::task::spawn_blocking(move || {
        let deadline = Deadline::new(Arc::new(SystemClock::new()), budget);
        validator.validate(&records, &object, &ctx, &deadline)
    })
    .await?;

    tracing::info!(
        event = "validation_finished",
        valid = result.is_valid,
        violations = result.violations.len(),
        warnings = result.warnings.len(),
        timed_out = result.performance.timed_out
    );

    write_artifact(&paths, "validation.json", &result)?;
    let report = render_report(&args.target.object, &result, REPORT_MAX_EXAMPLES);
    let report_path = write_text_artifact(&paths, "report.md", &report)?;

    println!(
        "{}: {} violation(s), {} warning(s) -> {}",
        if result.is_valid { "valid" } else { "invalid" },
        result.violations.len(),
        result.warnings.len(),
        report_path.display()
    );

    finish(timer);
    Ok(())
}

/// Load the snapshot, open the run directory and install logging.
fn begin(
    run_dir: &Path,
    settings: &Settings,
    command: &str,
    target: &SnapshotArgs,
    options: Value,
) -> Result<(RunPaths, SchemaSnapshot), CliError> {
    let snapshot = load_snapshot(&target.snapshot)?;

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: command.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        snapshot: Some(target.snapshot.clone()),
        object: Some(target.object.clone()),
        run_dir: run_dir.to_path_buf(),
        options,
    };

    let paths = start_run(&run_ctx)?;
    init_run_logging(&paths.logs_path, &settings.logging.level)?;

    tracing::info!(
        event = "run_started",
        run_id = %run_id,
        command = command,
        object = %target.object
    );

    Ok((paths, snapshot))
}

fn finish(timer: Instant) {
    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);
}

fn load_snapshot(path: &Path) -> Result<SchemaSnapshot, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&contents)?;

    let schema = snapshot_json_schema()?;
    let issues = validate_snapshot_json(&raw, &schema)?;
    if !issues.is_empty() {
        let details = issues
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CliError::InvalidSnapshot(details));
    }

    let snapshot: SchemaSnapshot = serde_json::from_value(raw)?;
    validate_snapshot(&snapshot)?;
    Ok(snapshot)
}

fn find_object<'a>(snapshot: &'a SchemaSnapshot, name: &str) -> Result<&'a ObjectSchema, CliError> {
    snapshot
        .object(name)
        .ok_or_else(|| CliError::UnknownObject(name.to_string()))
}
