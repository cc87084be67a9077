use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub schema_version: String,
    pub snapshot: Option<PathBuf>,
    pub object: Option<String>,
    pub run_dir: PathBuf,
    /// Effective options for the command, as written to `config.json`.
    pub options: Value,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    command: &'a str,
    cli_version: &'a str,
    schema_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    object: Option<&'a str>,
    options: &'a Value,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
}

impl RunPaths {
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn run_root(ctx: &RunContext) -> PathBuf {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id))
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let root = run_root(ctx);
    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        command: &ctx.command,
        cli_version: env!("CARGO_PKG_VERSION"),
        schema_version: &ctx.schema_version,
        snapshot: ctx.snapshot.as_ref().map(|path| path.display().to_string()),
        object: ctx.object.as_deref(),
        options: &ctx.options,
    };
    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        config_path,
        logs_path,
    })
}

pub fn write_artifact<T: Serialize + ?Sized>(
    paths: &RunPaths,
    name: &str,
    value: &T,
) -> RegistryResult<PathBuf> {
    let path = paths.artifact(name);
    write_json(&path, value)?;
    Ok(path)
}

pub fn write_text_artifact(paths: &RunPaths, name: &str, text: &str) -> RegistryResult<PathBuf> {
    let path = paths.artifact(name);
    std::fs::write(&path, text)?;
    Ok(path)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
