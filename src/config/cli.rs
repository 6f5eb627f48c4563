use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Build PDF book bundles from HTML packages"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build one package from an archive or a directory, then exit.
    Compile(CompileArgs),
    /// Run the HTTP upload service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Clone)]
pub struct CompileArgs {
    /// Zip archive or directory holding the book sources.
    #[arg(value_name = "SOURCE", value_hint = ValueHint::AnyPath)]
    pub source: PathBuf,

    /// Output archive; defaults to `out-<name>.zip` beside the source.
    #[arg(value_name = "OUTPUT", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CompileOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CompileOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub workspace: WorkspaceOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkspaceOverrides {
    /// Override the directory holding package working directories.
    #[arg(long = "workspace-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub workspace_root: Option<PathBuf>,

    /// Keep scratch HTML and working directories after each build.
    #[arg(long = "lazy-cleanup", action = ArgAction::SetTrue)]
    pub lazy_cleanup: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the directory searched for shared templates.
    #[arg(long = "plugins-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub plugins_dir: Option<PathBuf>,

    /// Override the headless browser executable.
    #[arg(long = "browser-path", value_name = "PATH")]
    pub browser_path: Option<PathBuf>,

    /// Override the time pages get to run their scripts.
    #[arg(long = "script-settle-ms", value_name = "MILLISECONDS")]
    pub script_settle_ms: Option<u64>,

    /// Override the WeasyPrint executable.
    #[arg(long = "pdf-engine-path", value_name = "PATH")]
    pub pdf_engine_path: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub workspace: WorkspaceOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the listener port.
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Do not start the background reaper.
    #[arg(short = 'z', long = "no-reaper", action = ArgAction::SetTrue)]
    pub no_reaper: bool,

    /// Override how long finished packages are kept.
    #[arg(long = "retention-seconds", value_name = "SECONDS")]
    pub retention_seconds: Option<u64>,

    /// Override the pause between two reaper sweeps.
    #[arg(long = "reaper-interval-seconds", value_name = "SECONDS")]
    pub reaper_interval_seconds: Option<u64>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

    /// Override the upload request body limit.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,
}
