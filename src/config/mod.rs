//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CliArgs, Command, CompileArgs, CompileOverrides, LoggingOverrides, RenderOverrides, ServeArgs,
    ServeOverrides, WorkspaceOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 13013;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_WORKSPACE_ROOT: &str = "temp";
const DEFAULT_RETENTION_SECS: u64 = 60 * 60;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_PLUGINS_DIR: &str = "plugins";
const DEFAULT_BROWSER_PATH: &str = "chromium";
const DEFAULT_SCRIPT_SETTLE_MS: u64 = 5_000;
const DEFAULT_PDF_ENGINE_PATH: &str = "weasyprint";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub workspace: WorkspaceSettings,
    pub render: RenderSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Shared root; each package owns `<root>/<id>`.
    pub root: PathBuf,
    pub retention: Duration,
    pub reaper_interval: Duration,
    pub reaper: bool,
    pub lazy_cleanup: bool,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub plugins_dir: PathBuf,
    pub browser_path: PathBuf,
    pub script_settle: Duration,
    pub pdf_engine_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Compile(args) => raw.apply_compile_overrides(&args.overrides),
        Command::Serve(args) => raw.apply_serve_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    workspace: RawWorkspaceSettings,
    render: RawRenderSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_compile_overrides(&mut self, overrides: &CompileOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        self.apply_workspace_overrides(&overrides.workspace);
        self.apply_render_overrides(&overrides.render);
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        self.apply_workspace_overrides(&overrides.workspace);
        self.apply_render_overrides(&overrides.render);

        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if overrides.no_reaper {
            self.workspace.reaper = Some(false);
        }
        if let Some(seconds) = overrides.retention_seconds {
            self.workspace.retention_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.reaper_interval_seconds {
            self.workspace.reaper_interval_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_workspace_overrides(&mut self, overrides: &WorkspaceOverrides) {
        if let Some(root) = overrides.workspace_root.as_ref() {
            self.workspace.root = Some(root.clone());
        }
        if overrides.lazy_cleanup {
            self.workspace.lazy_cleanup = Some(true);
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(dir) = overrides.plugins_dir.as_ref() {
            self.render.plugins_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.browser_path.as_ref() {
            self.render.browser_path = Some(path.clone());
        }
        if let Some(millis) = overrides.script_settle_ms {
            self.render.script_settle_ms = Some(millis);
        }
        if let Some(path) = overrides.pdf_engine_path.as_ref() {
            self.render.pdf_engine_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            workspace,
            render,
            uploads,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            workspace: build_workspace_settings(workspace)?,
            render: build_render_settings(render)?,
            uploads: build_upload_settings(uploads)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = non_zero_secs(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_workspace_settings(
    workspace: RawWorkspaceSettings,
) -> Result<WorkspaceSettings, LoadError> {
    let root = non_empty_path(
        workspace.root,
        DEFAULT_WORKSPACE_ROOT,
        "workspace.root",
    )?;
    let retention = non_zero_secs(
        workspace
            .retention_seconds
            .unwrap_or(DEFAULT_RETENTION_SECS),
        "workspace.retention_seconds",
    )?;
    let reaper_interval = non_zero_secs(
        workspace
            .reaper_interval_seconds
            .unwrap_or(DEFAULT_REAPER_INTERVAL_SECS),
        "workspace.reaper_interval_seconds",
    )?;

    Ok(WorkspaceSettings {
        root,
        retention,
        reaper_interval,
        reaper: workspace.reaper.unwrap_or(true),
        lazy_cleanup: workspace.lazy_cleanup.unwrap_or(false),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let plugins_dir = non_empty_path(render.plugins_dir, DEFAULT_PLUGINS_DIR, "render.plugins_dir")?;
    let browser_path = non_empty_path(
        render.browser_path,
        DEFAULT_BROWSER_PATH,
        "render.browser_path",
    )?;
    let pdf_engine_path = non_empty_path(
        render.pdf_engine_path,
        DEFAULT_PDF_ENGINE_PATH,
        "render.pdf_engine_path",
    )?;

    let settle_ms = render.script_settle_ms.unwrap_or(DEFAULT_SCRIPT_SETTLE_MS);
    if settle_ms == 0 {
        return Err(LoadError::invalid(
            "render.script_settle_ms",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        plugins_dir,
        browser_path,
        script_settle: Duration::from_millis(settle_ms),
        pdf_engine_path,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings { max_request_bytes })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkspaceSettings {
    root: Option<PathBuf>,
    retention_seconds: Option<u64>,
    reaper_interval_seconds: Option<u64>,
    reaper: Option<bool>,
    lazy_cleanup: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    plugins_dir: Option<PathBuf>,
    browser_path: Option<PathBuf>,
    script_settle_ms: Option<u64>,
    pdf_engine_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr, "0.0.0.0:13013".parse().unwrap());
        assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
        assert_eq!(settings.workspace.root, Path::new("temp"));
        assert_eq!(settings.workspace.retention, Duration::from_secs(3600));
        assert_eq!(settings.workspace.reaper_interval, Duration::from_secs(60));
        assert!(settings.workspace.reaper);
        assert!(!settings.workspace.lazy_cleanup);
        assert_eq!(settings.render.plugins_dir, Path::new("plugins"));
        assert_eq!(settings.render.browser_path, Path::new("chromium"));
        assert_eq!(settings.render.script_settle, Duration::from_secs(5));
        assert_eq!(settings.render.pdf_engine_path, Path::new("weasyprint"));
        assert_eq!(
            settings.uploads.max_request_bytes.get(),
            DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
        );
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            port: Some(4321),
            logging: LoggingOverrides {
                log_level: Some("debug".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn config_file_is_overridden_by_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        fs::write(
            &path,
            "[server]\nport = 9000\n\n[workspace]\nroot = \"/srv/folio\"\nretention_seconds = 120\n",
        )
        .unwrap();

        let args = CliArgs::parse_from([
            "folio",
            "--config-file",
            path.to_str().unwrap(),
            "serve",
            "-p",
            "9100",
        ]);
        let settings = load(&args).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 9100);
        assert_eq!(settings.workspace.root, Path::new("/srv/folio"));
        assert_eq!(settings.workspace.retention, Duration::from_secs(120));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut raw = RawSettings::default();
        raw.workspace.retention_seconds = Some(0);
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "workspace.retention_seconds",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn no_reaper_flag_disables_the_reaper() {
        let args = CliArgs::parse_from(["folio", "serve", "-z"]);
        let Command::Serve(serve) = args.command else {
            panic!("wrong command parsed");
        };
        assert!(serve.overrides.no_reaper);

        let mut raw = RawSettings::default();
        raw.apply_serve_overrides(&serve.overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(!settings.workspace.reaper);
    }

    #[test]
    fn parse_compile_arguments() {
        let args = CliArgs::parse_from([
            "folio",
            "compile",
            "books/novel.zip",
            "/tmp/novel-pdfs.zip",
            "--lazy-cleanup",
            "--browser-path",
            "/usr/bin/chromium-browser",
        ]);

        match args.command {
            Command::Compile(compile) => {
                assert_eq!(compile.source, Path::new("books/novel.zip"));
                assert_eq!(
                    compile.output.as_deref(),
                    Some(Path::new("/tmp/novel-pdfs.zip"))
                );
                assert!(compile.overrides.workspace.lazy_cleanup);

                let mut raw = RawSettings::default();
                raw.apply_compile_overrides(&compile.overrides);
                let settings = Settings::from_raw(raw).expect("valid settings");
                assert!(settings.workspace.lazy_cleanup);
                assert_eq!(
                    settings.render.browser_path,
                    Path::new("/usr/bin/chromium-browser")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "folio",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--retention-seconds",
            "60",
            "--log-json",
            "true",
        ]);

        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.host.as_deref(), Some("127.0.0.1"));
                assert_eq!(serve.overrides.port, Some(8080));
                assert_eq!(serve.overrides.retention_seconds, Some(60));
                assert_eq!(serve.overrides.logging.log_json, Some(true));
                assert!(!serve.overrides.no_reaper);
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn missing_subcommand_is_a_usage_error() {
        let err = CliArgs::try_parse_from(["folio"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
