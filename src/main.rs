use std::{future::IntoFuture, path::PathBuf, process, sync::Arc, time::Duration};

use folio::{
    application::{
        error::AppError,
        package::BuildOptions,
        reaper,
        registry::Registry,
    },
    config::{self, Command, CompileArgs, Settings},
    domain::{error::PackageError, path::PathEntity},
    infra::{
        engines,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        match error {
            AppError::Interrupted => eprintln!("Execution interrupted"),
            ref error => report_application_error(error),
        }
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Command::Compile(args) => run_compile(settings, args).await,
        Command::Serve(_) => run_serve(settings).await,
    }
}

fn build_registry(settings: &Settings) -> Result<Registry, AppError> {
    let options = BuildOptions {
        lazy_cleanup: settings.workspace.lazy_cleanup,
        plugin_dirs: vec![settings.render.plugins_dir.clone()],
    };
    Registry::new(
        &settings.workspace.root,
        settings.workspace.retention,
        engines::from_settings(&settings.render),
        options,
    )
    .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn run_compile(settings: Settings, args: CompileArgs) -> Result<(), AppError> {
    let registry = build_registry(&settings)?;
    let CompileArgs { source, output, .. } = args;

    info!(
        target: "folio::compile",
        source = %source.display(),
        "Starting compile"
    );

    let build = tokio::task::spawn_blocking(move || -> Result<PathBuf, PackageError> {
        let package = registry.create_from_source(&source, output.as_deref())?;
        package.assemble()?;
        Ok(package.output().path().to_path_buf())
    });

    tokio::select! {
        joined = build => {
            let output = joined
                .map_err(|err| AppError::unexpected(format!("build task failed: {err}")))??;
            info!(
                target: "folio::compile",
                output = %output.display(),
                "Compile completed"
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => Err(AppError::Interrupted),
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let registry = Arc::new(build_registry(&settings)?);

    let reaper_handle = if settings.workspace.reaper {
        Some(reaper::spawn(
            Arc::clone(&registry),
            settings.workspace.reaper_interval,
        ))
    } else {
        info!(target: "folio::reaper", "reaper disabled");
        None
    };

    let state = HttpState {
        registry,
        upload_limit: settings.uploads.max_request_bytes,
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = reaper_handle {
        handle.shutdown().await;
    }

    result
}

async fn serve_http(settings: &Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(addr.to_string(), err)))?;
    info!(target: "folio::http", addr = %addr, "Listening");

    let (stopping_tx, stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!(target: "folio::http", "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!(target: "folio::http", "Shutdown requested, draining connections");
            let _ = stopping_tx.send(true);
        })
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = drain_deadline(stopping_rx, settings.server.graceful_shutdown) => {
            warn!(
                target: "folio::http",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

/// Resolves once shutdown has been requested and `timeout` has elapsed since.
async fn drain_deadline(mut stopping: watch::Receiver<bool>, timeout: Duration) {
    if stopping.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}
