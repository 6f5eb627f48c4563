use std::{io::ErrorKind, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use tracing::{error, info};

use crate::{
    application::{error::HttpError, package::Package},
    domain::path::PathEntity,
    presentation::views::{StatusTemplate, UploadTemplate, render_template_response},
};

use super::{HttpState, upload::read_archive_field};

const SOURCE: &str = "infra::http::packages";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Run `assemble` on the blocking pool and log the outcome.
///
/// A failed build is only logged; the package stays in its building phase.
pub fn spawn_build(package: Arc<Package>) {
    tokio::task::spawn_blocking(move || match package.assemble() {
        Ok(()) => info!(
            target: "folio::package",
            package = package.id(),
            output = %package.output().path().display(),
            "package ready"
        ),
        Err(err) => error!(
            target: "folio::package",
            package = package.id(),
            error = %err,
            "package build failed"
        ),
    });
}

pub(super) async fn upload_form(State(state): State<HttpState>) -> Response {
    render_template_response(
        UploadTemplate::new(state.upload_limit.get()),
        StatusCode::OK,
    )
}

pub(super) async fn compile(
    State(state): State<HttpState>,
    mut multipart: Multipart,
) -> Result<Redirect, HttpError> {
    let upload = read_archive_field(&mut multipart).await?;

    let registry = Arc::clone(&state.registry);
    let package = tokio::task::spawn_blocking(move || registry.create_from_upload(&upload, None))
        .await
        .map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
        })??;

    let location = format!("/{}/wait", package.id());
    spawn_build(package);
    Ok(Redirect::to(&location))
}

pub(super) async fn wait_page(Path(id): Path<String>) -> Response {
    render_template_response(StatusTemplate { package_id: id }, StatusCode::OK)
}

pub(super) async fn status(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let package = lookup(&state, &id)?;
    let code = if package.is_ready() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((code, Json(package.status())).into_response())
}

/// Serve the finished archive. The file is read whole before responding.
pub(super) async fn download(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let package = lookup(&state, &id)?;
    if !package.is_ready() {
        return Err(HttpError::not_found(
            SOURCE,
            format!("package `{id}` is not ready"),
        ));
    }

    let output = package.output();
    let content = match tokio::fs::read(output.path()).await {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(HttpError::not_found(
                SOURCE,
                format!("output of package `{id}` is gone"),
            ));
        }
        Err(err) => {
            return Err(HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            ));
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", output.local_name());
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static(ZIP_CONTENT_TYPE)),
            (CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

fn lookup(state: &HttpState, id: &str) -> Result<Arc<Package>, HttpError> {
    state
        .registry
        .lookup(id)
        .ok_or_else(|| HttpError::not_found(SOURCE, format!("unknown package `{id}`")))
}
