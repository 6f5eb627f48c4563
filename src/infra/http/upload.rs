use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use tracing::error;

use crate::{application::error::HttpError, infra::uploads::BufferedUpload};

const SOURCE: &str = "infra::http::upload";
const ARCHIVE_FIELD: &str = "zip";
const FALLBACK_NAME: &str = "upload.zip";

#[derive(Debug)]
pub(super) enum UploadPayloadError {
    Missing,
    Empty,
    PayloadTooLarge,
    InvalidFormData,
    Read { detail: String },
}

impl From<UploadPayloadError> for HttpError {
    fn from(error: UploadPayloadError) -> Self {
        match error {
            UploadPayloadError::Missing => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Please choose a file to upload",
                format!("multipart field `{ARCHIVE_FIELD}` is missing"),
            ),
            UploadPayloadError::Empty => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Uploaded file is empty",
                "upload contained no bytes",
            ),
            UploadPayloadError::PayloadTooLarge => HttpError::new(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "File is too large",
                "upload exceeded the configured body limit",
            ),
            UploadPayloadError::InvalidFormData => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Upload form data was invalid",
                "multipart body could not be parsed",
            ),
            UploadPayloadError::Read { detail } => HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upload failed, please try again",
                detail,
            ),
        }
    }
}

/// Buffer the `zip` field of a multipart body, skipping every other field.
pub(super) async fn read_archive_field(
    multipart: &mut Multipart,
) -> Result<BufferedUpload, UploadPayloadError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(UploadPayloadError::Missing),
            Err(err) => return Err(classify(err.status(), err.to_string())),
        };

        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(|value| value.to_string())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_NAME.to_string());

        let content = field
            .bytes()
            .await
            .map_err(|err| classify(err.status(), err.to_string()))?;
        if content.is_empty() {
            return Err(UploadPayloadError::Empty);
        }

        return Ok(BufferedUpload::new(&file_name, content));
    }
}

fn classify(status: StatusCode, detail: String) -> UploadPayloadError {
    error!(
        target: "folio::http::upload",
        status = status.as_u16(),
        error = %detail,
        "failed to read multipart payload"
    );
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => UploadPayloadError::PayloadTooLarge,
        StatusCode::BAD_REQUEST => UploadPayloadError::InvalidFormData,
        _ => UploadPayloadError::Read { detail },
    }
}
