use crate::error::{FileTooLargeSnafu, MissingFileFieldSnafu, MultipartSnafu, StagehandResult};
use axum::{body::Bytes, extract::Multipart};
use snafu::{ResultExt, ensure};

pub mod admin;
pub mod conventions;
pub mod import_export;
pub mod index;
pub mod login;
pub mod profile;
pub mod students;

/// An uploaded file, as sent in a multipart `file` field.
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Pulls the `file` field out of a multipart body, ignoring any other fields.
pub async fn read_file_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> StagehandResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.context(MultipartSnafu)?;
        ensure!(
            bytes.len() <= max_bytes,
            FileTooLargeSnafu {
                size: bytes.len(),
                max: max_bytes
            }
        );

        return Ok(UploadedFile { file_name, bytes });
    }

    MissingFileFieldSnafu.fail()
}
