use crate::{
    auth::{PermissionsTarget, StagehandSession},
    convention_document::render_convention,
    data::{
        DataType,
        convention::{Convention, ConventionStatus, NewConvention, StageType},
        student::Student,
    },
    error::{
        CommitTransactionSnafu, MissingConventionSnafu, MissingStudentSnafu,
        MissingUploadedFileSnafu, StagehandResult,
    },
    routes::{UploadedFile, read_file_field},
    state::StagehandState,
    uploads::content_type_for,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
};
use maud::Markup;
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, ensure};
use std::path::PathBuf;
use time::OffsetDateTime;

pub async fn get_all_conventions(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::REVIEW_CONVENTIONS)?;

    let conventions = Convention::get_all_with_students(&mut *state.get_connection().await?).await?;
    Ok(Json(json!({ "conventions": conventions })))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    status: String,
    #[serde(default)]
    notes: Option<String>,
}

pub async fn put_convention_status(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Path(id): Path<i32>,
    Json(StatusUpdate { status, notes }): Json<StatusUpdate>,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::REVIEW_CONVENTIONS)?;
    let status: ConventionStatus = status.parse()?;

    let convention =
        Convention::set_status(id, status, notes, &mut *state.get_connection().await?).await?;
    info!(id, status = status.as_str(), reviewer = session.user.id, "Convention reviewed");

    Ok(Json(json!({ "convention": convention })))
}

pub async fn get_convention_download(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Path(id): Path<i32>,
) -> StagehandResult<impl IntoResponse> {
    session.ensure_can(PermissionsTarget::REVIEW_CONVENTIONS)?;

    let convention = Convention::get_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingConventionSnafu { id })?;
    let path = convention
        .file_path
        .map(PathBuf::from)
        .context(MissingUploadedFileSnafu { id })?;
    let file_name = convention
        .file_name
        .unwrap_or_else(|| format!("convention_{id}"));

    let bytes = state.uploads().read(&path).await?;
    let content_type = content_type_for(&file_name, &bytes);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    ))
}

pub async fn get_my_conventions(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::VIEW_OWN_PROFILE)?;

    let conventions =
        Convention::get_all_for_student(session.user.id, &mut *state.get_connection().await?)
            .await?;
    Ok(Json(json!({ "conventions": conventions })))
}

/// Creates the student's one and only convention and hands back the printable document.
pub async fn get_generate_convention(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Markup> {
    session.ensure_can(PermissionsTarget::GENERATE_CONVENTION)?;
    let student_id = session.user.id;

    let mut tx = state.get_transaction().await?;
    let student = Student::get_from_db_by_id(student_id, &mut tx)
        .await?
        .context(MissingStudentSnafu { id: student_id })?;
    let type_stage = StageType::from_year(student.annee);

    let id = Convention::insert_new(
        NewConvention {
            student_id,
            type_stage,
        },
        &mut tx,
    )
    .await?;
    let document = render_convention(&student, type_stage, OffsetDateTime::now_utc().date())?;
    tx.commit().await.context(CommitTransactionSnafu)?;

    info!(id, student_id, type_stage = type_stage.as_str(), "Generated convention");
    Ok(document)
}

pub async fn post_upload_convention(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::UPLOAD_CONVENTION)?;

    let mut conn = state.get_connection().await?;
    let existing = Convention::get_by_id(id, &mut conn).await?;
    // someone else's convention looks exactly like a missing one
    ensure!(
        existing
            .as_ref()
            .is_some_and(|c| c.student_id == session.user.id),
        MissingConventionSnafu { id }
    );
    let previous = existing.and_then(|c| c.file_path).map(PathBuf::from);

    let UploadedFile { file_name, bytes } =
        read_file_field(&mut multipart, state.uploads().max_bytes()).await?;
    let stored = state.uploads().save(id, &file_name, &bytes).await?;

    let convention = match Convention::attach_signed_copy(id, &stored, &mut conn).await {
        Ok(c) => c,
        Err(e) => {
            if let Err(remove_error) = state.uploads().remove(&stored.path).await {
                warn!(?remove_error, "Unable to clean up orphaned upload");
            }
            return Err(e);
        }
    };

    if let Some(previous) = previous.filter(|p| *p != stored.path) {
        if let Err(e) = state.uploads().remove(&previous).await {
            warn!(?e, ?previous, "Unable to remove replaced upload");
        }
    }
    info!(id, file_name = %stored.file_name, "Signed convention uploaded");

    Ok(Json(json!({
        "message": "Convention téléchargée avec succès",
        "convention": convention,
    })))
}
