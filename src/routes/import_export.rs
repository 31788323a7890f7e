use crate::{
    auth::{PermissionsTarget, StagehandSession},
    data::student::Student,
    error::{CommitTransactionSnafu, StagehandResult},
    roster::{export::export_roster, import_roster},
    routes::{UploadedFile, read_file_field},
    state::StagehandState,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};
use serde_json::{Value, json};
use snafu::ResultExt;
use time::{OffsetDateTime, macros::format_description};

pub async fn post_import(
    State(state): State<StagehandState>,
    session: StagehandSession,
    mut multipart: Multipart,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::IMPORT_ROSTER)?;

    let UploadedFile { file_name, bytes } =
        read_file_field(&mut multipart, state.uploads().max_bytes()).await?;
    let config = state.config().import_config();
    info!(%file_name, size = bytes.len(), transactional = config.transactional, "Importing roster");

    let report = if config.transactional {
        let mut tx = state.get_transaction().await?;
        let report = import_roster(&file_name, &bytes, &mut *tx, config).await?;
        tx.commit().await.context(CommitTransactionSnafu)?;
        report
    } else {
        let mut conn = state.get_connection().await?;
        import_roster(&file_name, &bytes, &mut *conn, config).await?
    };

    Ok(Json(json!({ "result": report })))
}

pub async fn get_export(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<impl IntoResponse> {
    session.ensure_can(PermissionsTarget::EXPORT_ROSTER)?;

    let students = Student::get_all_by_name(&mut *state.get_connection().await?).await?;
    let csv = export_roster(&students)?;

    let today = OffsetDateTime::now_utc()
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();
    let disposition = format!("attachment; filename=\"etudiants_{today}.csv\"");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
