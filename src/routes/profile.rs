use crate::{
    auth::{PermissionsTarget, StagehandSession},
    data::{DataType, student::Student},
    error::{MissingStudentSnafu, StagehandResult},
    state::StagehandState,
};
use axum::{Json, extract::State};
use serde_json::{Value, json};
use snafu::OptionExt;

pub async fn get_profile(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::VIEW_OWN_PROFILE)?;
    let id = session.user.id;

    let student = Student::get_from_db_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingStudentSnafu { id })?;

    Ok(Json(json!({ "student": student })))
}
