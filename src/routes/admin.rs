use crate::{
    auth::{PermissionsTarget, StagehandSession},
    data::{convention::Convention, student::Student},
    error::{CommitTransactionSnafu, StagehandResult},
    state::StagehandState,
};
use axum::{Json, extract::State};
use serde_json::{Map, Value, json};
use snafu::ResultExt;

/// Drops every convention and student, then empties the uploads directory.
pub async fn delete_clear_database(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::WIPE_DATABASE)?;

    let mut tx = state.get_transaction().await?;
    let conventions = Convention::remove_all(&mut tx).await?;
    let students = Student::remove_all(&mut tx).await?;
    tx.commit().await.context(CommitTransactionSnafu)?;

    let files = state.uploads().wipe().await?;
    warn!(
        by = session.user.id,
        students, conventions, files, "Cleared the database"
    );

    Ok(Json(json!({
        "message": "Base de données vidée avec succès",
        "deletedStudents": students,
        "deletedConventions": conventions,
        "deletedFiles": files,
    })))
}

pub async fn get_statistics(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::REVIEW_CONVENTIONS)?;

    let mut conn = state.get_connection().await?;
    let (total_students, registered_students) = Student::count(&mut conn).await?;
    let by_status = Convention::count_by_status(&mut conn).await?;

    let total_conventions: i64 = by_status.iter().map(|(_, count)| count).sum();
    let by_status: Map<String, Value> = by_status
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count.into()))
        .collect();

    Ok(Json(json!({
        "totalStudents": total_students,
        "registeredStudents": registered_students,
        "totalConventions": total_conventions,
        "conventionsByStatus": by_status,
    })))
}
