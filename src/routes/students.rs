use crate::{
    auth::{PermissionsTarget, StagehandSession},
    data::{
        DataType,
        convention::Convention,
        student::{Student, StudentForm},
    },
    error::{CommitTransactionSnafu, MissingStudentSnafu, StagehandResult, StudentConflictSnafu},
    state::StagehandState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, ensure};

pub async fn get_students(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let students = Student::get_all(&mut *state.get_connection().await?).await?;
    Ok(Json(json!({ "students": students })))
}

pub async fn post_student(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Json(form): Json<StudentForm>,
) -> StagehandResult<(StatusCode, Json<Value>)> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;
    let email_ci = state.config().import_config().email_case_insensitive;
    let form = form.validated(email_ci)?;

    let mut conn = state.get_connection().await?;
    ensure!(
        Student::find_conflict(form.identity(), email_ci, None, &mut conn)
            .await?
            .is_none(),
        StudentConflictSnafu
    );

    let id = Student::insert_into_database(form, &mut conn).await?;
    let student = Student::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingStudentSnafu { id })?;
    info!(id, email = %student.email, "Added student");

    Ok((StatusCode::CREATED, Json(json!({ "student": student }))))
}

pub async fn put_student(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Path(id): Path<i32>,
    Json(form): Json<StudentForm>,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;
    let email_ci = state.config().import_config().email_case_insensitive;
    let form = form.validated(email_ci)?;

    let mut conn = state.get_connection().await?;
    ensure!(
        Student::get_from_db_by_id(id, &mut conn).await?.is_some(),
        MissingStudentSnafu { id }
    );
    ensure!(
        Student::find_conflict(form.identity(), email_ci, Some(id), &mut conn)
            .await?
            .is_none(),
        StudentConflictSnafu
    );

    let student = Student::update(id, form, &mut conn).await?;
    info!(id, "Updated student");

    Ok(Json(json!({ "student": student })))
}

pub async fn delete_student(
    State(state): State<StagehandState>,
    session: StagehandSession,
    Path(id): Path<i32>,
) -> StagehandResult<Json<Value>> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let mut tx = state.get_transaction().await?;
    let files = Convention::uploaded_files_for_student(id, &mut tx).await?;
    Student::remove_from_database(id, &mut tx).await?;
    tx.commit().await.context(CommitTransactionSnafu)?;

    // rows are gone, stray files are only a disk-space problem
    for file in files {
        if let Err(e) = state.uploads().remove(&file).await {
            warn!(?e, ?file, "Unable to remove upload of deleted student");
        }
    }
    info!(id, "Deleted student");

    Ok(Json(json!({ "message": "Étudiant supprimé avec succès" })))
}
