use crate::{
    auth::{
        Role, StagehandSession,
        backend::{StagehandCredentials, authenticate, register_student},
        session_store::SessionStore,
    },
    error::{CommitTransactionSnafu, InvalidCredentialsSnafu, StagehandResult},
    state::StagehandState,
};
use axum::{Json, extract::State};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::ResultExt;
use time::format_description::well_known::Rfc3339;

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: SecretString,
    role: String,
}

pub async fn post_login(
    State(state): State<StagehandState>,
    Json(LoginBody {
        email,
        password,
        role,
    }): Json<LoginBody>,
) -> StagehandResult<Json<Value>> {
    let creds = match role.parse::<Role>()? {
        Role::Admin => StagehandCredentials::Admin { email, password },
        Role::Student => StagehandCredentials::Student { email, password },
    };

    let mut conn = state.get_connection().await?;
    let Some(user) = authenticate(creds, &mut conn).await? else {
        warn!(%role, "Failed login attempt");
        return InvalidCredentialsSnafu.fail();
    };

    let issued =
        SessionStore::issue(&user, state.config().auth_config().token_lifetime, &mut conn).await?;
    info!(id = user.id, role = %user.role, "Logged in");

    Ok(Json(json!({
        "token": issued.token.expose_secret(),
        "expiresAt": issued.expires_at.format(&Rfc3339).ok(),
        "user": user,
    })))
}

#[derive(Deserialize)]
pub struct RegisterBody {
    email: String,
    password: SecretString,
}

pub async fn post_register(
    State(state): State<StagehandState>,
    Json(RegisterBody { email, password }): Json<RegisterBody>,
) -> StagehandResult<Json<Value>> {
    let min_password_len = state.config().auth_config().min_password_len;

    let mut tx = state.get_transaction().await?;
    let student = register_student(&email, password, min_password_len, &mut tx).await?;
    tx.commit().await.context(CommitTransactionSnafu)?;

    info!(id = student.id, email = %student.email, "Student registered");
    Ok(Json(json!({
        "message": "Compte créé avec succès",
        "student": student,
    })))
}

pub async fn post_verify(session: StagehandSession) -> Json<Value> {
    Json(json!({ "user": session.user }))
}

pub async fn post_logout(
    State(state): State<StagehandState>,
    session: StagehandSession,
) -> StagehandResult<Json<Value>> {
    let mut conn = state.get_connection().await?;
    SessionStore::revoke(session.token_digest(), &mut conn).await?;

    Ok(Json(json!({ "message": "Déconnexion réussie" })))
}
