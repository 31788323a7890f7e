use crate::{
    auth::session_store::SessionStore,
    error::{
        BcryptSnafu, JoinBlockingSnafu, StagehandError, StagehandResult, UnknownRoleSnafu,
    },
    state::StagehandState,
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use bcrypt::DEFAULT_COST;
use bitflags::bitflags;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::{fmt, str::FromStr};

pub mod backend;
pub mod session_store;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PermissionsTarget: u8 {
        const CRUD_STUDENTS =       0b0000_0001;
        const IMPORT_ROSTER =       0b0000_0010;
        const EXPORT_ROSTER =       0b0000_0100;
        const REVIEW_CONVENTIONS =  0b0000_1000;
        const WIPE_DATABASE =       0b0001_0000;

        const VIEW_OWN_PROFILE =    0b0010_0000;
        const GENERATE_CONVENTION = 0b0100_0000;
        const UPLOAD_CONVENTION =   0b1000_0000;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }

    pub fn permissions(self) -> PermissionsTarget {
        match self {
            Self::Admin => {
                PermissionsTarget::CRUD_STUDENTS
                    | PermissionsTarget::IMPORT_ROSTER
                    | PermissionsTarget::EXPORT_ROSTER
                    | PermissionsTarget::REVIEW_CONVENTIONS
                    | PermissionsTarget::WIPE_DATABASE
            }
            Self::Student => {
                PermissionsTarget::VIEW_OWN_PROFILE
                    | PermissionsTarget::GENERATE_CONVENTION
                    | PermissionsTarget::UPLOAD_CONVENTION
            }
        }
    }
}

impl FromStr for Role {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "student" => Ok(Self::Student),
            other => UnknownRoleSnafu { role: other }.fail(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is behind a bearer token. `id` points into `admins` or `students` depending on `role`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Extracted from `Authorization: Bearer <token>` on every protected route.
#[derive(Debug, Clone)]
pub struct StagehandSession {
    pub user: AuthUser,
    token_digest: String,
}

impl StagehandSession {
    pub fn can(&self, needed: PermissionsTarget) -> bool {
        self.user.role.permissions().contains(needed)
    }

    pub fn ensure_can(&self, needed: PermissionsTarget) -> StagehandResult<()> {
        if self.can(needed) {
            Ok(())
        } else {
            Err(StagehandError::IncorrectPermissions {
                needed,
                found: self.user.role.permissions(),
            })
        }
    }

    pub fn token_digest(&self) -> &str {
        &self.token_digest
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();

    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<StagehandState> for StagehandSession {
    type Rejection = StagehandError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &StagehandState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(StagehandError::Unauthenticated);
        };
        let token_digest = SessionStore::digest(token);

        let mut conn = state.get_connection().await?;
        match SessionStore::load(&token_digest, &mut conn).await? {
            Some(user) => Ok(Self { user, token_digest }),
            None => Err(StagehandError::Unauthenticated),
        }
    }
}

pub async fn hash_password(password: SecretString) -> StagehandResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password.expose_secret(), DEFAULT_COST))
        .await
        .context(JoinBlockingSnafu)?
        .context(BcryptSnafu)
}

pub async fn verify_password(password: SecretString, hash: String) -> StagehandResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password.expose_secret(), &hash))
        .await
        .context(JoinBlockingSnafu)?
        .context(BcryptSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/auth/verify");
        if let Some(header) = header {
            builder = builder.header(AUTHORIZATION, header);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_is_read_from_the_header() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[test]
    fn roles_have_disjoint_permissions() {
        let admin = Role::Admin.permissions();
        let student = Role::Student.permissions();

        assert!(admin.contains(PermissionsTarget::IMPORT_ROSTER));
        assert!(!admin.contains(PermissionsTarget::GENERATE_CONVENTION));
        assert!(student.contains(PermissionsTarget::UPLOAD_CONVENTION));
        assert!(admin.intersection(student).is_empty());
    }

    #[test]
    fn students_cannot_wipe_the_database() {
        let session = StagehandSession {
            user: AuthUser {
                id: 1,
                email: "ali@ensam.ac.ma".into(),
                name: "Ali Benali".into(),
                role: Role::Student,
            },
            token_digest: String::new(),
        };

        assert!(matches!(
            session.ensure_can(PermissionsTarget::WIPE_DATABASE),
            Err(StagehandError::IncorrectPermissions { .. })
        ));
        assert!(session.ensure_can(PermissionsTarget::VIEW_OWN_PROFILE).is_ok());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!(
            "professeur".parse::<Role>(),
            Err(StagehandError::UnknownRole { .. })
        ));
    }

    #[tokio::test]
    async fn password_hashes_verify() {
        let hash = hash_password(SecretString::from("correct horse")).await.unwrap();

        assert!(verify_password(SecretString::from("correct horse"), hash.clone()).await.unwrap());
        assert!(!verify_password(SecretString::from("wrong"), hash).await.unwrap());
    }
}
