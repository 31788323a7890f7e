use crate::{
    auth::{AuthUser, Role},
    data::{DataType, admin::Admin, student::Student},
    error::{MakeQuerySnafu, StagehandResult},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{RngCore, rng};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection};
use time::{Duration, OffsetDateTime};

/// Server-side bearer sessions. Clients only ever see the raw token, the table only
/// ever sees its SHA-256 digest.
pub struct SessionStore;

#[derive(FromRow)]
struct SessionRecord {
    role: String,
    subject_id: i32,
    expiry_date: OffsetDateTime,
}

#[derive(Debug)]
pub struct IssuedToken {
    pub token: SecretString,
    pub expires_at: OffsetDateTime,
}

impl SessionStore {
    const TOKEN_BYTES: usize = 32;

    pub fn generate_token() -> String {
        let mut bytes = [0_u8; Self::TOKEN_BYTES];
        rng().fill_bytes(&mut bytes);
        BASE64_URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    pub async fn issue(
        user: &AuthUser,
        lifetime: Duration,
        conn: &mut PgConnection,
    ) -> StagehandResult<IssuedToken> {
        let token = Self::generate_token();
        let expires_at = OffsetDateTime::now_utc() + lifetime;

        sqlx::query(
            "INSERT INTO sessions (token_digest, role, subject_id, expiry_date) VALUES ($1, $2, $3, $4)",
        )
        .bind(Self::digest(&token))
        .bind(user.role.as_str())
        .bind(user.id)
        .bind(expires_at)
        .execute(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok(IssuedToken {
            token: SecretString::from(token),
            expires_at,
        })
    }

    /// Resolves a digest to its user, dropping the session if it has expired or its
    /// subject no longer exists.
    pub async fn load(
        token_digest: &str,
        conn: &mut PgConnection,
    ) -> StagehandResult<Option<AuthUser>> {
        let Some(record) = sqlx::query_as::<_, SessionRecord>(
            "SELECT role, subject_id, expiry_date FROM sessions WHERE token_digest = $1",
        )
        .bind(token_digest)
        .fetch_optional(&mut *conn)
        .await
        .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        if record.expiry_date < OffsetDateTime::now_utc() {
            Self::revoke(token_digest, conn).await?;
            return Ok(None);
        }

        let Ok(role) = record.role.parse::<Role>() else {
            warn!(role = %record.role, "Session with unknown role, revoking");
            Self::revoke(token_digest, conn).await?;
            return Ok(None);
        };

        let user = match role {
            Role::Admin => Admin::get_by_id(record.subject_id, &mut *conn)
                .await?
                .map(|admin| admin.auth_user()),
            Role::Student => Student::get_from_db_by_id(record.subject_id, &mut *conn)
                .await?
                .filter(|student| student.is_registered)
                .map(|student| student.auth_user()),
        };

        if user.is_none() {
            Self::revoke(token_digest, conn).await?;
        }
        Ok(user)
    }

    pub async fn revoke(token_digest: &str, conn: &mut PgConnection) -> StagehandResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_digest = $1")
            .bind(token_digest)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }

    pub async fn revoke_all_for(
        role: Role,
        subject_id: i32,
        conn: &mut PgConnection,
    ) -> StagehandResult<u64> {
        Ok(sqlx::query("DELETE FROM sessions WHERE role = $1 AND subject_id = $2")
            .bind(role.as_str())
            .bind(subject_id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    pub async fn delete_expired(conn: &mut PgConnection) -> StagehandResult<u64> {
        Ok(sqlx::query("DELETE FROM sessions WHERE expiry_date < now()")
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_long_and_unique() {
        let tokens: HashSet<_> = (0..64).map(|_| SessionStore::generate_token()).collect();
        assert_eq!(tokens.len(), 64);
        // 32 bytes, unpadded base64
        assert!(tokens.iter().all(|t| t.len() == 43));
    }

    #[test]
    fn digest_is_stable_hex_sha256() {
        assert_eq!(
            SessionStore::digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(SessionStore::digest("abc"), SessionStore::digest("abd"));
    }
}
