use crate::{
    auth::{AuthUser, Role, hash_password},
    config::auth::DefaultAdmin,
    error::{MakeQuerySnafu, StagehandResult},
};
use secrecy::SecretString;
use serde::Serialize;
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: i32,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Admin {
    pub async fn get_by_id(id: i32, conn: &mut PgConnection) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_by_email(email: &str, conn: &mut PgConnection) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM admins WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    /// Creates the configured admin if nobody holds that email yet. Hands back the
    /// password when it was generated, so the caller can show it once outside the logs.
    pub async fn ensure_default(
        default: &DefaultAdmin,
        conn: &mut PgConnection,
    ) -> StagehandResult<Option<SecretString>> {
        if Self::get_by_email(&default.email, &mut *conn).await?.is_some() {
            return Ok(None);
        }

        let hashed = hash_password(default.password.clone()).await?;
        sqlx::query("INSERT INTO admins (email, password_hash, name) VALUES ($1, $2, $3) ON CONFLICT (email) DO NOTHING")
            .bind(&default.email)
            .bind(hashed)
            .bind(&default.name)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(announce_created(default))
    }

    pub fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: Role::Admin,
        }
    }
}

fn announce_created(default: &DefaultAdmin) -> Option<SecretString> {
    if default.password_was_generated {
        warn!(
            email = %default.email,
            "Created default admin with a generated password, set DEFAULT_ADMIN_PASSWORD to choose one"
        );
        Some(default.password.clone())
    } else {
        info!(email = %default.email, "Created default admin");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn announce_with_captured_logs(default: &DefaultAdmin) -> (Option<SecretString>, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let handed_back = tracing::subscriber::with_default(subscriber, || announce_created(default));
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        (handed_back, text)
    }

    #[test]
    fn generated_password_stays_out_of_the_logs() {
        let default = DefaultAdmin {
            email: "admin@ensam.ac.ma".into(),
            name: "Administrateur ENSAM".into(),
            password: SecretString::from("Zq8r2LmX0pVb7TcW"),
            password_was_generated: true,
        };

        let (handed_back, logs) = announce_with_captured_logs(&default);

        assert!(logs.contains("admin@ensam.ac.ma"));
        assert!(!logs.contains("Zq8r2LmX0pVb7TcW"));
        assert_eq!(handed_back.unwrap().expose_secret(), "Zq8r2LmX0pVb7TcW");
    }

    #[test]
    fn chosen_password_is_not_handed_back() {
        let default = DefaultAdmin {
            email: "admin@ensam.ac.ma".into(),
            name: "Administrateur ENSAM".into(),
            password: SecretString::from("choisi-par-moi"),
            password_was_generated: false,
        };

        let (handed_back, logs) = announce_with_captured_logs(&default);

        assert!(handed_back.is_none());
        assert!(!logs.contains("choisi-par-moi"));
    }
}
