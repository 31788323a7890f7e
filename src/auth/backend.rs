use crate::{
    auth::{AuthUser, hash_password, verify_password},
    data::{admin::Admin, student::Student},
    error::{
        AlreadyRegisteredSnafu, NotInRosterSnafu, PasswordTooShortSnafu, StagehandResult,
    },
};
use secrecy::{ExposeSecret, SecretString};
use snafu::ensure;
use sqlx::PgConnection;

pub enum StagehandCredentials {
    Admin {
        email: String,
        password: SecretString,
    },
    Student {
        email: String,
        password: SecretString,
    },
}

/// Checks credentials against the admins or students table.
///
/// `Ok(None)` covers unknown emails, unregistered students and wrong passwords alike, so
/// callers can't leak which one it was.
pub async fn authenticate(
    creds: StagehandCredentials,
    conn: &mut PgConnection,
) -> StagehandResult<Option<AuthUser>> {
    match creds {
        StagehandCredentials::Admin { email, password } => {
            let Some(admin) = Admin::get_by_email(email.trim(), conn).await? else {
                return Ok(None);
            };

            Ok(if verify_password(password, admin.password_hash.clone()).await? {
                Some(admin.auth_user())
            } else {
                None
            })
        }
        StagehandCredentials::Student { email, password } => {
            let Some((student, hash)) =
                Student::get_with_password_hash(email.trim(), conn).await?
            else {
                return Ok(None);
            };
            let Some(hash) = hash else {
                return Ok(None);
            };
            if !student.is_registered {
                return Ok(None);
            }

            Ok(if verify_password(password, hash).await? {
                Some(student.auth_user())
            } else {
                None
            })
        }
    }
}

/// A student can only create an account for an email that an admin already put in the
/// roster, and only once.
pub async fn register_student(
    email: &str,
    password: SecretString,
    min_password_len: usize,
    conn: &mut PgConnection,
) -> StagehandResult<Student> {
    let email = email.trim();
    ensure!(
        password.expose_secret().chars().count() >= min_password_len,
        PasswordTooShortSnafu {
            min: min_password_len
        }
    );

    let Some(student) = Student::get_by_email(email, conn).await? else {
        return NotInRosterSnafu { email }.fail();
    };
    ensure!(!student.is_registered, AlreadyRegisteredSnafu { email });

    let hash = hash_password(password).await?;
    Student::mark_registered(student.id, &hash, conn).await
}
