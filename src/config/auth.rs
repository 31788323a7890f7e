use crate::{
    config::{number_var_or, optional_var},
    error::StagehandResult,
};
use rand::{Rng, distr::Alphanumeric, rng};
use secrecy::SecretString;
use time::Duration;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_lifetime: Duration,
    pub min_password_len: usize,
    pub default_admin: DefaultAdmin,
}

/// The account bootstrapped on startup when no admin with this email exists.
#[derive(Debug, Clone)]
pub struct DefaultAdmin {
    pub email: String,
    pub name: String,
    pub password: SecretString,
    pub password_was_generated: bool,
}

impl AuthConfig {
    const GENERATED_PASSWORD_LEN: usize = 16;

    pub fn new() -> StagehandResult<Self> {
        let default = Self::default();

        let token_lifetime_hours = number_var_or(
            "TOKEN_LIFETIME_HOURS",
            u64::try_from(default.token_lifetime.whole_hours()).unwrap_or(168),
        )?;
        let min_password_len = number_var_or("MIN_PASSWORD_LEN", default.min_password_len as u64)?;

        let email = optional_var("DEFAULT_ADMIN_EMAIL")?.unwrap_or(default.default_admin.email);
        let name = optional_var("DEFAULT_ADMIN_NAME")?.unwrap_or(default.default_admin.name);
        let (password, password_was_generated) = match optional_var("DEFAULT_ADMIN_PASSWORD")? {
            Some(password) => (SecretString::from(password), false),
            None => (default.default_admin.password, true),
        };

        Ok(Self {
            token_lifetime: Duration::hours(i64::try_from(token_lifetime_hours).unwrap_or(i64::MAX / 3600)),
            min_password_len: usize::try_from(min_password_len).unwrap_or(usize::MAX),
            default_admin: DefaultAdmin {
                email: email.trim().to_lowercase(),
                name,
                password,
                password_was_generated,
            },
        })
    }

    pub fn generate_password() -> String {
        rng()
            .sample_iter(Alphanumeric)
            .take(Self::GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::days(7),
            min_password_len: 8,
            default_admin: DefaultAdmin {
                email: "admin@ensam.ac.ma".into(),
                name: "Administrateur ENSAM".into(),
                password: SecretString::from(Self::generate_password()),
                password_was_generated: true,
            },
        }
    }
}
