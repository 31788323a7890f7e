use crate::auth::PermissionsTarget;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use snafu::Snafu;
use std::{
    num::ParseIntError,
    path::PathBuf,
    str::ParseBoolError,
};

pub type StagehandResult<T> = Result<T, StagehandError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagehandError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error rolling back SQL transaction"))]
    RollbackTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse env var `{}` as a number", name))]
    ParseNumberEnvVar {
        source: ParseIntError,
        name: &'static str,
    },
    #[snafu(display("Unable to parse env var `{}` as a boolean", name))]
    ParseBoolEnvVar {
        source: ParseBoolError,
        name: &'static str,
    },
    #[snafu(display("Error with hashing/password verification"))]
    Bcrypt { source: bcrypt::BcryptError },
    #[snafu(display("Unable to join blocking task"))]
    JoinBlocking { source: tokio::task::JoinError },
    #[snafu(display("Missing or invalid bearer token"))]
    Unauthenticated,
    #[snafu(display("Incorrect credentials"))]
    InvalidCredentials,
    #[snafu(display("Unknown role {:?}", role))]
    UnknownRole { role: String },
    #[snafu(display("Tried to {:?}, only had {:?}", needed.iter_names().collect::<Vec<_>>(), found.iter_names().collect::<Vec<_>>()))]
    IncorrectPermissions {
        needed: PermissionsTarget,
        found: PermissionsTarget,
    },
    #[snafu(display("{} is not in the roster", email))]
    NotInRoster { email: String },
    #[snafu(display("An account already exists for {}", email))]
    AlreadyRegistered { email: String },
    #[snafu(display("Passwords must be at least {} characters long", min))]
    PasswordTooShort { min: usize },
    #[snafu(display("Error parsing email address"))]
    Email { source: email_address::Error },
    #[snafu(display("Field `{}` is required", field))]
    MissingField { field: &'static str },
    #[snafu(display("Unable to find student with ID: {}", id))]
    MissingStudent { id: i32 },
    #[snafu(display("Unable to find convention with ID: {}", id))]
    MissingConvention { id: i32 },
    #[snafu(display("Convention {} has no uploaded file", id))]
    MissingUploadedFile { id: i32 },
    #[snafu(display("Another student already uses this email, CNE, CIN or code apogée"))]
    StudentConflict,
    #[snafu(display("A convention has already been generated for this student"))]
    ConventionAlreadyExists { id: i32 },
    #[snafu(display("Unknown convention status {:?}", status))]
    UnknownConventionStatus { status: String },
    #[snafu(display("Error with multipart form input"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("No `file` field in the upload"))]
    MissingFileField,
    #[snafu(display("File type {:?} is not allowed", extension))]
    DisallowedFileType { extension: String },
    #[snafu(display("File is too large ({} bytes, max {})", size, max))]
    FileTooLarge { size: usize, max: usize },
    #[snafu(display("Unsupported roster format {:?}", extension))]
    UnsupportedFormat { extension: String },
    #[snafu(display("Roster file is empty"))]
    EmptyRoster,
    #[snafu(display("Roster file has a header but no data rows"))]
    HeaderOnlyRoster,
    #[snafu(display("Error with CSVs"))]
    Csv { source: csv::Error },
    #[snafu(display("Error flushing CSV output"))]
    CsvFlush {
        source: csv::IntoInnerError<csv::Writer<Vec<u8>>>,
    },
    #[snafu(display("Error reading spreadsheet"))]
    Spreadsheet { source: calamine::Error },
    #[snafu(display("Spreadsheet has no worksheets"))]
    NoWorksheet,
    #[snafu(display("Error with file at {}", path.display()))]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error formatting a date"))]
    FormatTime { source: time::error::Format },
}

/// Turns a unique-constraint violation from postgres into [`StagehandError::StudentConflict`].
pub fn conflict_or_query(source: sqlx::Error) -> StagehandError {
    match &source {
        sqlx::Error::Database(db) if db.is_unique_violation() => StagehandError::StudentConflict,
        _ => StagehandError::MakeQuery { source },
    }
}

impl IntoResponse for StagehandError {
    #[allow(clippy::match_same_arms)]
    fn into_response(self) -> Response {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const NA: StatusCode = StatusCode::FORBIDDEN; //not allowed
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input
        const UA: StatusCode = StatusCode::UNAUTHORIZED; //unauthenticated
        const CF: StatusCode = StatusCode::CONFLICT; //conflict

        let status_code = match &self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::MigrateError { .. } => ISE,
            Self::MakeQuery { source } => match source {
                sqlx::Error::RowNotFound => NF,
                _ => ISE,
            },
            Self::CommitTransaction { .. } | Self::RollbackTransaction { .. } => ISE,
            Self::BadEnvVar { .. } | Self::ParseNumberEnvVar { .. } | Self::ParseBoolEnvVar { .. } => ISE,
            Self::Bcrypt { .. } | Self::JoinBlocking { .. } => ISE,
            Self::Unauthenticated | Self::InvalidCredentials => UA,
            Self::UnknownRole { .. } => BI,
            Self::IncorrectPermissions { .. } => NA,
            Self::NotInRoster { .. } | Self::AlreadyRegistered { .. } => BI,
            Self::PasswordTooShort { .. } => BI,
            Self::Email { .. } | Self::MissingField { .. } => BI,
            Self::MissingStudent { .. } | Self::MissingConvention { .. } => NF,
            Self::MissingUploadedFile { .. } => NF,
            Self::StudentConflict | Self::ConventionAlreadyExists { .. } => CF,
            Self::UnknownConventionStatus { .. } => BI,
            Self::Multipart { source } => source.status(),
            Self::MissingFileField | Self::DisallowedFileType { .. } => BI,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedFormat { .. } => BI,
            Self::EmptyRoster | Self::HeaderOnlyRoster => BI,
            Self::Csv { .. } | Self::Spreadsheet { .. } | Self::NoWorksheet => BI,
            Self::CsvFlush { .. } => ISE,
            Self::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => NF,
                _ => ISE,
            },
            Self::FormatTime { .. } => ISE,
        };

        // internals stay in the logs
        let message = if status_code == ISE {
            "Erreur serveur".to_string()
        } else {
            self.to_string()
        };

        error!(?self, "Error!");
        (status_code, Json(json!({ "error": message }))).into_response()
    }
}
