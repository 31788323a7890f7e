use crate::{
    error::{
        ConventionAlreadyExistsSnafu, MakeQuerySnafu, MissingConventionSnafu, StagehandError,
        StagehandResult,
    },
    uploads::StoredFile,
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use sqlx::{FromRow, PgConnection};
use std::{fmt, path::PathBuf, str::FromStr};
use time::OffsetDateTime;

/// Which internship a convention covers, decided purely by study year.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Initiation,
    FinAnnee,
    FinEtudes,
}

impl StageType {
    pub const fn from_year(annee: i32) -> Self {
        match annee {
            2 => Self::FinAnnee,
            3.. => Self::FinEtudes,
            _ => Self::Initiation,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiation => "initiation",
            Self::FinAnnee => "fin_annee",
            Self::FinEtudes => "fin_etudes",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Initiation => "Stage d'Initiation",
            Self::FinAnnee => "Stage de Fin d'Année",
            Self::FinEtudes => "Stage de Fin d'Études",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionStatus {
    /// generated, waiting for the signed copy
    EnAttente,
    /// signed copy uploaded
    Envoye,
    Valide,
    Rejete,
}

impl ConventionStatus {
    pub const ALL: [Self; 4] = [Self::EnAttente, Self::Envoye, Self::Valide, Self::Rejete];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnAttente => "en_attente",
            Self::Envoye => "envoye",
            Self::Valide => "valide",
            Self::Rejete => "rejete",
        }
    }
}

#[derive(Debug)]
pub struct UnknownVariant(String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant {:?}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl TryFrom<String> for StageType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "initiation" => Ok(Self::Initiation),
            "fin_annee" => Ok(Self::FinAnnee),
            "fin_etudes" => Ok(Self::FinEtudes),
            _ => Err(UnknownVariant(value)),
        }
    }
}

impl TryFrom<String> for ConventionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or(UnknownVariant(value))
    }
}

impl FromStr for ConventionStatus {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string()).map_err(|UnknownVariant(status)| {
            StagehandError::UnknownConventionStatus { status }
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Convention {
    pub id: i32,
    pub student_id: i32,
    #[sqlx(try_from = "String")]
    pub type_stage: StageType,
    #[serde(skip)]
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ConventionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub validated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rejected_at: Option<OffsetDateTime>,
    pub admin_notes: Option<String>,
}

/// The bits of a student the admin convention list shows alongside each convention.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    #[sqlx(rename = "s_id")]
    pub id: i32,
    pub nom: String,
    pub email: String,
    pub filiere: String,
    pub annee: i32,
    pub code_apogee: String,
    pub cne: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConventionWithStudent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub convention: Convention,
    #[sqlx(flatten)]
    pub student: StudentSummary,
}

pub struct NewConvention {
    pub student_id: i32,
    pub type_stage: StageType,
}

impl Convention {
    pub async fn get_by_id(id: i32, conn: &mut PgConnection) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM conventions WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    /// One convention per student, ever. Checked here and backed by `UNIQUE(student_id)`.
    pub async fn insert_new(
        NewConvention {
            student_id,
            type_stage,
        }: NewConvention,
        conn: &mut PgConnection,
    ) -> StagehandResult<i32> {
        if let Some(existing) = Self::get_for_student(student_id, &mut *conn).await? {
            return ConventionAlreadyExistsSnafu { id: existing.id }.fail();
        }

        let inserted: Option<(i32,)> = sqlx::query_as(
            "INSERT INTO conventions (student_id, type_stage, status) VALUES ($1, $2, $3) ON CONFLICT (student_id) DO NOTHING RETURNING id",
        )
        .bind(student_id)
        .bind(type_stage.as_str())
        .bind(ConventionStatus::EnAttente.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        match inserted {
            Some((id,)) => Ok(id),
            // lost a race with another request for the same student
            None => {
                let existing = Self::get_for_student(student_id, conn)
                    .await?
                    .map_or(0, |existing| existing.id);
                ConventionAlreadyExistsSnafu { id: existing }.fail()
            }
        }
    }

    pub async fn get_for_student(
        student_id: i32,
        conn: &mut PgConnection,
    ) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM conventions WHERE student_id = $1")
            .bind(student_id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_all_for_student(
        student_id: i32,
        conn: &mut PgConnection,
    ) -> StagehandResult<Vec<Self>> {
        sqlx::query_as("SELECT * FROM conventions WHERE student_id = $1 ORDER BY generated_at DESC")
            .bind(student_id)
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_all_with_students(
        conn: &mut PgConnection,
    ) -> StagehandResult<Vec<ConventionWithStudent>> {
        sqlx::query_as(
            "SELECT c.*, s.id AS s_id, s.nom, s.email, s.filiere, s.annee, s.code_apogee, s.cne FROM conventions c JOIN students s ON s.id = c.student_id ORDER BY c.generated_at DESC, c.id DESC",
        )
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)
    }

    /// Where this student's signed copies live on disk, to clean up after deleting them.
    pub async fn uploaded_files_for_student(
        student_id: i32,
        conn: &mut PgConnection,
    ) -> StagehandResult<Vec<PathBuf>> {
        let paths: Vec<(String,)> = sqlx::query_as(
            "SELECT file_path FROM conventions WHERE student_id = $1 AND file_path IS NOT NULL",
        )
        .bind(student_id)
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok(paths.into_iter().map(|(path,)| PathBuf::from(path)).collect())
    }

    pub async fn attach_signed_copy(
        id: i32,
        stored: &StoredFile,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self> {
        sqlx::query_as(
            "UPDATE conventions SET file_path = $2, file_name = $3, status = $4, submitted_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(stored.path.to_string_lossy().into_owned())
        .bind(&stored.file_name)
        .bind(ConventionStatus::Envoye.as_str())
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        .context(MissingConventionSnafu { id })
    }

    /// `valide` and `rejete` stamp their own timestamp and clear the other one; anything
    /// else clears both.
    pub async fn set_status(
        id: i32,
        status: ConventionStatus,
        notes: Option<String>,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self> {
        let query = match status {
            ConventionStatus::Valide => {
                "UPDATE conventions SET status = $2, admin_notes = $3, validated_at = now(), rejected_at = NULL WHERE id = $1 RETURNING *"
            }
            ConventionStatus::Rejete => {
                "UPDATE conventions SET status = $2, admin_notes = $3, rejected_at = now(), validated_at = NULL WHERE id = $1 RETURNING *"
            }
            ConventionStatus::EnAttente | ConventionStatus::Envoye => {
                "UPDATE conventions SET status = $2, admin_notes = $3, validated_at = NULL, rejected_at = NULL WHERE id = $1 RETURNING *"
            }
        };

        sqlx::query_as(query)
            .bind(id)
            .bind(status.as_str())
            .bind(notes.filter(|n| !n.trim().is_empty()))
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)?
            .context(MissingConventionSnafu { id })
    }

    /// Returns the number of conventions deleted.
    pub async fn remove_all(conn: &mut PgConnection) -> StagehandResult<u64> {
        Ok(sqlx::query("DELETE FROM conventions")
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    pub async fn count_by_status(
        conn: &mut PgConnection,
    ) -> StagehandResult<Vec<(ConventionStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, count(*) FROM conventions GROUP BY status")
                .fetch_all(conn)
                .await
                .context(MakeQuerySnafu)?;

        Ok(ConventionStatus::ALL
            .into_iter()
            .map(|status| {
                let count = rows
                    .iter()
                    .find(|(name, _)| name == status.as_str())
                    .map_or(0, |(_, count)| *count);
                (status, count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_type_follows_study_year() {
        assert_eq!(StageType::from_year(1), StageType::Initiation);
        assert_eq!(StageType::from_year(2), StageType::FinAnnee);
        assert_eq!(StageType::from_year(3), StageType::FinEtudes);
        assert_eq!(StageType::from_year(5), StageType::FinEtudes);
        assert_eq!(StageType::from_year(0), StageType::Initiation);
    }

    #[test]
    fn statuses_round_trip_through_their_column_names() {
        for status in ConventionStatus::ALL {
            assert_eq!(
                ConventionStatus::try_from(status.as_str().to_string()).unwrap(),
                status
            );
        }
        assert_eq!(
            serde_json::to_string(&ConventionStatus::EnAttente).unwrap(),
            "\"en_attente\""
        );
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        assert!(matches!(
            "archive".parse::<ConventionStatus>(),
            Err(StagehandError::UnknownConventionStatus { .. })
        ));
        assert_eq!("valide".parse::<ConventionStatus>().unwrap(), ConventionStatus::Valide);
    }

    #[test]
    fn stage_type_names_match_the_column() {
        assert_eq!(StageType::try_from("fin_etudes".to_string()).unwrap(), StageType::FinEtudes);
        assert!(StageType::try_from("stage".to_string()).is_err());
        assert_eq!(StageType::FinAnnee.title(), "Stage de Fin d'Année");
    }
}
