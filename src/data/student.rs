use crate::{
    auth::{AuthUser, Role, session_store::SessionStore},
    data::DataType,
    error::{
        EmailSnafu, MakeQuerySnafu, MissingFieldSnafu, MissingStudentSnafu, StagehandResult,
        conflict_or_query,
    },
};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};
use sqlx::{FromRow, PgConnection};
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub nom: String,
    pub email: String,
    pub telephone: Option<String>,
    pub filiere: String,
    pub annee: i32,
    pub code_apogee: String,
    pub cne: String,
    pub cin: String,
    pub date_naissance: String,
    pub is_registered: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body of admin create/edit requests, and what the importer inserts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentForm {
    pub nom: String,
    pub email: String,
    #[serde(default)]
    pub telephone: Option<String>,
    pub filiere: String,
    pub annee: i32,
    pub code_apogee: String,
    pub cne: String,
    pub cin: String,
    #[serde(default)]
    pub date_naissance: String,
}

/// The four columns no two students may share.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub email: &'a str,
    pub cne: &'a str,
    pub cin: &'a str,
    pub code_apogee: &'a str,
}

impl StudentForm {
    /// Trims everything and rejects blank required fields and malformed emails. The email
    /// is lower-cased only when emails compare case-insensitively.
    pub fn validated(self, email_case_insensitive: bool) -> StagehandResult<Self> {
        let required = |value: String, field: &'static str| -> StagehandResult<String> {
            let value = value.trim().to_string();
            ensure!(!value.is_empty(), MissingFieldSnafu { field });
            Ok(value)
        };

        let mut email = required(self.email, "email")?;
        if email_case_insensitive {
            email = email.to_lowercase();
        }
        EmailAddress::from_str(&email).context(EmailSnafu)?;

        Ok(Self {
            nom: required(self.nom, "nom")?,
            email,
            telephone: self
                .telephone
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            filiere: required(self.filiere, "filiere")?,
            annee: self.annee,
            code_apogee: required(self.code_apogee, "codeApogee")?,
            cne: required(self.cne, "cne")?,
            cin: required(self.cin, "cin")?,
            date_naissance: self.date_naissance.trim().to_string(),
        })
    }

    pub fn identity(&self) -> Identity<'_> {
        Identity {
            email: &self.email,
            cne: &self.cne,
            cin: &self.cin,
            code_apogee: &self.code_apogee,
        }
    }
}

impl DataType for Student {
    type Id = i32;
    type FormForAdding = StudentForm;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(conn: &mut PgConnection) -> StagehandResult<Vec<Self>> {
        sqlx::query_as("SELECT * FROM students ORDER BY created_at DESC, id DESC")
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self::Id> {
        let StudentForm {
            nom,
            email,
            telephone,
            filiere,
            annee,
            code_apogee,
            cne,
            cin,
            date_naissance,
        } = to_be_added;

        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO students (nom, email, telephone, filiere, annee, code_apogee, cne, cin, date_naissance, is_registered) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE) RETURNING id",
        )
        .bind(nom)
        .bind(email)
        .bind(telephone)
        .bind(filiere)
        .bind(annee)
        .bind(code_apogee)
        .bind(cne)
        .bind(cin)
        .bind(date_naissance)
        .fetch_one(conn)
        .await
        .map_err(conflict_or_query)?;

        Ok(id)
    }

    /// Sessions and conventions go first, so run this inside a transaction.
    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> StagehandResult<()> {
        SessionStore::revoke_all_for(Role::Student, id, &mut *conn).await?;

        sqlx::query("DELETE FROM conventions WHERE student_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

        let removed = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();
        ensure!(removed > 0, MissingStudentSnafu { id });

        Ok(())
    }
}

impl Student {
    pub async fn get_by_email(email: &str, conn: &mut PgConnection) -> StagehandResult<Option<Self>> {
        sqlx::query_as("SELECT * FROM students WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_with_password_hash(
        email: &str,
        conn: &mut PgConnection,
    ) -> StagehandResult<Option<(Self, Option<String>)>> {
        #[derive(FromRow)]
        struct WithHash {
            #[sqlx(flatten)]
            student: Student,
            password_hash: Option<String>,
        }

        Ok(sqlx::query_as::<_, WithHash>(
            "SELECT * FROM students WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        .map(|WithHash { student, password_hash }| (student, password_hash)))
    }

    /// Ordered the way the export lists people.
    pub async fn get_all_by_name(conn: &mut PgConnection) -> StagehandResult<Vec<Self>> {
        sqlx::query_as("SELECT * FROM students ORDER BY nom, id")
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    /// Id of any student sharing at least one identity column, ignoring `excluding`.
    pub async fn find_conflict(
        identity: Identity<'_>,
        email_case_insensitive: bool,
        excluding: Option<i32>,
        conn: &mut PgConnection,
    ) -> StagehandResult<Option<i32>> {
        let found: Option<(i32,)> = sqlx::query_as(
            "SELECT id FROM students WHERE (CASE WHEN $5 THEN lower(email) = lower($1) ELSE email = $1 END OR cne = $2 OR cin = $3 OR code_apogee = $4) AND ($6::INT IS NULL OR id <> $6) LIMIT 1",
        )
        .bind(identity.email)
        .bind(identity.cne)
        .bind(identity.cin)
        .bind(identity.code_apogee)
        .bind(email_case_insensitive)
        .bind(excluding)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok(found.map(|(id,)| id))
    }

    pub async fn update(
        id: i32,
        form: StudentForm,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self> {
        let StudentForm {
            nom,
            email,
            telephone,
            filiere,
            annee,
            code_apogee,
            cne,
            cin,
            date_naissance,
        } = form;

        sqlx::query_as(
            "UPDATE students SET nom = $2, email = $3, telephone = $4, filiere = $5, annee = $6, code_apogee = $7, cne = $8, cin = $9, date_naissance = $10 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(nom)
        .bind(email)
        .bind(telephone)
        .bind(filiere)
        .bind(annee)
        .bind(code_apogee)
        .bind(cne)
        .bind(cin)
        .bind(date_naissance)
        .fetch_optional(conn)
        .await
        .map_err(conflict_or_query)?
        .context(MissingStudentSnafu { id })
    }

    pub async fn mark_registered(
        id: i32,
        password_hash: &str,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self> {
        sqlx::query_as(
            "UPDATE students SET password_hash = $2, is_registered = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        .context(MissingStudentSnafu { id })
    }

    /// Wipes every student along with their sessions. Conventions must already be gone.
    pub async fn remove_all(conn: &mut PgConnection) -> StagehandResult<u64> {
        sqlx::query("DELETE FROM sessions WHERE role = 'student'")
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(sqlx::query("DELETE FROM students")
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    pub async fn count(conn: &mut PgConnection) -> StagehandResult<(i64, i64)> {
        sqlx::query_as("SELECT count(*), count(*) FILTER (WHERE is_registered) FROM students")
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.clone(),
            name: self.nom.clone(),
            role: Role::Student,
        }
    }
}
