//! Bulk roster handling: turning uploaded CSV/spreadsheet files into students, and back.

use crate::{
    data::{
        DataType,
        student::{Identity, Student, StudentForm},
    },
    error::{CommitTransactionSnafu, GetDatabaseConnectionSnafu, RollbackTransactionSnafu, StagehandResult},
};
use serde::Serialize;
use snafu::ResultExt;
use sqlx::{Connection, PgConnection};

pub mod decode;
pub mod export;
pub mod fields;
pub mod importer;

pub use importer::import_roster;

/// What happened to each row of an import. Row problems end up here, never as errors.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: bool,
    pub total_rows: usize,
    pub imported_rows: usize,
    pub duplicates_count: usize,
    pub errors: Vec<String>,
    pub duplicates: Vec<String>,
}

/// The two things the importer needs from wherever students live.
pub trait RosterStore {
    /// Id of an existing student sharing the email, CNE, CIN or code apogée.
    async fn find_duplicate(
        &mut self,
        identity: Identity<'_>,
        email_case_insensitive: bool,
    ) -> StagehandResult<Option<i32>>;

    async fn insert_student(&mut self, form: StudentForm) -> StagehandResult<i32>;
}

impl RosterStore for PgConnection {
    async fn find_duplicate(
        &mut self,
        identity: Identity<'_>,
        email_case_insensitive: bool,
    ) -> StagehandResult<Option<i32>> {
        Student::find_conflict(identity, email_case_insensitive, None, self).await
    }

    /// Each insert gets its own savepoint so that one failed row doesn't poison a
    /// surrounding batch transaction.
    async fn insert_student(&mut self, form: StudentForm) -> StagehandResult<i32> {
        let mut savepoint = self.begin().await.context(GetDatabaseConnectionSnafu)?;

        match Student::insert_into_database(form, &mut savepoint).await {
            Ok(id) => {
                savepoint.commit().await.context(CommitTransactionSnafu)?;
                Ok(id)
            }
            Err(e) => {
                savepoint.rollback().await.context(RollbackTransactionSnafu)?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_store {
    use super::RosterStore;
    use crate::{
        data::student::{Identity, Student, StudentForm},
        error::{StagehandError, StagehandResult},
    };
    use time::OffsetDateTime;

    /// Keeps students in a `Vec`, enforcing the same uniqueness rules as the table.
    #[derive(Default)]
    pub struct MemoryRoster {
        pub students: Vec<Student>,
    }

    impl MemoryRoster {
        fn matches(student: &Student, identity: Identity<'_>, email_ci: bool) -> bool {
            let email_matches = if email_ci {
                student.email.eq_ignore_ascii_case(identity.email)
            } else {
                student.email == identity.email
            };

            email_matches
                || student.cne == identity.cne
                || student.cin == identity.cin
                || student.code_apogee == identity.code_apogee
        }
    }

    impl RosterStore for MemoryRoster {
        async fn find_duplicate(
            &mut self,
            identity: Identity<'_>,
            email_case_insensitive: bool,
        ) -> StagehandResult<Option<i32>> {
            Ok(self
                .students
                .iter()
                .find(|s| Self::matches(s, identity, email_case_insensitive))
                .map(|s| s.id))
        }

        async fn insert_student(&mut self, form: StudentForm) -> StagehandResult<i32> {
            if self
                .students
                .iter()
                .any(|s| Self::matches(s, form.identity(), false))
            {
                return Err(StagehandError::StudentConflict);
            }

            let id = i32::try_from(self.students.len()).unwrap() + 1;
            self.students.push(Student {
                id,
                nom: form.nom,
                email: form.email,
                telephone: form.telephone,
                filiere: form.filiere,
                annee: form.annee,
                code_apogee: form.code_apogee,
                cne: form.cne,
                cin: form.cin,
                date_naissance: form.date_naissance,
                is_registered: false,
                created_at: OffsetDateTime::now_utc(),
            });
            Ok(id)
        }
    }
}
