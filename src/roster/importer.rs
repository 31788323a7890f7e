use crate::{
    config::ImportConfig,
    data::student::StudentForm,
    error::StagehandResult,
    roster::{
        ImportReport, RosterStore,
        decode::{RawRow, decode},
        fields::{ColumnMap, DraftStudent, Field},
    },
};

const REQUIRED_FIELDS: [Field; 6] = [
    Field::Nom,
    Field::Email,
    Field::Filiere,
    Field::CodeApogee,
    Field::Cne,
    Field::Cin,
];

enum RowOutcome {
    Imported,
    Duplicate(String),
    Invalid(String),
}

/// Reads every row of an uploaded roster into `store`, skipping anyone already present.
///
/// Only an unreadable file fails the call. Everything row-level, including insert
/// failures, is reported back in the [`ImportReport`].
pub async fn import_roster<S: RosterStore>(
    file_name: &str,
    bytes: &[u8],
    store: &mut S,
    config: ImportConfig,
) -> StagehandResult<ImportReport> {
    let table = decode(file_name, bytes)?;
    let columns = ColumnMap::new(&table.headers);
    let unrecognised: Vec<Field> = REQUIRED_FIELDS
        .into_iter()
        .filter(|field| !columns.recognises(*field))
        .collect();
    if !unrecognised.is_empty() {
        warn!(?unrecognised, headers = ?table.headers, "Roster is missing required columns");
    }
    let header_len = table.headers.len();

    let mut report = ImportReport {
        total_rows: table.rows.len(),
        ..ImportReport::default()
    };

    for row in table.rows {
        match import_row(row, header_len, &columns, store, config).await? {
            RowOutcome::Imported => report.imported_rows += 1,
            RowOutcome::Duplicate(who) => {
                report.duplicates_count += 1;
                report.duplicates.push(who);
            }
            RowOutcome::Invalid(why) => report.errors.push(why),
        }
    }

    report.success = report.imported_rows > 0;
    info!(
        file_name,
        total = report.total_rows,
        imported = report.imported_rows,
        duplicates = report.duplicates_count,
        errors = report.errors.len(),
        "Imported roster"
    );

    Ok(report)
}

/// Validation problem for a draft, in the order the fields are checked.
fn missing_field(draft: &DraftStudent) -> Option<&'static str> {
    if draft.nom.is_empty() {
        Some("Nom manquant")
    } else if draft.email.is_empty() || !draft.email.contains('@') {
        Some("Email invalide ou manquant")
    } else if draft.filiere.is_empty() {
        Some("Filière manquante")
    } else if draft.code_apogee.is_empty() {
        Some("Code Apogée manquant")
    } else if draft.cne.is_empty() {
        Some("CNE manquant")
    } else if draft.cin.is_empty() {
        Some("CIN manquant")
    } else {
        None
    }
}

async fn import_row<S: RosterStore>(
    RawRow { line, cells }: RawRow,
    header_len: usize,
    columns: &ColumnMap,
    store: &mut S,
    config: ImportConfig,
) -> StagehandResult<RowOutcome> {
    if cells.len() < header_len {
        return Ok(RowOutcome::Invalid(format!(
            "Ligne {line}: Nombre de colonnes incorrect"
        )));
    }

    let draft = DraftStudent::from_cells(columns, &cells);
    if let Some(problem) = missing_field(&draft) {
        return Ok(RowOutcome::Invalid(format!("Ligne {line}: {problem}")));
    }

    let form = StudentForm {
        email: if config.email_case_insensitive {
            draft.email.to_lowercase()
        } else {
            draft.email.clone()
        },
        nom: draft.nom,
        telephone: Some(draft.telephone).filter(|t| !t.is_empty()),
        filiere: draft.filiere,
        annee: draft.annee,
        code_apogee: draft.code_apogee,
        cne: draft.cne,
        cin: draft.cin,
        date_naissance: draft.date_naissance,
    };

    if store
        .find_duplicate(form.identity(), config.email_case_insensitive)
        .await?
        .is_some()
    {
        return Ok(RowOutcome::Duplicate(format!("{} ({})", form.nom, draft.email)));
    }

    let nom = form.nom.clone();
    match store.insert_student(form).await {
        Ok(id) => {
            debug!(id, line, "Imported student");
            Ok(RowOutcome::Imported)
        }
        Err(e) => {
            warn!(?e, line, %nom, "Unable to insert roster row");
            Ok(RowOutcome::Invalid(format!("Ligne {line}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::StagehandError, roster::test_store::MemoryRoster};

    const HEADER: &str = "nom,email,telephone,filiere,annee,code_apogee,cne,cin,date_naissance";

    async fn import(text: &str, store: &mut MemoryRoster) -> ImportReport {
        import_roster("liste.csv", text.as_bytes(), store, ImportConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_student_twice_is_a_duplicate() {
        let mut store = MemoryRoster::default();
        let file = format!(
            "{HEADER}\nAli Benali,ali@ensam.ac.ma,0600000000,GI,2,AP1,CNE1,CIN1,2002-01-01\n"
        );

        let first = import(&file, &mut store).await;
        assert!(first.success);
        assert_eq!(first.total_rows, 1);
        assert_eq!(first.imported_rows, 1);
        assert_eq!(store.students[0].annee, 2);
        assert_eq!(store.students[0].telephone.as_deref(), Some("0600000000"));

        let second = import(&file, &mut store).await;
        assert!(!second.success);
        assert_eq!(second.imported_rows, 0);
        assert_eq!(second.duplicates_count, 1);
        assert_eq!(second.duplicates, vec!["Ali Benali (ali@ensam.ac.ma)"]);
        assert_eq!(store.students.len(), 1);
    }

    #[tokio::test]
    async fn any_one_identity_column_is_enough_to_collide() {
        let mut store = MemoryRoster::default();
        import(
            &format!("{HEADER}\nAli,ali@ensam.ac.ma,,GI,1,AP1,CNE1,CIN1,\n"),
            &mut store,
        )
        .await;

        let report = import(
            &format!(
                "{HEADER}\nA,ALI@ensam.ac.ma,,GI,1,AP2,CNE2,CIN2,\nB,b@ensam.ac.ma,,GI,1,AP1,CNE3,CIN3,\nC,c@ensam.ac.ma,,GI,1,AP4,CNE1,CIN4,\nD,d@ensam.ac.ma,,GI,1,AP5,CNE5,CIN1,\nE,e@ensam.ac.ma,,GI,1,AP6,CNE6,CIN6,\n"
            ),
            &mut store,
        )
        .await;

        assert_eq!(report.duplicates_count, 4);
        assert_eq!(report.imported_rows, 1);
        assert_eq!(store.students.len(), 2);
    }

    #[tokio::test]
    async fn invalid_rows_are_reported_by_line() {
        let mut store = MemoryRoster::default();
        let report = import(
            &format!(
                "{HEADER}\n,a@x.ma,,GI,1,A1,C1,I1,\nB,pas-un-email,,GI,1,A2,C2,I2,\nC,c@x.ma,,,1,A3,C3,I3,\nD,d@x.ma,,GI,1,,C4,I4,\nE,e@x.ma,,GI,1,A5,,I5,\nF,f@x.ma,,GI,1,A6,C6,,\nG,g@x.ma\n"
            ),
            &mut store,
        )
        .await;

        assert_eq!(
            report.errors,
            vec![
                "Ligne 2: Nom manquant",
                "Ligne 3: Email invalide ou manquant",
                "Ligne 4: Filière manquante",
                "Ligne 5: Code Apogée manquant",
                "Ligne 6: CNE manquant",
                "Ligne 7: CIN manquant",
                "Ligne 8: Nombre de colonnes incorrect",
            ]
        );
        assert_eq!(report.total_rows, 7);
        assert!(!report.success);
        assert!(store.students.is_empty());
    }

    #[tokio::test]
    async fn semicolons_and_synonyms() {
        let mut store = MemoryRoster::default();
        let report = import(
            "Nom Complet;E-mail;Filière;Niveau;Code Apogée;CNE;CIN;Remarque\nSara Alaoui;Sara@ENSAM.ac.ma;GM;troisième;AP9;CNE9;CIN9;rien\n",
            &mut store,
        )
        .await;

        assert_eq!(report.imported_rows, 1);
        let sara = &store.students[0];
        assert_eq!(sara.email, "sara@ensam.ac.ma");
        assert_eq!(sara.annee, 1);
        assert_eq!(sara.filiere, "GM");
        assert_eq!(sara.telephone, None);
    }

    #[tokio::test]
    async fn case_sensitive_emails_when_configured() {
        let mut store = MemoryRoster::default();
        let config = ImportConfig {
            email_case_insensitive: false,
            ..ImportConfig::default()
        };
        let file = format!("{HEADER}\nAli,Ali@ensam.ac.ma,,GI,1,AP1,CNE1,CIN1,\n");
        import_roster("liste.csv", file.as_bytes(), &mut store, config)
            .await
            .unwrap();

        assert_eq!(store.students[0].email, "Ali@ensam.ac.ma");
    }

    #[tokio::test]
    async fn blank_lines_keep_file_line_numbers() {
        let mut store = MemoryRoster::default();
        let report = import(
            &format!(
                "{HEADER}\n\n\n,a@x.ma,,GI,1,A1,C1,I1,\n\nB,b@x.ma,,,1,A2,C2,I2,\n"
            ),
            &mut store,
        )
        .await;

        assert_eq!(
            report.errors,
            vec!["Ligne 4: Nom manquant", "Ligne 6: Filière manquante"]
        );
        assert_eq!(report.total_rows, 2);
    }

    #[tokio::test]
    async fn windows_1252_rosters_import() {
        let mut store = MemoryRoster::default();
        let report = import_roster(
            "liste.csv",
            b"nom;email;fili\xe8re;annee;code_apogee;cne;cin\nAli;ali@ensam.ac.ma;G\xe9nie Civil;2;AP1;CNE1;CIN1\n",
            &mut store,
            ImportConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.imported_rows, 1);
        assert_eq!(store.students[0].filiere, "Génie Civil");
    }

    #[tokio::test]
    async fn workbook_rosters_import() {
        let mut store = MemoryRoster::default();
        let workbook =
            include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/roster.xlsx"));
        let report = import_roster("liste.xlsx", workbook, &mut store, ImportConfig::default())
            .await
            .unwrap();

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.imported_rows, 2);
        assert!(report.errors.is_empty());

        let ali = &store.students[0];
        assert_eq!(ali.code_apogee, "12345");
        assert_eq!(ali.annee, 2);
        assert_eq!(ali.date_naissance, "2002-01-01");
        assert_eq!(store.students[1].annee, 3);
        assert_eq!(store.students[1].telephone, None);
    }

    /// Loses every race: the lookup sees nobody, the insert hits the constraint.
    struct RacingStore;

    impl RosterStore for RacingStore {
        async fn find_duplicate(
            &mut self,
            _identity: crate::data::student::Identity<'_>,
            _email_case_insensitive: bool,
        ) -> StagehandResult<Option<i32>> {
            Ok(None)
        }

        async fn insert_student(&mut self, _form: StudentForm) -> StagehandResult<i32> {
            Err(StagehandError::StudentConflict)
        }
    }

    #[tokio::test]
    async fn failed_inserts_are_row_errors() {
        let file = format!("{HEADER}\nAli,ali@ensam.ac.ma,,GI,1,AP1,CNE1,CIN1,\n");
        let report = import_roster(
            "liste.csv",
            file.as_bytes(),
            &mut RacingStore,
            ImportConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.imported_rows, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Ligne 2: "));
    }

    #[tokio::test]
    async fn structural_problems_fail_the_call() {
        let mut store = MemoryRoster::default();
        assert!(matches!(
            import_roster("liste.csv", HEADER.as_bytes(), &mut store, ImportConfig::default()).await,
            Err(StagehandError::HeaderOnlyRoster)
        ));
        assert!(matches!(
            import_roster("liste.csv", b"", &mut store, ImportConfig::default()).await,
            Err(StagehandError::EmptyRoster)
        ));
        assert!(matches!(
            import_roster("liste.json", b"{}", &mut store, ImportConfig::default()).await,
            Err(StagehandError::UnsupportedFormat { .. })
        ));
    }
}
