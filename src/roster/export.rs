use crate::{
    data::student::Student,
    error::{CsvFlushSnafu, CsvSnafu, StagehandResult},
};
use snafu::ResultExt;

pub const EXPORT_HEADER: [&str; 10] = [
    "nom",
    "email",
    "telephone",
    "filiere",
    "annee",
    "code_apogee",
    "cne",
    "cin",
    "date_naissance",
    "is_registered",
];

/// Writes the roster as CSV, in the order given. Feeding the result back to the
/// importer finds nothing new.
pub fn export_roster(students: &[Student]) -> StagehandResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(EXPORT_HEADER).context(CsvSnafu)?;

    for student in students {
        let annee = student.annee.to_string();
        writer
            .write_record([
                student.nom.as_str(),
                student.email.as_str(),
                student.telephone.as_deref().unwrap_or_default(),
                student.filiere.as_str(),
                annee.as_str(),
                student.code_apogee.as_str(),
                student.cne.as_str(),
                student.cin.as_str(),
                student.date_naissance.as_str(),
                if student.is_registered { "Oui" } else { "Non" },
            ])
            .context(CsvSnafu)?;
    }

    writer.into_inner().context(CsvFlushSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ImportConfig,
        roster::{import_roster, test_store::MemoryRoster},
    };

    #[tokio::test]
    async fn export_then_import_adds_nobody() {
        let mut store = MemoryRoster::default();
        import_roster(
            "liste.csv",
            "nom;email;filiere;annee;code_apogee;cne;cin\n\"Benali, Ali\";ali@ensam.ac.ma;GI;2;AP1;CNE1;CIN1\nSara;sara@ensam.ac.ma;GM;3;AP2;CNE2;CIN2\n".as_bytes(),
            &mut store,
            ImportConfig::default(),
        )
        .await
        .unwrap();
        store.students[1].is_registered = true;

        let exported = export_roster(&store.students).unwrap();
        let text = String::from_utf8(exported.clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(EXPORT_HEADER.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("\"Benali, Ali\",ali@ensam.ac.ma,,GI,2,AP1,CNE1,CIN1,,Non")
        );
        assert!(lines.next().unwrap().ends_with(",Oui"));

        let report = import_roster("export.csv", &exported, &mut store, ImportConfig::default())
            .await
            .unwrap();
        assert_eq!(report.imported_rows, 0);
        assert_eq!(report.duplicates_count, 2);
        assert_eq!(store.students.len(), 2);
    }
}
