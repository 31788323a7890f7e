#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Nom,
    Email,
    Telephone,
    Filiere,
    Annee,
    CodeApogee,
    Cne,
    Cin,
    DateNaissance,
}

/// Accepted header spellings for each field, lower-cased, in priority order.
pub const FIELD_SYNONYMS: [(Field, &[&str]); 9] = [
    (
        Field::Nom,
        &["nom", "name", "nom complet", "nom_complet", "full name", "prenom", "prénom"],
    ),
    (Field::Email, &["email", "e-mail", "mail", "adresse_email", "adresse email"]),
    (Field::Telephone, &["telephone", "téléphone", "phone", "tel", "tél"]),
    (
        Field::Filiere,
        &["filiere", "filière", "branch", "specialite", "spécialité"],
    ),
    (Field::Annee, &["annee", "année", "year", "niveau", "level"]),
    (
        Field::CodeApogee,
        &["code_apogee", "code apogée", "code apogee", "codeapogee", "apogee", "apogée", "code"],
    ),
    (Field::Cne, &["cne", "numero_etudiant", "num_etudiant"]),
    (Field::Cin, &["cin", "carte_identite", "id_number"]),
    (
        Field::DateNaissance,
        &["date_naissance", "date naissance", "datenaissance", "birth_date", "birthday", "naissance"],
    ),
];

/// Lower-cases and trims a header cell, dropping stray quotes.
pub fn normalise_header(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

/// For each field, the header columns that can supply it, best synonym first.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: Vec<(Field, Vec<usize>)>,
}

impl ColumnMap {
    pub fn new(headers: &[String]) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| normalise_header(h)).collect();

        let columns = FIELD_SYNONYMS
            .iter()
            .map(|(field, synonyms)| {
                let indices = synonyms
                    .iter()
                    .flat_map(|synonym| {
                        headers
                            .iter()
                            .enumerate()
                            .filter(move |(_, h)| h == synonym)
                            .map(|(i, _)| i)
                    })
                    .collect();
                (*field, indices)
            })
            .collect();

        Self { columns }
    }

    /// First non-blank cell among the field's columns, or `""`.
    pub fn value<'a>(&self, field: Field, cells: &'a [String]) -> &'a str {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .into_iter()
            .flat_map(|(_, indices)| indices.iter())
            .filter_map(|i| cells.get(*i))
            .map(|cell| cell.trim())
            .find(|cell| !cell.is_empty())
            .unwrap_or_default()
    }

    pub fn recognises(&self, field: Field) -> bool {
        self.columns
            .iter()
            .any(|(f, indices)| *f == field && !indices.is_empty())
    }
}

/// One data row mapped onto the student shape. Unknown columns have nowhere to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftStudent {
    pub nom: String,
    pub email: String,
    pub telephone: String,
    pub filiere: String,
    pub annee: i32,
    pub code_apogee: String,
    pub cne: String,
    pub cin: String,
    pub date_naissance: String,
}

/// Leading digits of `raw`, else 1. `"3ème"` reads as 3.
pub fn parse_annee(raw: &str) -> i32 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(1)
}

impl DraftStudent {
    pub fn from_cells(columns: &ColumnMap, cells: &[String]) -> Self {
        let get = |field| columns.value(field, cells).to_string();

        Self {
            nom: get(Field::Nom),
            email: get(Field::Email),
            telephone: get(Field::Telephone),
            filiere: get(Field::Filiere),
            annee: parse_annee(columns.value(Field::Annee, cells)),
            code_apogee: get(Field::CodeApogee),
            cne: get(Field::Cne),
            cin: get(Field::Cin),
            date_naissance: get(Field::DateNaissance),
        }
    }
}
