use crate::error::{
    CsvSnafu, EmptyRosterSnafu, HeaderOnlyRosterSnafu, NoWorksheetSnafu, SpreadsheetSnafu,
    StagehandResult, UnsupportedFormatSnafu,
};
use calamine::{Data, ExcelDateTime, Reader, open_workbook_auto_from_rs};
use csv::{ReaderBuilder, Trim};
use encoding_rs::{UTF_8, WINDOWS_1252};
use infer::MatcherType;
use snafu::{OptionExt, ResultExt, ensure};
use std::{borrow::Cow, io::Cursor, path::Path};
use time::{Date, Duration, Month, macros::format_description};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RosterFormat {
    Delimited,
    Spreadsheet,
}

impl RosterFormat {
    /// Trusts the extension when there is one, otherwise sniffs the bytes. ZIP and OLE
    /// containers are workbooks, everything else is read as text.
    pub fn detect(file_name: &str, bytes: &[u8]) -> StagehandResult<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv" | "txt" | "tsv") => Ok(Self::Delimited),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Ok(Self::Spreadsheet),
            None => Ok(match infer::get(bytes).map(|kind| kind.matcher_type()) {
                Some(MatcherType::Archive | MatcherType::Doc) => Self::Spreadsheet,
                _ => Self::Delimited,
            }),
            Some(other) => UnsupportedFormatSnafu { extension: other }.fail(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the source file, header being line 1.
    pub line: usize,
    pub cells: Vec<String>,
}

/// A decoded file: header cells, then every non-blank data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    fn from_lines(mut lines: impl Iterator<Item = RawRow>) -> StagehandResult<Self> {
        let header = lines.next().context(EmptyRosterSnafu)?;
        let rows: Vec<RawRow> = lines.collect();
        ensure!(!rows.is_empty(), HeaderOnlyRosterSnafu);

        Ok(Self {
            headers: header.cells,
            rows,
        })
    }
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

pub fn decode(file_name: &str, bytes: &[u8]) -> StagehandResult<RawTable> {
    match RosterFormat::detect(file_name, bytes)? {
        RosterFormat::Delimited => decode_delimited(bytes),
        RosterFormat::Spreadsheet => decode_spreadsheet(bytes),
    }
}

/// Picks whichever of `,` `;` `\t` shows up most in the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();

    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map_or(b',', |(d, _)| d)
}

/// UTF-8 when the bytes are valid UTF-8, otherwise Windows-1252, which is what Excel
/// writes for "CSV" on French Windows installs.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    UTF_8
        .decode_without_bom_handling_and_without_replacement(bytes)
        .unwrap_or_else(|| {
            debug!("Roster is not UTF-8, reading it as Windows-1252");
            WINDOWS_1252.decode_without_bom_handling(bytes).0
        })
}

/// Line of the first non-empty line at or after `offset`. The reader reports a record
/// as starting where the blank lines before it start.
fn line_at(text: &str, offset: u64) -> usize {
    let bytes = text.as_bytes();
    let mut start = usize::try_from(offset).unwrap_or(bytes.len()).min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\r' | b'\n') {
        start += 1;
    }

    bytes[..start].iter().filter(|b| **b == b'\n').count() + 1
}

pub fn decode_delimited(bytes: &[u8]) -> StagehandResult<RawTable> {
    let decoded = decode_text(bytes);
    let text = decoded
        .strip_prefix('\u{feff}')
        .unwrap_or(decoded.as_ref());

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let mut lines = vec![];
    for record in reader.records() {
        let record = record.context(CsvSnafu)?;
        let cells: Vec<String> = record.iter().map(ToString::to_string).collect();
        if is_blank(&cells) {
            continue;
        }

        let line = record
            .position()
            .map_or(lines.len() + 1, |p| line_at(text, p.byte()));
        lines.push(RawRow { line, cells });
    }

    RawTable::from_lines(lines.into_iter())
}

/// Date part of an Excel serial date as `yyyy-mm-dd`, serials counting days from
/// 1899-12-30.
fn excel_date(date: &ExcelDateTime) -> Option<String> {
    if !date.is_datetime() {
        return None;
    }

    let days = date.as_f64().floor();
    if !(0.0..=2_958_465.0).contains(&days) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation)]
    let date = Date::from_calendar_date(1899, Month::December, 30)
        .ok()?
        .checked_add(Duration::days(days as i64))?;
    date.format(format_description!("[year]-[month]-[day]")).ok()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        // ids typed into excel come back as floats
        #[allow(clippy::cast_possible_truncation)]
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Data::DateTime(date) => excel_date(date).unwrap_or_else(|| date.as_f64().to_string()),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

pub fn decode_spreadsheet(bytes: &[u8]) -> StagehandResult<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).context(SpreadsheetSnafu)?;
    let range = workbook
        .worksheet_range_at(0)
        .context(NoWorksheetSnafu)?
        .context(SpreadsheetSnafu)?;

    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let lines = range
        .rows()
        .enumerate()
        .map(|(i, row)| RawRow {
            line: first_row + i + 1,
            cells: row.iter().map(cell_to_string).collect(),
        })
        .filter(|row| !is_blank(&row.cells))
        .collect::<Vec<_>>();

    RawTable::from_lines(lines.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StagehandError;

    #[test]
    fn format_from_extension_then_bytes() {
        assert_eq!(RosterFormat::detect("liste.CSV", b"").unwrap(), RosterFormat::Delimited);
        assert_eq!(RosterFormat::detect("liste.xlsx", b"").unwrap(), RosterFormat::Spreadsheet);
        assert_eq!(
            RosterFormat::detect("liste", b"PK\x03\x04\x14\x00\x06\x00").unwrap(),
            RosterFormat::Spreadsheet
        );
        assert_eq!(RosterFormat::detect("liste", b"nom,email\n").unwrap(), RosterFormat::Delimited);
        assert!(matches!(
            RosterFormat::detect("liste.pdf", b"%PDF"),
            Err(StagehandError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn delimiter_is_sniffed_from_the_header() {
        assert_eq!(sniff_delimiter("nom;email;cne\na;b;c"), b';');
        assert_eq!(sniff_delimiter("nom\temail\n"), b'\t');
        assert_eq!(sniff_delimiter("nom,email\n"), b',');
        assert_eq!(sniff_delimiter("nom\n"), b',');
    }

    #[test]
    fn delimited_rows_keep_their_file_line() {
        let table = decode_delimited(
            "\u{feff}Nom, Email \n\n\"Benali, Ali\", ali@ensam.ac.ma\n,\nSara,sara@ensam.ac.ma\n"
                .as_bytes(),
        )
        .unwrap();

        assert_eq!(table.headers, vec!["Nom", "Email"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 3);
        assert_eq!(table.rows[0].cells, vec!["Benali, Ali", "ali@ensam.ac.ma"]);
        assert_eq!(table.rows[1].line, 5);
    }

    #[test]
    fn structural_failures() {
        assert!(matches!(decode_delimited(b""), Err(StagehandError::EmptyRoster)));
        assert!(matches!(decode_delimited(b"\n ,  \n"), Err(StagehandError::EmptyRoster)));
        assert!(matches!(
            decode_delimited(b"nom,email\n"),
            Err(StagehandError::HeaderOnlyRoster)
        ));
    }

    #[test]
    fn blank_lines_and_crlf_do_not_shift_lines() {
        let table = decode_delimited(b"nom,email\r\n\r\n\r\nA,a@x.ma\r\n\r\nB,b@x.ma\r\n").unwrap();

        assert_eq!(
            table.rows.iter().map(|r| r.line).collect::<Vec<_>>(),
            vec![4, 6]
        );
        assert_eq!(table.rows[1].cells, vec!["B", "b@x.ma"]);
    }

    #[test]
    fn windows_1252_text_is_accepted() {
        let table = decode_delimited(b"nom;fili\xe8re\nAli;G\xe9nie \xc9nergie\n").unwrap();

        assert_eq!(table.headers, vec!["nom", "filière"]);
        assert_eq!(table.rows[0].cells, vec!["Ali", "Génie Énergie"]);
    }

    const ROSTER_XLSX: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/roster.xlsx"));

    #[test]
    fn workbook_rows_keep_their_sheet_line() {
        let table = decode("liste.xlsx", ROSTER_XLSX).unwrap();

        assert_eq!(table.headers[0], "nom");
        assert_eq!(table.headers[8], "date_naissance");
        assert_eq!(table.rows.len(), 2);

        let ali = &table.rows[0];
        assert_eq!(ali.line, 2);
        assert_eq!(ali.cells[0], "Ali Benali");
        assert_eq!(ali.cells[4], "2");
        assert_eq!(ali.cells[5], "12345");
        assert_eq!(ali.cells[8], "2002-01-01");

        let sara = &table.rows[1];
        assert_eq!(sara.line, 4);
        assert_eq!(sara.cells[2], "");
        assert_eq!(sara.cells[5], "12346");
    }

    #[test]
    fn workbooks_without_an_extension_are_sniffed() {
        assert_eq!(
            RosterFormat::detect("liste", ROSTER_XLSX).unwrap(),
            RosterFormat::Spreadsheet
        );
    }

    #[test]
    fn integral_floats_lose_their_fraction() {
        assert_eq!(cell_to_string(&Data::Float(2.0)), "2");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::String(" R130 ".into())), "R130");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
