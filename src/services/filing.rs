// src/services/filing.rs

//! Field-level parsing of electronic filing documents.
//!
//! A filing is line-oriented. Each line is one record whose fields are
//! separated by `|` (older versions) or the ASCII file separator `0x1C`.
//! Fields may be double-quoted, in which case the delimiter may appear
//! inside them. The first field is the record type: `HDR` for the file
//! header, `F3XN`, `F24N` and friends for the form record, `SE` for
//! independent expenditure lines.

use chrono::NaiveDate;

use crate::error::ExtractError;
use crate::models::{ScheduleELayout, parse_mmddyyyy};

const FILE_SEPARATOR: char = '\x1c';

/// Field delimiter used by a filing, judged from its first line.
pub fn detect_delimiter(first_line: &str) -> u8 {
    if first_line.contains(FILE_SEPARATOR) {
        FILE_SEPARATOR as u8
    } else {
        b'|'
    }
}

/// Records of `text`, each a list of trimmed fields with quotes removed.
///
/// Blank lines yield no record. Records may differ in field count.
pub fn records(
    text: &str,
    delimiter: u8,
) -> impl Iterator<Item = Result<Vec<String>, ExtractError>> + '_ {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
        .into_records()
        .map(|record| {
            let record =
                record.map_err(|e| ExtractError::parse(format!("malformed record: {e}")))?;
            Ok(record
                .iter()
                .map(|f| f.trim_matches('"').trim().to_string())
                .collect::<Vec<_>>())
        })
        .filter(|record| {
            record
                .as_ref()
                .map_or(true, |fields| fields.iter().any(|f| !f.is_empty()))
        })
}

/// Non-empty field at `index`.
pub fn field<S: AsRef<str>>(fields: &[S], index: usize) -> Option<&str> {
    fields
        .get(index)
        .map(AsRef::as_ref)
        .filter(|v| !v.is_empty())
}

/// Whether the record type of `fields` starts with `prefix`, ignoring case.
pub fn has_record_type<S: AsRef<str>>(fields: &[S], prefix: &str) -> bool {
    fields.first().is_some_and(|t| {
        t.as_ref()
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

pub fn is_header_record<S: AsRef<str>>(fields: &[S]) -> bool {
    fields
        .first()
        .is_some_and(|t| t.as_ref().eq_ignore_ascii_case("HDR"))
}

/// Identity fields of a form record.
#[derive(Debug, Clone, PartialEq)]
pub struct FormRecord {
    pub form_type: String,
    pub filer_id: Option<String>,
    pub committee_name: Option<String>,
}

impl FormRecord {
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        let form_type = field(fields, 0)?;
        Some(Self {
            form_type: form_type.to_string(),
            filer_id: field(fields, 1).map(str::to_string),
            committee_name: field(fields, 2).map(str::to_string),
        })
    }
}

/// Parse a monetary token, tolerating thousands separators.
pub fn parse_amount(token: &str) -> Option<f64> {
    let cleaned = token.replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `MM/DD/YYYY` or `YYYYMMDD`.
pub fn parse_date(token: &str) -> Option<NaiveDate> {
    if token.len() == 8 && token.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(token, "%Y%m%d").ok();
    }
    if token.contains('/') {
        return parse_mmddyyyy(token);
    }
    None
}

/// Total receipts from a summary record.
///
/// With an explicit column the value is read from there. Otherwise the first
/// non-negative decimal amount from column 4 onward is used; dates, zip codes
/// and identifiers carry no decimal point and are passed over.
pub fn total_receipts<S: AsRef<str>>(fields: &[S], column: Option<usize>) -> Option<f64> {
    if let Some(column) = column {
        return field(fields, column).and_then(parse_amount);
    }
    fields
        .iter()
        .skip(4)
        .map(AsRef::as_ref)
        .filter(|t| t.contains('.'))
        .filter_map(parse_amount)
        .find(|v| *v >= 0.0)
}

/// First date-looking field of an itemized line.
pub fn first_date<S: AsRef<str>>(fields: &[S]) -> Option<NaiveDate> {
    fields.iter().skip(1).find_map(|t| parse_date(t.as_ref()))
}

/// First amount of an itemized line with magnitude of at least one.
///
/// Decimal tokens are preferred; whole numbers that are not dates are the
/// fallback.
pub fn first_amount<S: AsRef<str>>(fields: &[S]) -> Option<f64> {
    let candidates = || fields.iter().skip(1).map(AsRef::as_ref);
    candidates()
        .filter(|t| t.contains('.'))
        .filter_map(parse_amount)
        .find(|v| v.abs() >= 1.0)
        .or_else(|| {
            candidates()
                .filter(|t| parse_date(t).is_none())
                .filter_map(parse_amount)
                .find(|v| v.abs() >= 1.0)
        })
}

fn support_oppose_code(token: &str) -> Option<String> {
    (token.eq_ignore_ascii_case("S") || token.eq_ignore_ascii_case("O"))
        .then(|| token.to_ascii_uppercase())
}

/// Support (`S`) or oppose (`O`) indicator of an itemized line.
pub fn support_oppose<S: AsRef<str>>(fields: &[S]) -> Option<String> {
    fields
        .iter()
        .skip(1)
        .find_map(|t| support_oppose_code(t.as_ref()))
}

/// Typed fields of a Schedule E line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleE {
    pub expenditure_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub support_oppose: Option<String>,
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub candidate_office: Option<String>,
    pub candidate_state: Option<String>,
    pub candidate_district: Option<String>,
    pub candidate_party: Option<String>,
    pub election_code: Option<String>,
    pub purpose: Option<String>,
    pub payee_name: Option<String>,
}

impl ScheduleE {
    /// Read a line by `layout`, falling back to heuristics for the date,
    /// amount and indicator when a position is empty or unparseable.
    ///
    /// Lines too short for the layout only get the heuristic fields.
    pub fn read<S: AsRef<str>>(fields: &[S], layout: &ScheduleELayout) -> Self {
        if fields.len() < layout.min_columns() {
            return Self {
                expenditure_date: first_date(fields),
                amount: first_amount(fields),
                support_oppose: support_oppose(fields),
                ..Self::default()
            };
        }

        let text = |index: usize| field(fields, index).map(str::to_string);
        let joined = |indexes: &[usize]| {
            let parts: Vec<&str> = indexes.iter().filter_map(|&i| field(fields, i)).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        };

        Self {
            expenditure_date: field(fields, layout.dissemination_date)
                .and_then(parse_date)
                .or_else(|| field(fields, layout.disbursement_date).and_then(parse_date))
                .or_else(|| first_date(fields)),
            amount: field(fields, layout.amount)
                .and_then(parse_amount)
                .or_else(|| first_amount(fields)),
            support_oppose: field(fields, layout.support_oppose)
                .and_then(support_oppose_code)
                .or_else(|| support_oppose(fields)),
            candidate_id: text(layout.candidate_id),
            candidate_name: joined(&[
                layout.candidate_first_name,
                layout.candidate_middle_name,
                layout.candidate_last_name,
            ]),
            candidate_office: text(layout.candidate_office),
            candidate_state: text(layout.candidate_state),
            candidate_district: text(layout.candidate_district),
            candidate_party: layout.candidate_party.and_then(text),
            election_code: text(layout.election_code),
            purpose: text(layout.purpose),
            payee_name: text(layout.payee_organization)
                .or_else(|| joined(&[layout.payee_first_name, layout.payee_last_name])),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A Schedule E line in the default layout with `values` at their columns.
    pub(crate) fn se_line(values: &[(usize, &str)]) -> String {
        let mut fields = vec![""; 44];
        fields[0] = "SE";
        for &(index, value) in values {
            fields[index] = value;
        }
        fields.join("|")
    }

    fn parse(text: &str) -> Vec<Vec<String>> {
        let delimiter = detect_delimiter(text.lines().next().unwrap_or_default());
        records(text, delimiter).map(Result::unwrap).collect()
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("HDR|FEC|8.4"), b'|');
        assert_eq!(detect_delimiter("HDR\x1cFEC\x1c8.4"), 0x1c);
    }

    #[test]
    fn test_records_trim_quotes_and_skip_blank_lines() {
        let records = parse("F3XN| \"C001\" |Name \r\n\r\n  \nSE|x\n");
        assert_eq!(
            records,
            vec![vec!["F3XN", "C001", "Name"], vec!["SE", "x"]]
        );
    }

    #[test]
    fn test_quoted_delimiter_stays_in_field() {
        let records = parse("SE|C001|\"ADS | MAIL, INC\"|2,500.00\n");
        assert_eq!(records[0], vec!["SE", "C001", "ADS | MAIL, INC", "2,500.00"]);

        let records = parse("SE\x1cC001\x1c\"A\x1cB\"\x1c1.00\n");
        assert_eq!(records[0].len(), 4);
        assert_eq!(records[0][2], "A\x1cB");
    }

    #[test]
    fn test_record_type_prefix() {
        assert!(has_record_type(&["f3xn", "x"], "F3X"));
        assert!(has_record_type(&["SE", "x"], "SE"));
        assert!(!has_record_type(&["SA11AI"], "SE"));
        assert!(!has_record_type::<&str>(&[], "SE"));
        assert!(is_header_record(&["hdr"]));
    }

    #[test]
    fn test_total_receipts_heuristic_skips_non_decimal() {
        let fields = [
            "F3XN", "C001", "PAC", "1 Main St", "20001", "20260701", "1,234.50", "99.00",
        ];
        assert_eq!(total_receipts(&fields, None), Some(1234.5));
        assert_eq!(total_receipts(&fields, Some(7)), Some(99.0));
        assert_eq!(total_receipts(&fields, Some(40)), None);
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("20261001"), NaiveDate::from_ymd_opt(2026, 10, 1));
        assert_eq!(parse_date("10/01/2026"), NaiveDate::from_ymd_opt(2026, 10, 1));
        assert_eq!(parse_date("20261399"), None);
        assert_eq!(parse_date("12345"), None);
    }

    #[test]
    fn test_itemized_line_heuristics() {
        let fields = ["SE", "C001", "SE.1", "20261002", "0.50", "2,500.00", "O", "H0XX01"];
        assert_eq!(first_date(&fields), NaiveDate::from_ymd_opt(2026, 10, 2));
        assert_eq!(first_amount(&fields), Some(2500.0));
        assert_eq!(support_oppose(&fields), Some("O".to_string()));
    }

    #[test]
    fn test_first_amount_falls_back_to_whole_numbers() {
        let fields = ["SE", "C001", "20261002", "750", "s"];
        assert_eq!(first_amount(&fields), Some(750.0));
        assert_eq!(support_oppose(&fields), Some("S".to_string()));
    }

    #[test]
    fn test_schedule_e_by_position() {
        let line = se_line(&[
            (1, "C00000002"),
            (5, "ORG"),
            (6, "ADS INC"),
            (17, "G2026"),
            (19, "20261002"),
            (20, "2500.00"),
            (21, "20261001"),
            (23, "TV spot"),
            (26, "O"),
            (27, "H6XX01234"),
            (28, "Doe"),
            (29, "Jane"),
            (30, "Q"),
            (33, "H"),
            (34, "01"),
            (35, "XX"),
        ]);
        let fields = &parse(&line)[0];
        let se = ScheduleE::read(fields, &ScheduleELayout::default());

        assert_eq!(se.expenditure_date, NaiveDate::from_ymd_opt(2026, 10, 2));
        assert_eq!(se.amount, Some(2500.0));
        assert_eq!(se.support_oppose.as_deref(), Some("O"));
        assert_eq!(se.candidate_id.as_deref(), Some("H6XX01234"));
        assert_eq!(se.candidate_name.as_deref(), Some("Jane Q Doe"));
        assert_eq!(se.candidate_office.as_deref(), Some("H"));
        assert_eq!(se.candidate_state.as_deref(), Some("XX"));
        assert_eq!(se.candidate_district.as_deref(), Some("01"));
        assert_eq!(se.candidate_party, None);
        assert_eq!(se.election_code.as_deref(), Some("G2026"));
        assert_eq!(se.purpose.as_deref(), Some("TV spot"));
        assert_eq!(se.payee_name.as_deref(), Some("ADS INC"));
    }

    #[test]
    fn test_schedule_e_fallbacks() {
        // Individual payee, disbursement date only, amount in an odd column
        let line = se_line(&[
            (7, "Smith"),
            (8, "John"),
            (15, "850.00"),
            (21, "10/03/2026"),
            (26, "s"),
            (27, "S6XX00001"),
        ]);
        let fields = &parse(&line)[0];
        let mut layout = ScheduleELayout::default();
        layout.candidate_party = Some(40);
        let se = ScheduleE::read(fields, &layout);

        assert_eq!(se.payee_name.as_deref(), Some("John Smith"));
        assert_eq!(se.expenditure_date, NaiveDate::from_ymd_opt(2026, 10, 3));
        assert_eq!(se.amount, Some(850.0));
        assert_eq!(se.support_oppose.as_deref(), Some("S"));
        assert_eq!(se.candidate_name, None);
        assert_eq!(se.candidate_party, None);
    }

    #[test]
    fn test_short_line_uses_heuristics_only() {
        let fields = ["SE", "C001", "SE.1", "Ads Inc", "20261002", "2,500.00", "O"];
        let se = ScheduleE::read(&fields, &ScheduleELayout::default());
        assert_eq!(se.amount, Some(2500.0));
        assert_eq!(se.support_oppose.as_deref(), Some("O"));
        assert_eq!(se.expenditure_date, NaiveDate::from_ymd_opt(2026, 10, 2));
        assert_eq!(se.payee_name, None);
        assert_eq!(se.candidate_id, None);
    }
}
