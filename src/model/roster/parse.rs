use std::collections::HashSet;

use csv::{ReaderBuilder, Trim};

use crate::error::VoteError;

/// Header labels accepted in place of an identity on the first record.
const HEADERS: [&str; 7] = [
    "student_id",
    "studentid",
    "student id",
    "student_no",
    "id",
    "identity",
    "sid",
];

/// Field separators recognised in an upload, in order of preference.
const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

const BOM: char = '\u{feff}';

/// Parse an uploaded roster into its distinct identities, in upload order.
///
/// The upload is read as delimited text. Each record contributes its first
/// field, so quoted fields spanning several lines stay within their record.
/// Every identity must be a non-empty run of ASCII letters and digits; if
/// any record fails, the whole upload is refused and every offending record
/// is reported by the line it starts on.
pub fn parse_roster(content: &str) -> Result<Vec<String>, VoteError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(detect_delimiter(content))
        .from_reader(content.as_bytes());

    let mut seen = HashSet::new();
    let mut identities = Vec::new();
    let mut invalid = Vec::new();
    let mut first_record = true;

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map_or(0, |p| p.line());
                invalid.push(format!("line {line}: unreadable record"));
                continue;
            }
        };
        let identity = first_field(record.get(0).unwrap_or_default());
        if identity.is_empty() {
            continue;
        }
        if first_record {
            first_record = false;
            if is_header(identity) {
                continue;
            }
        }

        if is_valid_identity(identity) {
            if seen.insert(identity.to_string()) {
                identities.push(identity.to_string());
            }
        } else {
            let line = record.position().map_or(0, |p| p.line());
            invalid.push(format!("line {line}: {identity:?}"));
        }
    }

    if !invalid.is_empty() {
        return Err(VoteError::InvalidFormat(invalid));
    }
    if identities.is_empty() {
        return Err(VoteError::EmptyRoster);
    }
    Ok(identities)
}

/// The first separator found on the first non-blank line, or a comma.
fn detect_delimiter(content: &str) -> u8 {
    content
        .lines()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.bytes().find(|b| DELIMITERS.contains(b)))
        .unwrap_or(b',')
}

fn first_field(field: &str) -> &str {
    field.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == BOM)
}

fn is_header(column: &str) -> bool {
    HEADERS.iter().any(|h| h.eq_ignore_ascii_case(column))
}

pub fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty() && identity.chars().all(|c| c.is_ascii_alphanumeric())
}
