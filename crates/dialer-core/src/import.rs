//! Contact sheet import
//!
//! Sheets come from many sources, so columns are matched loosely: the phone
//! column is the first header containing `phone`, `number` or `mobile`, the
//! name column the first other header containing `name` or `first`.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info};

use crate::contact::{Contact, ContactId};
use crate::error::{DialerError, DialerResult};
use crate::phone::{format_phone, CountryCode};

const PHONE_HEADERS: &[&str] = &["phone", "number", "mobile"];
const NAME_HEADERS: &[&str] = &["name", "first"];

/// Result of importing a contact sheet
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Contacts in file order, all pending
    pub contacts: Vec<Contact>,
    /// Data rows dropped because they had no phone value
    pub skipped_rows: usize,
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    phone: usize,
    name: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> DialerResult<Self> {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let phone = lowered
            .iter()
            .position(|h| PHONE_HEADERS.iter().any(|p| h.contains(p)))
            .ok_or_else(|| {
                DialerError::import(format!(
                    "no phone column found in headers [{}]",
                    headers.iter().collect::<Vec<_>>().join(", ")
                ))
            })?;

        let name = (0..lowered.len())
            .find(|&i| i != phone && NAME_HEADERS.iter().any(|n| lowered[i].contains(n)));

        Ok(Self { phone, name })
    }
}

/// Parse a contact sheet into pending contacts
pub fn parse_contacts<R: Read>(
    reader: R,
    country_code: &CountryCode,
) -> DialerResult<ImportReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns = Columns::resolve(&headers)?;
    debug!(phone_column = columns.phone, name_column = ?columns.name, "Resolved contact columns");

    let mut report = ImportReport::default();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let original_phone = record.get(columns.phone).unwrap_or("").to_string();
        if original_phone.is_empty() {
            debug!(row = row + 1, "Skipping row without phone value");
            report.skipped_rows += 1;
            continue;
        }

        let id = ContactId(report.contacts.len() + 1);
        let name = columns
            .name
            .and_then(|i| record.get(i))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Contact {id}"));
        let phone = format_phone(&original_phone, country_code);

        report.contacts.push(Contact::new(id, name, phone, original_phone));
    }

    info!(
        imported = report.contacts.len(),
        skipped = report.skipped_rows,
        "Imported contact sheet"
    );
    Ok(report)
}

/// Parse a contact sheet held in memory
pub fn parse_contacts_str(content: &str, country_code: &CountryCode) -> DialerResult<ImportReport> {
    parse_contacts(content.as_bytes(), country_code)
}
