//! Central CSV feed import.
//!
//! A feed is a flat list of grants for many machines:
//!
//! ```text
//! system,username,path,checksum,arguments
//! BUILD01,CORP\alice,c:\tools\build.exe,,/^--release$/
//! BUILD01,CORP\bob,*,,
//! ```
//!
//! Rows for the local machine are kept, sorted by user, and folded into
//! a single `sudoers` user group. A `*` path grants all commands.

use crate::error::PolicyError;
use crate::model::{CommandEntry, PolicyDocument, UserEntry, UserGroupEntry};
use crate::schema;
use crate::values::{ArgumentSpec, Md5Checksum, TimeOfDay};
use elevate_types::{GroupName, LoggingLevel, TriState, UserName};
use serde::Deserialize;

/// Name of the user group every feed user is placed in.
pub const FEED_GROUP: &str = "sudoers";

const COLUMNS: [&str; 5] = ["system", "username", "path", "checksum", "arguments"];

/// One feed record as read; blank fields are `None`.
#[derive(Debug, Deserialize)]
struct FeedRecord {
    system: Option<String>,
    username: Option<String>,
    path: Option<String>,
    checksum: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug)]
struct Row {
    line: usize,
    user: UserName,
    path: String,
    checksum: Option<String>,
    arguments: Option<String>,
}

fn csv_error(e: &csv::Error) -> PolicyError {
    let line = e.position().map_or(0, |p| p.line() as usize);
    PolicyError::feed(line, e.to_string())
}

/// Converts a CSV feed into a validated policy document for `machine`.
///
/// Header names are matched case-insensitively; extra columns are
/// ignored. Quoted fields may contain commas, `""` escapes and line
/// breaks.
///
/// # Errors
///
/// [`PolicyError::Feed`] for a missing header column or malformed row,
/// [`PolicyError::Schema`] if the resulting document fails validation.
pub fn import_csv(
    body: &str,
    machine: &str,
    expected_schema: &str,
    origin: &str,
) -> Result<PolicyDocument, PolicyError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let header: csv::StringRecord = reader
        .headers()
        .map_err(|e| csv_error(&e))?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect();
    if header.iter().all(str::is_empty) {
        return Err(PolicyError::feed(1, "feed is empty"));
    }
    if let Some(col) = COLUMNS.iter().find(|col| !header.iter().any(|h| h == **col)) {
        return Err(PolicyError::feed(1, format!("missing column '{col}'")));
    }

    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record).map_err(|e| csv_error(&e))? {
        let line = record.position().map_or(0, |p| p.line() as usize);
        let fields: FeedRecord = record
            .deserialize(Some(&header))
            .map_err(|e| PolicyError::feed(line, e.to_string()))?;

        let system = fields
            .system
            .ok_or_else(|| PolicyError::feed(line, "system is empty"))?;
        if !system.eq_ignore_ascii_case(machine) {
            continue;
        }
        let user = fields
            .username
            .ok_or_else(|| PolicyError::feed(line, "username is empty"))
            .and_then(|u| UserName::parse(&u).map_err(|e| PolicyError::feed(line, e.to_string())))?;
        let path = fields
            .path
            .ok_or_else(|| PolicyError::feed(line, "path is empty"))?;

        rows.push(Row {
            line,
            user,
            path,
            checksum: fields.checksum,
            arguments: fields.arguments,
        });
    }
    rows.sort_by(|a, b| a.user.key().cmp(b.user.key()));

    let mut group = UserGroupEntry::new(
        GroupName::parse(FEED_GROUP).map_err(|e| PolicyError::feed(0, e.to_string()))?,
    );
    for row in rows {
        if group.users.last().map_or(true, |last| last.name != row.user) {
            let mut entry = UserEntry::new(row.user.clone());
            entry.allow_all_commands = TriState::False;
            group.users.push(entry);
        }
        let Some(entry) = group.users.last_mut() else {
            continue;
        };

        if row.path == "*" {
            entry.allow_all_commands = TriState::True;
            continue;
        }

        let mut cmd = CommandEntry::new(row.path);
        cmd.md5_checksum = row
            .checksum
            .map(|c| Md5Checksum::parse(&c))
            .transpose()
            .map_err(|e| PolicyError::feed(row.line, e))?;
        cmd.argument_string = row
            .arguments
            .map(|a| ArgumentSpec::parse(&a))
            .transpose()
            .map_err(|e| PolicyError::feed(row.line, e))?;
        entry.commands.push(cmd);
    }

    let mut doc = PolicyDocument::empty(expected_schema);
    doc.privileges_group = GroupName::parse("Administrators").ok();
    doc.logging_level = Some(LoggingLevel::Both);
    doc.allow_all_commands = TriState::False;
    doc.start_time = Some(TimeOfDay::MIDNIGHT);
    doc.end_time = None;
    doc.user_groups.push(group);

    schema::validate(&doc, expected_schema, origin)?;
    tracing::debug!(
        origin,
        machine,
        users = doc.user_groups[0].users.len(),
        "imported policy feed"
    );
    Ok(doc)
}
