//! Document parsing and schema validation.
//!
//! Validation happens in two passes. Strict deserialization rejects
//! unknown fields and malformed values (times, regexes, checksums,
//! account names). The semantic pass below then checks what the type
//! system cannot: the declared schema identifier, references between
//! nodes, and uniqueness.

use crate::error::PolicyError;
use crate::model::{CommandEntry, PolicyDocument};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Serialization format of a policy body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Json,
    Toml,
    /// Flat `system,username,path,checksum,arguments` feed.
    Csv,
}

impl PolicyFormat {
    /// Picks a format from a file extension, defaulting to JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("csv") => Self::Csv,
            _ => Self::Json,
        }
    }

    /// Picks a format from an HTTP content type, falling back to the
    /// URI's extension.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>, uri: &str) -> Self {
        let ct = content_type.unwrap_or_default().to_ascii_lowercase();
        if ct.contains("toml") {
            Self::Toml
        } else if ct.contains("csv") {
            Self::Csv
        } else if ct.contains("json") {
            Self::Json
        } else {
            let path = uri.split(['?', '#']).next().unwrap_or(uri);
            Self::from_path(Path::new(path))
        }
    }
}

/// Parses and validates a JSON or TOML document body.
///
/// CSV bodies go through [`crate::feed`] instead.
pub fn parse_document(
    body: &str,
    format: PolicyFormat,
    expected_schema: &str,
    origin: &str,
) -> Result<PolicyDocument, PolicyError> {
    let doc = match format {
        PolicyFormat::Json => {
            let mut de = serde_json::Deserializer::from_str(body);
            let doc = PolicyDocument::deserialize(&mut de).map_err(|e| classify_json(origin, e))?;
            de.end().map_err(|e| PolicyError::parse(origin, e))?;
            doc
        }
        PolicyFormat::Toml => toml::from_str(body).map_err(|e| PolicyError::parse(origin, e))?,
        PolicyFormat::Csv => {
            return Err(PolicyError::parse(
                origin,
                "CSV feeds must be converted before validation",
            ))
        }
    };
    validate(&doc, expected_schema, origin)?;
    Ok(doc)
}

fn classify_json(origin: &str, e: serde_json::Error) -> PolicyError {
    match e.classify() {
        serde_json::error::Category::Data => PolicyError::schema(origin, e.to_string()),
        _ => PolicyError::parse(origin, e),
    }
}

/// Semantic checks on an already deserialized document.
pub fn validate(doc: &PolicyDocument, expected_schema: &str, origin: &str) -> Result<(), PolicyError> {
    let fail = |msg: String| Err(PolicyError::schema(origin, msg));

    if doc.schema != expected_schema {
        return fail(format!(
            "schema '{}' does not match expected '{}'",
            doc.schema, expected_schema
        ));
    }

    let mut group_names = HashSet::new();
    for cg in &doc.command_groups {
        if cg.name.trim().is_empty() {
            return fail("command group with empty name".into());
        }
        if !group_names.insert(cg.name.to_lowercase()) {
            return fail(format!("duplicate command group '{}'", cg.name));
        }
        check_commands(&cg.commands, &cg.name).or_else(fail)?;
    }

    let check_refs = |refs: &[String], owner: &str| -> Result<(), String> {
        for r in refs {
            if !group_names.contains(&r.to_lowercase()) {
                return Err(format!("'{owner}' references unknown command group '{r}'"));
            }
        }
        Ok(())
    };

    let mut users = HashSet::new();
    let mut user_groups = HashSet::new();

    for u in doc.users.iter().chain(doc.user_groups.iter().flat_map(|g| g.users.iter())) {
        let owner = u.name.to_string();
        if !users.insert(u.name.key().to_string()) {
            return fail(format!("duplicate user '{owner}'"));
        }
        check_commands(&u.commands, &owner).or_else(fail)?;
        check_refs(&u.command_group_refs, &owner).or_else(fail)?;
    }

    for g in &doc.user_groups {
        let owner = g.name.to_string();
        if !user_groups.insert(g.name.key().to_string()) {
            return fail(format!("duplicate user group '{owner}'"));
        }
        check_commands(&g.commands, &owner).or_else(fail)?;
        check_refs(&g.command_group_refs, &owner).or_else(fail)?;
    }

    Ok(())
}

fn check_commands(commands: &[CommandEntry], owner: &str) -> Result<(), String> {
    match commands.iter().find(|c| c.path.trim().is_empty()) {
        Some(_) => Err(format!("'{owner}' has a command with an empty path")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "urn:elevate:policy:v1";

    #[test]
    fn accepts_valid_document() {
        let body = r#"{
            "schema": "urn:elevate:policy:v1",
            "users": [ { "name": "HOST\\bob", "commandGroupRefs": ["TOOLS"] } ],
            "commandGroups": [ { "name": "tools", "commands": [ { "path": "x.exe" } ] } ]
        }"#;
        let doc = parse_document(body, PolicyFormat::Json, SCHEMA, "test").unwrap();
        assert_eq!(doc.users.len(), 1);
    }

    #[test]
    fn wrong_schema_id_is_schema_error() {
        let body = r#"{ "schema": "urn:other" }"#;
        let err = parse_document(body, PolicyFormat::Json, SCHEMA, "test").unwrap_err();
        assert!(matches!(err, PolicyError::Schema { .. }), "got: {err}");
    }

    #[test]
    fn dangling_ref_is_rejected() {
        let body = r#"{ "schema": "urn:elevate:policy:v1",
            "userGroups": [ { "name": "Admins", "commandGroupRefs": ["missing"] } ] }"#;
        let err = parse_document(body, PolicyFormat::Json, SCHEMA, "test").unwrap_err();
        assert!(err.to_string().contains("missing"), "got: {err}");
    }

    #[test]
    fn duplicate_user_across_groups_is_rejected() {
        let body = r#"{ "schema": "urn:elevate:policy:v1",
            "users": [ { "name": "HOST\\bob" } ],
            "userGroups": [ { "name": "G", "users": [ { "name": "host\\BOB" } ] } ] }"#;
        let err = parse_document(body, PolicyFormat::Json, SCHEMA, "test").unwrap_err();
        assert!(err.to_string().contains("duplicate user"), "got: {err}");
    }

    #[test]
    fn unknown_field_and_syntax_errors_differ_in_kind() {
        let unknown = r#"{ "schema": "urn:elevate:policy:v1", "colour": "red" }"#;
        let err = parse_document(unknown, PolicyFormat::Json, SCHEMA, "test").unwrap_err();
        assert!(matches!(err, PolicyError::Schema { .. }));

        let broken = r#"{ "schema": "#;
        let err = parse_document(broken, PolicyFormat::Json, SCHEMA, "test").unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
        assert!(err.is_invalid_document());
    }

    #[test]
    fn empty_command_path_is_rejected() {
        let body = r#"{ "schema": "urn:elevate:policy:v1",
            "users": [ { "name": "bob", "commands": [ { "path": " " } ] } ] }"#;
        assert!(parse_document(body, PolicyFormat::Json, SCHEMA, "test").is_err());
    }

    #[test]
    fn format_detection() {
        assert_eq!(PolicyFormat::from_path(Path::new("p.TOML")), PolicyFormat::Toml);
        assert_eq!(PolicyFormat::from_path(Path::new("p")), PolicyFormat::Json);
        assert_eq!(
            PolicyFormat::from_content_type(Some("text/csv; charset=utf-8"), "https://h/p"),
            PolicyFormat::Csv
        );
        assert_eq!(
            PolicyFormat::from_content_type(None, "https://h/policy.toml?v=2"),
            PolicyFormat::Toml
        );
    }
}
