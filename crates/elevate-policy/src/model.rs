//! Policy document model.
//!
//! ```text
//! PolicyDocument (defaults)
//!   ├── users[]            UserEntry ── commands[], commandGroupRefs[]
//!   ├── userGroups[]       UserGroupEntry
//!   │     ├── users[]      UserEntry
//!   │     └── commands[], commandGroupRefs[]
//!   └── commandGroups[]    CommandGroupEntry ── commands[]
//! ```
//!
//! Field names are camelCase on the wire. Every struct denies unknown
//! fields, so a typo in an attribute name is a schema violation rather
//! than a silently ignored setting.

use crate::values::{empty_as_none, AllowedNetworks, ArgumentSpec, Md5Checksum, TimeOfDay};
use elevate_types::{GroupName, LoggingLevel, TriState, UserName};
use serde::{Deserialize, Serialize};

/// Schema identifier written by this version.
pub const DEFAULT_SCHEMA: &str = "urn:elevate:policy:v1";

/// Root of the policy tree; its attributes are the document defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyDocument {
    pub schema: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileges_group: Option<GroupName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub allow_all_commands: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeOfDay>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_networks: Option<AllowedNetworks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times_exceeded_invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logon_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logon_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_groups: Vec<UserGroupEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_groups: Vec<CommandGroupEntry>,
}

/// A user listed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserEntry {
    pub name: UserName,

    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub enabled: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileges_group: Option<GroupName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub allow_all_commands: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeOfDay>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_networks: Option<AllowedNetworks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times_exceeded_invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logon_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logon_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_group_refs: Vec<String>,
}

/// A group of users, doubling as a match target for members of the OS
/// group of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserGroupEntry {
    pub name: GroupName,

    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub enabled: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileges_group: Option<GroupName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub allow_all_commands: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeOfDay>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_networks: Option<AllowedNetworks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times_exceeded_invalid_logons: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_logon_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logon_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_group_refs: Vec<String>,
}

/// A named, reusable list of commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandGroupEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub enabled: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeOfDay>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_networks: Option<AllowedNetworks>,

    #[serde(default)]
    pub commands: Vec<CommandEntry>,
}

/// One allowed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandEntry {
    pub path: String,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub md5_checksum: Option<Md5Checksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_string: Option<ArgumentSpec>,
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    pub enabled: TriState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeOfDay>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_networks: Option<AllowedNetworks>,
}

impl CommandEntry {
    /// A command entry matching `path` with any arguments.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            md5_checksum: None,
            argument_string: None,
            enabled: TriState::Unset,
            logging_level: None,
            start_time: None,
            end_time: None,
            allowed_networks: None,
        }
    }

    /// Returns `true` if this entry admits the live command.
    ///
    /// `checksum` is the MD5 of the file on disk, `None` if it could not
    /// be computed. A pinned entry never matches an uncomputable file.
    #[must_use]
    pub fn matches(&self, path: &str, arguments: Option<&str>, checksum: Option<&str>) -> bool {
        if self.path.to_lowercase() != path.to_lowercase() {
            return false;
        }
        if let Some(pinned) = &self.md5_checksum {
            if !checksum.is_some_and(|c| pinned.matches(c)) {
                return false;
            }
        }
        match &self.argument_string {
            None => true,
            Some(spec) => spec.matches(arguments.unwrap_or_default()),
        }
    }
}

impl PolicyDocument {
    /// An empty document with the given schema identifier.
    #[must_use]
    pub fn empty(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            privileges_group: None,
            logging_level: None,
            allow_all_commands: TriState::Unset,
            start_time: None,
            end_time: None,
            allowed_networks: None,
            invalid_logons: None,
            times_exceeded_invalid_logons: None,
            invalid_logon_timeout: None,
            lockout_timeout: None,
            logon_timeout: None,
            users: Vec::new(),
            user_groups: Vec::new(),
            command_groups: Vec::new(),
        }
    }

    /// Finds a literally listed user, root-level entries first, then
    /// group members in document order.
    ///
    /// Returns the entry and its containing group, if any.
    #[must_use]
    pub fn find_listed_user(&self, name: &UserName) -> Option<(&UserEntry, Option<&UserGroupEntry>)> {
        self.users
            .iter()
            .find(|u| &u.name == name)
            .map(|u| (u, None))
            .or_else(|| {
                self.user_groups.iter().find_map(|g| {
                    g.users.iter().find(|u| &u.name == name).map(|u| (u, Some(g)))
                })
            })
    }

    /// Looks up a command group by name, case-insensitively.
    #[must_use]
    pub fn command_group(&self, name: &str) -> Option<&CommandGroupEntry> {
        self.command_groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
    }
}

impl UserEntry {
    /// A bare user entry with no attributes or commands.
    #[must_use]
    pub fn new(name: UserName) -> Self {
        Self {
            name,
            enabled: TriState::Unset,
            privileges_group: None,
            logging_level: None,
            allow_all_commands: TriState::Unset,
            start_time: None,
            end_time: None,
            allowed_networks: None,
            invalid_logons: None,
            times_exceeded_invalid_logons: None,
            invalid_logon_timeout: None,
            lockout_timeout: None,
            logon_timeout: None,
            commands: Vec::new(),
            command_group_refs: Vec::new(),
        }
    }
}

impl UserGroupEntry {
    /// A bare group entry with no attributes, members or commands.
    #[must_use]
    pub fn new(name: GroupName) -> Self {
        Self {
            name,
            enabled: TriState::Unset,
            privileges_group: None,
            logging_level: None,
            allow_all_commands: TriState::Unset,
            start_time: None,
            end_time: None,
            allowed_networks: None,
            invalid_logons: None,
            times_exceeded_invalid_logons: None,
            invalid_logon_timeout: None,
            lockout_timeout: None,
            logon_timeout: None,
            users: Vec::new(),
            commands: Vec::new(),
            command_group_refs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "schema": "urn:elevate:policy:v1",
        "privilegesGroup": "Administrators",
        "loggingLevel": "both",
        "users": [ { "name": "HOST\\bob", "commandGroupRefs": ["tools"] } ],
        "userGroups": [
            {
                "name": "Admins",
                "users": [ { "name": "HOST\\carol", "enabled": false } ],
                "commands": [ { "path": "c:\\tools\\build.exe", "argumentString": "/^--release$/" } ]
            }
        ],
        "commandGroups": [ { "name": "Tools", "commands": [ { "path": "c:\\tools\\x.exe", "md5Checksum": "" } ] } ]
    }"#;

    #[test]
    fn parses_nested_tree() {
        let doc: PolicyDocument = serde_json::from_str(DOC).unwrap();
        assert_eq!(doc.users.len(), 1);
        assert_eq!(doc.user_groups[0].users[0].enabled, TriState::False);
        assert_eq!(doc.logging_level, Some(LoggingLevel::Both));
        assert!(doc.command_groups[0].commands[0].md5_checksum.is_none());
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let bad = r#"{ "schema": "x", "users": [ { "name": "bob", "enabeld": true } ] }"#;
        let err = serde_json::from_str::<PolicyDocument>(bad).unwrap_err();
        assert!(err.to_string().contains("enabeld"), "got: {err}");
    }

    #[test]
    fn invalid_regex_is_rejected_at_parse() {
        let bad = r#"{ "schema": "x", "users": [ { "name": "bob",
            "commands": [ { "path": "a", "argumentString": "/([/" } ] } ] }"#;
        assert!(serde_json::from_str::<PolicyDocument>(bad).is_err());
    }

    #[test]
    fn find_listed_user_case_insensitive() {
        let doc: PolicyDocument = serde_json::from_str(DOC).unwrap();
        let (u, parent) = doc.find_listed_user(&"host\\BOB".parse().unwrap()).unwrap();
        assert_eq!(u.name.to_string(), "HOST\\bob");
        assert!(parent.is_none());

        let (_, parent) = doc.find_listed_user(&"HOST\\Carol".parse().unwrap()).unwrap();
        assert_eq!(parent.unwrap().name.to_string(), "Admins");

        assert!(doc.find_listed_user(&"HOST\\dave".parse().unwrap()).is_none());
        assert!(doc.command_group("tools").is_some());
    }

    #[test]
    fn command_match_predicate() {
        let mut cmd = CommandEntry::new("C:\\Tools\\Build.exe");
        assert!(cmd.matches("c:\\tools\\build.exe", Some("anything"), None));

        cmd.md5_checksum = Some(Md5Checksum::parse("0123456789abcdef0123456789abcdef").unwrap());
        assert!(cmd.matches("c:\\tools\\build.exe", None, Some("0123456789ABCDEF0123456789ABCDEF")));
        assert!(!cmd.matches("c:\\tools\\build.exe", None, Some("ffffffffffffffffffffffffffffffff")));
        assert!(!cmd.matches("c:\\tools\\build.exe", None, None));

        cmd.md5_checksum = None;
        cmd.argument_string = Some(ArgumentSpec::parse("--force").unwrap());
        assert!(cmd.matches("c:\\tools\\build.exe", Some("--force"), None));
        assert!(!cmd.matches("c:\\tools\\build.exe", Some("--force extra"), None));
        assert!(!cmd.matches("c:\\tools\\other.exe", Some("--force"), None));
    }

    #[test]
    fn toml_form_is_equivalent() {
        let toml_doc = r#"
            schema = "urn:elevate:policy:v1"
            allowAllCommands = true

            [[users]]
            name = 'HOST\alice'
            startTime = "09:00:00"
        "#;
        let doc: PolicyDocument = toml::from_str(toml_doc).unwrap();
        assert_eq!(doc.allow_all_commands, TriState::True);
        assert_eq!(doc.users[0].start_time, TimeOfDay::from_hms(9, 0, 0));
    }
}
