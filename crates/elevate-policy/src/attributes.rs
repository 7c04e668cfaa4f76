//! Attribute resolution.
//!
//! Attributes are inherited along a fixed chain. For a user:
//!
//! ```text
//! user (or matched group) ──► containing user group ──► document defaults
//! ```
//!
//! For a command:
//!
//! ```text
//! command ──► command group ──► user chain (defaults-level attributes only)
//! ```
//!
//! Each attribute is a marker type implementing [`UserAttribute`] and/or
//! [`CommandAttribute`], so a lookup names the attribute by type and gets
//! back a typed value. Only attributes that also exist at the document
//! defaults level override [`CommandAttribute::from_user_chain`]; a
//! user-only setting such as [`Enabled`] can never leak onto a command.
//!
//! # Example
//!
//! ```
//! use elevate_policy::{attributes, PolicyDocument, UserEntry, UserNode};
//! use elevate_types::{GroupName, UserName};
//!
//! let mut doc = PolicyDocument::empty("urn:elevate:policy:v1");
//! doc.privileges_group = Some(GroupName::parse("Administrators").unwrap());
//! doc.users.push(UserEntry::new(UserName::parse("HOST\\bob").unwrap()));
//!
//! let bob = UserNode::listed(&doc, &UserName::parse("host\\bob").unwrap()).unwrap();
//! let group = bob.attribute::<attributes::PrivilegesGroup>(true);
//! assert_eq!(group.unwrap().to_string(), "Administrators");
//! ```

use crate::model::{CommandEntry, CommandGroupEntry, PolicyDocument, UserEntry, UserGroupEntry};
use crate::values::{AllowedNetworks, TimeOfDay, TimeWindow};
use elevate_types::{GroupName, LoggingLevel, TriState, UserName};

// ── Settings views ────────────────────────────────────────────────────

/// Read access to the attributes a user-level node may carry.
///
/// Implemented by [`UserEntry`], [`UserGroupEntry`] and
/// [`PolicyDocument`] (the defaults). Unsupported attributes report
/// absent.
pub trait UserSettings {
    fn enabled(&self) -> TriState {
        TriState::Unset
    }
    fn allow_all_commands(&self) -> TriState;
    fn privileges_group(&self) -> Option<&GroupName>;
    fn logging_level(&self) -> Option<LoggingLevel>;
    fn start_time(&self) -> Option<TimeOfDay>;
    fn end_time(&self) -> Option<TimeOfDay>;
    fn allowed_networks(&self) -> Option<&AllowedNetworks>;
    fn invalid_logons(&self) -> Option<i32>;
    fn times_exceeded_invalid_logons(&self) -> Option<i32>;
    fn invalid_logon_timeout(&self) -> Option<u64>;
    fn lockout_timeout(&self) -> Option<u64>;
    fn logon_timeout(&self) -> Option<u64>;
}

/// Read access to the attributes a command-level node may carry.
pub trait CommandSettings {
    fn enabled(&self) -> TriState;
    fn logging_level(&self) -> Option<LoggingLevel>;
    fn start_time(&self) -> Option<TimeOfDay>;
    fn end_time(&self) -> Option<TimeOfDay>;
    fn allowed_networks(&self) -> Option<&AllowedNetworks>;
}

macro_rules! impl_user_settings {
    ($ty:ty $(, $enabled:ident)?) => {
        impl UserSettings for $ty {
            $(
                fn enabled(&self) -> TriState {
                    self.$enabled
                }
            )?
            fn allow_all_commands(&self) -> TriState {
                self.allow_all_commands
            }
            fn privileges_group(&self) -> Option<&GroupName> {
                self.privileges_group.as_ref()
            }
            fn logging_level(&self) -> Option<LoggingLevel> {
                self.logging_level
            }
            fn start_time(&self) -> Option<TimeOfDay> {
                self.start_time
            }
            fn end_time(&self) -> Option<TimeOfDay> {
                self.end_time
            }
            fn allowed_networks(&self) -> Option<&AllowedNetworks> {
                self.allowed_networks.as_ref()
            }
            fn invalid_logons(&self) -> Option<i32> {
                self.invalid_logons
            }
            fn times_exceeded_invalid_logons(&self) -> Option<i32> {
                self.times_exceeded_invalid_logons
            }
            fn invalid_logon_timeout(&self) -> Option<u64> {
                self.invalid_logon_timeout
            }
            fn lockout_timeout(&self) -> Option<u64> {
                self.lockout_timeout
            }
            fn logon_timeout(&self) -> Option<u64> {
                self.logon_timeout
            }
        }
    };
}

impl_user_settings!(UserEntry, enabled);
impl_user_settings!(UserGroupEntry, enabled);
impl_user_settings!(PolicyDocument);

macro_rules! impl_command_settings {
    ($ty:ty) => {
        impl CommandSettings for $ty {
            fn enabled(&self) -> TriState {
                self.enabled
            }
            fn logging_level(&self) -> Option<LoggingLevel> {
                self.logging_level
            }
            fn start_time(&self) -> Option<TimeOfDay> {
                self.start_time
            }
            fn end_time(&self) -> Option<TimeOfDay> {
                self.end_time
            }
            fn allowed_networks(&self) -> Option<&AllowedNetworks> {
                self.allowed_networks.as_ref()
            }
        }
    };
}

impl_command_settings!(CommandEntry);
impl_command_settings!(CommandGroupEntry);

// ── Attribute markers ─────────────────────────────────────────────────

/// An attribute resolvable along the user chain.
pub trait UserAttribute {
    type Value;

    fn read(node: &dyn UserSettings) -> Option<Self::Value>;
}

/// An attribute resolvable along the command chain.
pub trait CommandAttribute {
    type Value;

    fn read(node: &dyn CommandSettings) -> Option<Self::Value>;

    /// Fallback once the command and its group are exhausted.
    ///
    /// Absent unless the attribute exists at the document defaults level.
    fn from_user_chain(_user: &UserNode<'_>) -> Option<Self::Value> {
        None
    }
}

fn tri(t: TriState) -> Option<bool> {
    t.as_bool()
}

macro_rules! user_attribute {
    ($(#[$meta:meta])* $marker:ident: $value:ty = |$n:ident| $read:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $marker;

        impl UserAttribute for $marker {
            type Value = $value;

            fn read($n: &dyn UserSettings) -> Option<$value> {
                $read
            }
        }
    };
}

user_attribute! {
    /// `enabled`; never set at the defaults level.
    Enabled: bool = |n| tri(UserSettings::enabled(n))
}
user_attribute! {
    /// `allowAllCommands`
    AllowAllCommands: bool = |n| tri(n.allow_all_commands())
}
user_attribute! {
    /// `privilegesGroup`
    PrivilegesGroup: GroupName = |n| n.privileges_group().cloned()
}
user_attribute! {
    /// `loggingLevel`
    Logging: LoggingLevel = |n| UserSettings::logging_level(n)
}
user_attribute! {
    /// `startTime`
    StartTime: TimeOfDay = |n| UserSettings::start_time(n)
}
user_attribute! {
    /// `endTime`
    EndTime: TimeOfDay = |n| UserSettings::end_time(n)
}
user_attribute! {
    /// `allowedNetworks`
    Networks: AllowedNetworks = |n| UserSettings::allowed_networks(n).cloned()
}
user_attribute! {
    /// `invalidLogons`: failed attempts before the counter trips.
    InvalidLogons: i32 = |n| n.invalid_logons()
}
user_attribute! {
    /// `timesExceededInvalidLogons`: trips before lockout.
    TimesExceededInvalidLogons: i32 = |n| n.times_exceeded_invalid_logons()
}
user_attribute! {
    /// `invalidLogonTimeout` seconds.
    InvalidLogonTimeout: u64 = |n| n.invalid_logon_timeout()
}
user_attribute! {
    /// `lockoutTimeout` seconds.
    LockoutTimeout: u64 = |n| n.lockout_timeout()
}
user_attribute! {
    /// `logonTimeout` seconds.
    LogonTimeout: u64 = |n| n.logon_timeout()
}

impl CommandAttribute for Enabled {
    type Value = bool;

    fn read(node: &dyn CommandSettings) -> Option<bool> {
        tri(node.enabled())
    }
}

macro_rules! cascading_command_attribute {
    ($marker:ident: $value:ty = |$n:ident| $read:expr) => {
        impl CommandAttribute for $marker {
            type Value = $value;

            fn read($n: &dyn CommandSettings) -> Option<$value> {
                $read
            }

            fn from_user_chain(user: &UserNode<'_>) -> Option<$value> {
                user.attribute::<$marker>(true)
            }
        }
    };
}

cascading_command_attribute!(Logging: LoggingLevel = |n| n.logging_level());
cascading_command_attribute!(StartTime: TimeOfDay = |n| n.start_time());
cascading_command_attribute!(EndTime: TimeOfDay = |n| n.end_time());
cascading_command_attribute!(Networks: AllowedNetworks = |n| n.allowed_networks().cloned());

// ── Resolved nodes ────────────────────────────────────────────────────

/// The policy entry a user resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Principal<'a> {
    /// Listed by name.
    User(&'a UserEntry),
    /// Matched through OS membership of the named group.
    Group(&'a UserGroupEntry),
}

/// A user resolved against a document: the matching entry relabeled
/// with the requesting user's name, plus its place in the tree.
#[derive(Debug, Clone)]
pub struct UserNode<'a> {
    name: UserName,
    principal: Principal<'a>,
    parent: Option<&'a UserGroupEntry>,
    document: &'a PolicyDocument,
}

impl<'a> UserNode<'a> {
    /// Resolves a literally listed user, if present.
    #[must_use]
    pub fn listed(document: &'a PolicyDocument, name: &UserName) -> Option<Self> {
        document
            .find_listed_user(name)
            .map(|(entry, parent)| Self {
                name: entry.name.clone(),
                principal: Principal::User(entry),
                parent,
                document,
            })
    }

    /// Treats `group` as the requesting user's node.
    ///
    /// The group's own container is the document root, so the chain
    /// goes straight from the group to the defaults.
    #[must_use]
    pub fn via_group(document: &'a PolicyDocument, group: &'a UserGroupEntry, name: UserName) -> Self {
        Self {
            name,
            principal: Principal::Group(group),
            parent: None,
            document,
        }
    }

    /// Effective user name.
    #[must_use]
    pub fn name(&self) -> &UserName {
        &self.name
    }

    #[must_use]
    pub fn principal(&self) -> Principal<'a> {
        self.principal
    }

    /// Group the user matched through, if not listed by name.
    #[must_use]
    pub fn matched_group(&self) -> Option<&'a GroupName> {
        match self.principal {
            Principal::Group(g) => Some(&g.name),
            Principal::User(_) => None,
        }
    }

    /// Containing user group of a listed user.
    #[must_use]
    pub fn parent(&self) -> Option<&'a UserGroupEntry> {
        self.parent
    }

    #[must_use]
    pub fn document(&self) -> &'a PolicyDocument {
        self.document
    }

    /// Commands owned by the node itself.
    #[must_use]
    pub fn commands(&self) -> &'a [CommandEntry] {
        match self.principal {
            Principal::User(u) => &u.commands,
            Principal::Group(g) => &g.commands,
        }
    }

    /// Command group references owned by the node itself.
    #[must_use]
    pub fn command_group_refs(&self) -> &'a [String] {
        match self.principal {
            Principal::User(u) => &u.command_group_refs,
            Principal::Group(g) => &g.command_group_refs,
        }
    }

    fn settings(&self) -> &'a dyn UserSettings {
        match self.principal {
            Principal::User(u) => u,
            Principal::Group(g) => g,
        }
    }

    /// Resolves `A` along node → containing group → defaults.
    ///
    /// With `check_defaults = false` the walk stops before the
    /// document defaults.
    #[must_use]
    pub fn attribute<A: UserAttribute>(&self, check_defaults: bool) -> Option<A::Value> {
        A::read(self.settings())
            .or_else(|| self.parent.and_then(|p| A::read(p)))
            .or_else(|| {
                if check_defaults {
                    A::read(self.document)
                } else {
                    None
                }
            })
    }

    /// Active window from the user chain.
    #[must_use]
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow {
            start: self
                .attribute::<StartTime>(true)
                .unwrap_or(TimeOfDay::MIDNIGHT),
            end: self.attribute::<EndTime>(true),
        }
    }
}

/// Where a matched command came from, in search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Commands owned by the user node.
    User,
    /// Command groups referenced by the user node.
    UserGroupRef,
    /// Commands owned by the user's containing group.
    Parent,
    /// Command groups referenced by the containing group.
    ParentGroupRef,
}

/// A command entry matched for a user.
#[derive(Debug, Clone, Copy)]
pub struct CommandNode<'a> {
    entry: &'a CommandEntry,
    group: Option<&'a CommandGroupEntry>,
    origin: CommandOrigin,
}

impl<'a> CommandNode<'a> {
    #[must_use]
    pub fn new(
        entry: &'a CommandEntry,
        group: Option<&'a CommandGroupEntry>,
        origin: CommandOrigin,
    ) -> Self {
        Self {
            entry,
            group,
            origin,
        }
    }

    #[must_use]
    pub fn entry(&self) -> &'a CommandEntry {
        self.entry
    }

    /// Command group the entry belongs to, if reached by reference.
    #[must_use]
    pub fn group(&self) -> Option<&'a CommandGroupEntry> {
        self.group
    }

    #[must_use]
    pub fn origin(&self) -> CommandOrigin {
        self.origin
    }

    /// Resolves `A` along command → command group → user chain.
    ///
    /// Passing `None` for `user` confines the walk to the command and
    /// its immediate group.
    #[must_use]
    pub fn attribute<A: CommandAttribute>(&self, user: Option<&UserNode<'_>>) -> Option<A::Value> {
        A::read(self.entry)
            .or_else(|| self.group.and_then(|g| A::read(g)))
            .or_else(|| user.and_then(A::from_user_chain))
    }

    /// Active window from the command chain.
    #[must_use]
    pub fn time_window(&self, user: &UserNode<'_>) -> TimeWindow {
        TimeWindow {
            start: self
                .attribute::<StartTime>(Some(user))
                .unwrap_or(TimeOfDay::MIDNIGHT),
            end: self.attribute::<EndTime>(Some(user)),
        }
    }
}
