//! Account identities.
//!
//! Users and groups are named `DOMAIN\name` where the domain is either
//! a directory domain or the local machine name. A bare name (no
//! backslash) is a local account. All comparisons are case-insensitive:
//! equality and hashing go through a lower-cased key computed once at
//! construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Error returned when an account name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name (or the part after the backslash) is empty.
    #[error("account name is empty: '{0}'")]
    Empty(String),
    /// More than one backslash.
    #[error("account name has more than one domain separator: '{0}'")]
    TooManySeparators(String),
}

macro_rules! qualified_name {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Clone, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $ty {
            domain: Option<String>,
            name: String,
            key: String,
        }

        impl $ty {
            /// Creates a qualified name from its parts.
            ///
            /// # Errors
            ///
            /// Returns [`NameError::Empty`] if `name` or a supplied
            /// `domain` is empty.
            pub fn new(domain: Option<&str>, name: &str) -> Result<Self, NameError> {
                let name = name.trim();
                if name.is_empty() {
                    return Err(NameError::Empty(name.to_string()));
                }
                let domain = match domain.map(str::trim) {
                    Some("") => return Err(NameError::Empty(format!("\\{name}"))),
                    Some(d) => Some(d.to_string()),
                    None => None,
                };
                let key = match &domain {
                    Some(d) => format!("{}\\{}", d, name).to_lowercase(),
                    None => name.to_lowercase(),
                };
                Ok(Self {
                    domain,
                    name: name.to_string(),
                    key,
                })
            }

            /// Parses `DOMAIN\name` or a bare `name`.
            ///
            /// # Errors
            ///
            /// Returns [`NameError`] for empty parts or repeated separators.
            pub fn parse(s: &str) -> Result<Self, NameError> {
                let mut parts = s.split('\\');
                let first = parts.next().unwrap_or_default();
                match (parts.next(), parts.next()) {
                    (None, _) => Self::new(None, first),
                    (Some(name), None) => Self::new(Some(first), name),
                    (Some(_), Some(_)) => Err(NameError::TooManySeparators(s.to_string())),
                }
            }

            /// Domain or machine part, if any.
            #[must_use]
            pub fn domain(&self) -> Option<&str> {
                self.domain.as_deref()
            }

            /// Account part without the domain.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Lower-cased `domain\name` used for comparisons.
            #[must_use]
            pub fn key(&self) -> &str {
                &self.key
            }

            /// Returns `true` if the account lives on `machine`.
            ///
            /// A name without a domain is always local.
            #[must_use]
            pub fn is_local(&self, machine: &str) -> bool {
                self.domain
                    .as_deref()
                    .map_or(true, |d| d.eq_ignore_ascii_case(machine))
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key.hash(state);
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.domain {
                    Some(d) => write!(f, "{}\\{}", d, self.name),
                    None => f.write_str(&self.name),
                }
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = NameError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.to_string()
            }
        }
    };
}

qualified_name! {
    /// A user account, `DOMAIN\user` or a bare local user name.
    ///
    /// # Example
    ///
    /// ```
    /// use elevate_types::UserName;
    ///
    /// let a: UserName = "HOST\\Alice".parse().unwrap();
    /// let b: UserName = "host\\alice".parse().unwrap();
    /// assert_eq!(a, b);
    /// assert_eq!(a.to_string(), "HOST\\Alice");
    /// assert!(a.is_local("host"));
    /// ```
    UserName
}

qualified_name! {
    /// A group account, `DOMAIN\group` or a bare local group name.
    GroupName
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_with_domain() {
        let u = UserName::parse("CORP\\bob").unwrap();
        assert_eq!(u.domain(), Some("CORP"));
        assert_eq!(u.name(), "bob");
        assert_eq!(u.key(), "corp\\bob");
    }

    #[test]
    fn parse_bare_name_is_local_everywhere() {
        let g = GroupName::parse("Administrators").unwrap();
        assert_eq!(g.domain(), None);
        assert!(g.is_local("anything"));
    }

    #[test]
    fn case_insensitive_eq_and_hash() {
        let mut set = HashSet::new();
        set.insert(UserName::parse("HOST\\Alice").unwrap());
        assert!(set.contains(&UserName::parse("host\\ALICE").unwrap()));
    }

    #[test]
    fn domain_group_is_not_local() {
        let g = GroupName::parse("CORP\\Admins").unwrap();
        assert!(!g.is_local("HOST"));
        assert!(g.is_local("corp"));
    }

    #[test]
    fn rejects_bad_names() {
        assert!(matches!(UserName::parse(""), Err(NameError::Empty(_))));
        assert!(matches!(UserName::parse("HOST\\"), Err(NameError::Empty(_))));
        assert!(matches!(UserName::parse("\\bob"), Err(NameError::Empty(_))));
        assert!(matches!(
            UserName::parse("a\\b\\c"),
            Err(NameError::TooManySeparators(_))
        ));
    }

    #[test]
    fn serde_as_string() {
        let u = UserName::parse("HOST\\alice").unwrap();
        let json = serde_json::to_string(&u).unwrap();
        assert_eq!(json, r#""HOST\\alice""#);
        let back: UserName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, u);
        assert!(serde_json::from_str::<UserName>(r#""""#).is_err());
    }
}
