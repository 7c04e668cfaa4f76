//! Three-valued boolean for inheritable policy flags.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A boolean attribute that may be left unspecified.
///
/// `Unset` is distinct from `False`: an unset flag defers to the next
/// level of the attribute chain, an explicit `False` stops the walk.
///
/// Serialized as a plain JSON/TOML boolean. Fields of this type should
/// be `#[serde(default, skip_serializing_if = "TriState::is_unset")]`
/// so that absence round-trips as `Unset`.
///
/// # Example
///
/// ```
/// use elevate_types::TriState;
///
/// assert_eq!(TriState::Unset.or(TriState::False), TriState::False);
/// assert_eq!(TriState::True.or(TriState::False), TriState::True);
/// assert!(TriState::Unset.unwrap_or(true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns `self` if set, otherwise `fallback`.
    #[must_use]
    pub fn or(self, fallback: TriState) -> TriState {
        match self {
            Self::Unset => fallback,
            set => set,
        }
    }

    /// Collapses to a `bool`, using `default` for `Unset`.
    #[must_use]
    pub fn unwrap_or(self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::True => Some(true),
            Self::False => Some(false),
        }
    }
}

impl From<bool> for TriState {
    fn from(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(b: Option<bool>) -> Self {
        b.map_or(Self::Unset, Self::from)
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Flags {
        #[serde(default, skip_serializing_if = "TriState::is_unset")]
        enabled: TriState,
    }

    #[test]
    fn absent_field_is_unset() {
        let f: Flags = serde_json::from_str("{}").unwrap();
        assert_eq!(f.enabled, TriState::Unset);
        assert_eq!(serde_json::to_string(&f).unwrap(), "{}");
    }

    #[test]
    fn explicit_false_is_preserved() {
        let f: Flags = serde_json::from_str(r#"{"enabled":false}"#).unwrap();
        assert_eq!(f.enabled, TriState::False);
        assert_eq!(serde_json::to_string(&f).unwrap(), r#"{"enabled":false}"#);
    }

    #[test]
    fn fallback_chain() {
        let chain = [TriState::Unset, TriState::Unset, TriState::True];
        let resolved = chain.iter().fold(TriState::Unset, |acc, t| acc.or(*t));
        assert_eq!(resolved, TriState::True);
        assert!(!TriState::False.unwrap_or(true));
    }
}
