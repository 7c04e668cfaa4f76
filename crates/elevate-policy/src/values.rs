//! Validated attribute values.
//!
//! Each type here deserializes from a string and rejects malformed input
//! at parse time, so an invalid regex or time string fails the whole
//! document load instead of surfacing during an authorization check.

use chrono::{NaiveTime, Timelike};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ── TimeOfDay ─────────────────────────────────────────────────────────

/// Wall-clock time without a date, `HH:MM[:SS[.fff]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(NaiveTime::MIN);

    /// Creates a time from hour/minute/second.
    #[must_use]
    pub fn from_hms(hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, min, sec).map(Self)
    }

    #[must_use]
    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    /// Parses `HH:MM:SS`, `HH:MM:SS.fffff` or `HH:MM`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(Self)
            .map_err(|e| format!("invalid time of day '{s}': {e}"))
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        Self(t)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.nanosecond() == 0 {
            write!(f, "{}", self.0.format("%H:%M:%S"))
        } else {
            write!(f, "{}", self.0.format("%H:%M:%S%.f"))
        }
    }
}

/// Active window `[start, end)`.
///
/// A window whose start is after its end wraps past midnight
/// (`22:00`–`06:00` admits `23:30` and `05:00`). A missing end leaves
/// the window open until midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: Option<TimeOfDay>,
}

impl TimeWindow {
    #[must_use]
    pub fn contains(&self, now: NaiveTime) -> bool {
        let start = self.start.as_naive();
        match self.end.map(|e| e.as_naive()) {
            None => now >= start,
            Some(end) if start <= end => now >= start && now < end,
            Some(end) => now >= start || now < end,
        }
    }
}

// ── Md5Checksum ───────────────────────────────────────────────────────

/// Lower-case hex MD5 digest pinned on a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Md5Checksum(String);

impl Md5Checksum {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{s}' is not a 32-digit hex MD5 checksum"));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a computed digest.
    #[must_use]
    pub fn matches(&self, computed: &str) -> bool {
        self.0.eq_ignore_ascii_case(computed)
    }
}

impl TryFrom<String> for Md5Checksum {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Md5Checksum> for String {
    fn from(c: Md5Checksum) -> String {
        c.0
    }
}

impl fmt::Display for Md5Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ArgumentSpec ──────────────────────────────────────────────────────

/// How a command's live arguments are matched.
///
/// A value delimited by slashes (`/^--force$/`) is a regex that must
/// find a match somewhere in the arguments; anchors are up to the
/// author. Anything else must equal the arguments exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArgumentSpec {
    Literal(String),
    Pattern { source: String, regex: Regex },
}

impl ArgumentSpec {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.strip_prefix('/').and_then(|r| r.strip_suffix('/')) {
            Some(pattern) if s.len() >= 2 => {
                let regex = Regex::new(pattern)
                    .map_err(|e| format!("invalid argument pattern '{s}': {e}"))?;
                Ok(Self::Pattern {
                    source: s.to_string(),
                    regex,
                })
            }
            _ => Ok(Self::Literal(s.to_string())),
        }
    }

    #[must_use]
    pub fn matches(&self, arguments: &str) -> bool {
        match self {
            Self::Literal(expected) => expected == arguments,
            Self::Pattern { regex, .. } => regex.is_match(arguments),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Pattern { source, .. } => source,
        }
    }
}

impl TryFrom<String> for ArgumentSpec {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ArgumentSpec> for String {
    fn from(a: ArgumentSpec) -> String {
        a.as_str().to_string()
    }
}

// ── AllowedNetworks ───────────────────────────────────────────────────

/// One entry of an allowed-networks list.
#[derive(Debug, Clone)]
pub enum NetworkRule {
    /// `*`, `127.0.0.1` or `localhost`: always satisfied.
    Any,
    /// Case-insensitive, whitespace-insensitive regex tested against the
    /// host name and each bound address.
    Pattern(Regex),
}

/// Comma-separated network restriction on a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AllowedNetworks {
    source: String,
    rules: Vec<NetworkRule>,
}

impl AllowedNetworks {
    pub fn parse(s: &str) -> Result<Self, String> {
        let rules = s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let lower = entry.to_ascii_lowercase();
                if matches!(lower.as_str(), "*" | "127.0.0.1" | "localhost") {
                    return Ok(NetworkRule::Any);
                }
                RegexBuilder::new(entry)
                    .case_insensitive(true)
                    .ignore_whitespace(true)
                    .build()
                    .map(NetworkRule::Pattern)
                    .map_err(|e| format!("invalid network pattern '{entry}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: s.to_string(),
            rules,
        })
    }

    /// Returns `true` if there are no rules (no restriction applies).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn rules(&self) -> &[NetworkRule] {
        &self.rules
    }

    /// Returns `true` if the host identified by `hostname` and
    /// `addresses` satisfies at least one rule.
    #[must_use]
    pub fn admits(&self, hostname: &str, addresses: &[String]) -> bool {
        self.rules.iter().any(|rule| match rule {
            NetworkRule::Any => true,
            NetworkRule::Pattern(re) => {
                re.is_match(hostname) || addresses.iter().any(|ip| re.is_match(ip))
            }
        })
    }
}

impl TryFrom<String> for AllowedNetworks {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AllowedNetworks> for String {
    fn from(n: AllowedNetworks) -> String {
        n.source
    }
}

// ── serde helpers ─────────────────────────────────────────────────────

/// Deserializes an optional string-backed value, treating `""` as absent.
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<String>,
    T::Error: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => T::try_from(s).map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn time_of_day_formats() {
        assert_eq!(TimeOfDay::parse("09:00:00").unwrap().as_naive(), t(9, 0, 0));
        assert_eq!(TimeOfDay::parse("09:30").unwrap().as_naive(), t(9, 30, 0));
        let late = TimeOfDay::parse("23:59:59.99999").unwrap();
        assert!(late.as_naive() > t(23, 59, 59));
        assert!(TimeOfDay::parse("25:00:00").is_err());
        assert!(TimeOfDay::parse("noon").is_err());
        assert_eq!(TimeOfDay::parse("17:00:00").unwrap().to_string(), "17:00:00");
    }

    #[test]
    fn window_start_inclusive_end_exclusive() {
        let w = TimeWindow {
            start: TimeOfDay::from_hms(9, 0, 0).unwrap(),
            end: TimeOfDay::from_hms(17, 0, 0),
        };
        assert!(w.contains(t(9, 0, 0)));
        assert!(w.contains(t(12, 0, 0)));
        assert!(!w.contains(t(17, 0, 0)));
        assert!(!w.contains(t(20, 0, 0)));
        assert!(!w.contains(t(8, 59, 59)));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = TimeWindow {
            start: TimeOfDay::from_hms(22, 0, 0).unwrap(),
            end: TimeOfDay::from_hms(6, 0, 0),
        };
        assert!(w.contains(t(23, 30, 0)));
        assert!(w.contains(t(5, 0, 0)));
        assert!(!w.contains(t(12, 0, 0)));
    }

    #[test]
    fn window_without_end_runs_to_midnight() {
        let w = TimeWindow {
            start: TimeOfDay::MIDNIGHT,
            end: None,
        };
        assert!(w.contains(t(0, 0, 0)));
        assert!(w.contains(t(23, 59, 59)));
    }

    #[test]
    fn checksum_is_normalized() {
        let c = Md5Checksum::parse("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(c.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
        assert!(c.matches("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(Md5Checksum::parse("abc123").is_err());
        assert!(Md5Checksum::parse("zz1d8cd98f00b204e9800998ecf8427e").is_err());
    }

    #[test]
    fn argument_regex_is_unanchored_search() {
        let exact = ArgumentSpec::parse("/^--force$/").unwrap();
        assert!(exact.matches("--force"));
        assert!(!exact.matches("--force extra"));

        let loose = ArgumentSpec::parse("/--force/").unwrap();
        assert!(loose.matches("-v --force extra"));
    }

    #[test]
    fn argument_literal_requires_equality() {
        let lit = ArgumentSpec::parse("--force").unwrap();
        assert!(lit.matches("--force"));
        assert!(!lit.matches("--force "));
        assert!(matches!(ArgumentSpec::parse("/").unwrap(), ArgumentSpec::Literal(_)));
        assert!(ArgumentSpec::parse("/([/").is_err());
    }

    #[test]
    fn networks_wildcards_and_patterns() {
        let nets = AllowedNetworks::parse("LOCALHOST").unwrap();
        assert!(nets.admits("anything", &[]));

        let nets = AllowedNetworks::parse(r"^build\d+\.corp$, ^10\.1\.").unwrap();
        assert_eq!(nets.rules().len(), 2);
        assert!(nets.admits("BUILD7.corp", &[]));
        assert!(nets.admits("laptop", &["10.1.4.2".to_string()]));
        assert!(!nets.admits("laptop", &["192.168.0.2".to_string()]));

        assert!(AllowedNetworks::parse("").unwrap().is_empty());
        assert!(AllowedNetworks::parse("([").is_err());
    }
}
