//! Modification time and hash resolution
//!
//! The disk keeps its own `modified` timestamp (upload time), while this
//! adapter stores the source mtime in a custom property. The property wins
//! whenever it holds a parseable timestamp.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use super::yandex_api::ResourceInfo;

/// Custom property holding the client-side modification time
pub const DEFAULT_MODTIME_PROPERTY: &str = "rclone_modified";

/// Where a resolved modification time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModTimeSource {
    Override(DateTime<Utc>),
    Native(DateTime<Utc>),
    Unresolved,
}

impl ModTimeSource {
    pub fn time(self) -> Option<DateTime<Utc>> {
        match self {
            ModTimeSource::Override(t) | ModTimeSource::Native(t) => Some(t),
            ModTimeSource::Unresolved => None,
        }
    }
}

/// Parse an RFC 3339 timestamp with optional fractional seconds
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Format a timestamp for the override property (nanosecond precision)
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Merge the native timestamp and the override property.
///
/// | override          | native    | result     |
/// |-------------------|-----------|------------|
/// | valid string      | any       | Override   |
/// | absent/malformed  | valid     | Native     |
/// | absent/malformed  | malformed | Unresolved |
pub fn resolve_mod_time(native: &str, override_value: Option<&serde_json::Value>) -> ModTimeSource {
    if let Some(value) = override_value {
        match value.as_str().and_then(parse_time) {
            Some(t) => return ModTimeSource::Override(t),
            None => debug!("Ignoring malformed modification time property {}", value),
        }
    }
    match parse_time(native) {
        Some(t) => ModTimeSource::Native(t),
        None => {
            debug!("Unparseable native modification time {:?}", native);
            ModTimeSource::Unresolved
        }
    }
}

/// Content hash of a resource; empty when the store has not computed one
pub fn select_hash(info: &ResourceInfo) -> String {
    info.md5.clone().unwrap_or_default()
}

/// Cached fields of an object, derived from one listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub md5: String,
    pub mod_time: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn from_info(info: &ResourceInfo, property: &str) -> Self {
        Self {
            size: info.size,
            md5: select_hash(info),
            mod_time: resolve_mod_time(&info.modified, info.custom_properties.get(property)).time(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const NATIVE: &str = "2020-05-01T10:00:00+00:00";

    #[test]
    fn test_override_wins_even_when_older() {
        let old = json!("2001-01-01T00:00:00.123456789Z");
        let got = resolve_mod_time(NATIVE, Some(&old));
        let expected = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(got, ModTimeSource::Override(expected));
    }

    #[test]
    fn test_override_wins_when_newer() {
        let newer = json!("2030-01-01T00:00:00Z");
        assert!(matches!(resolve_mod_time(NATIVE, Some(&newer)), ModTimeSource::Override(_)));
    }

    #[test]
    fn test_malformed_override_falls_back() {
        let native = Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap();
        for bad in [json!("yesterday"), json!(1588327200), json!(null), json!({"t": 1})] {
            assert_eq!(resolve_mod_time(NATIVE, Some(&bad)), ModTimeSource::Native(native));
        }
        assert_eq!(resolve_mod_time(NATIVE, None), ModTimeSource::Native(native));
    }

    #[test]
    fn test_both_malformed_is_unresolved() {
        assert_eq!(resolve_mod_time("", Some(&json!("nope"))), ModTimeSource::Unresolved);
        assert_eq!(resolve_mod_time("garbage", None).time(), None);
    }

    #[test]
    fn test_format_parse_keeps_nanoseconds() {
        let t = Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 59).unwrap() + chrono::Duration::nanoseconds(7);
        let s = format_time(t);
        assert_eq!(s, "2019-12-31T23:59:59.000000007Z");
        assert_eq!(parse_time(&s), Some(t));
    }

    #[test]
    fn test_object_meta_from_info() {
        let mut info = ResourceInfo {
            size: 42,
            modified: NATIVE.to_string(),
            md5: Some("abc".to_string()),
            ..ResourceInfo::default()
        };
        info.custom_properties
            .insert("mtime".to_string(), json!("2010-01-01T00:00:00Z"));

        let meta = ObjectMeta::from_info(&info, "mtime");
        assert_eq!(meta.size, 42);
        assert_eq!(meta.md5, "abc");
        assert_eq!(meta.mod_time, Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).single());

        // a different property name leaves the native time in charge
        let meta = ObjectMeta::from_info(&info, DEFAULT_MODTIME_PROPERTY);
        assert_eq!(meta.mod_time, parse_time(NATIVE));
    }

    #[test]
    fn test_select_hash_absent() {
        assert_eq!(select_hash(&ResourceInfo::default()), "");
    }
}
