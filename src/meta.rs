//! Application metadata: the header's type/version fields, the DISPLAY_NAME
//! map, and the JSON description consumed by `wapp create`.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Key every metadata file must carry in its `display_name` object.
pub const DISPLAY_NAME_KEY: &str = "display_name";

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Invalid version '{0}': expected x.y.z with components 0-255")]
    InvalidVersion(String),
    #[error("Unknown application type '{0}'")]
    UnknownAppType(String),
    #[error("Metadata is missing display_name.display_name")]
    MissingDisplayName,
    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ── AppType ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppType {
    Watchface,
    Application,
    Other(u8),
}

impl AppType {
    pub fn code(self) -> u8 {
        match self {
            AppType::Watchface   => 1,
            AppType::Application => 2,
            AppType::Other(c)    => c,
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "face" | "watchface"  => Some(AppType::Watchface),
            "app" | "application" => Some(AppType::Application),
            _                     => None,
        }
    }
}

impl From<u8> for AppType {
    fn from(code: u8) -> Self {
        match code {
            1 => AppType::Watchface,
            2 => AppType::Application,
            c => AppType::Other(c),
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppType::Watchface => "watchface",
            _                  => "application",
        };
        write!(f, "{name} ({})", self.code())
    }
}

impl Serialize for AppType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

// ── AppVersion ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppVersion(pub [u8; 3]);

impl FromStr for AppVersion {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || MetaError::InvalidVersion(s.to_owned());
        let mut parts = [0u8; 3];
        let mut fields = s.split('.');
        for part in parts.iter_mut() {
            let field = fields.next().ok_or_else(bad)?;
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            *part = field.parse().map_err(|_| bad())?;
        }
        if fields.next().is_some() {
            return Err(bad());
        }
        Ok(AppVersion(parts))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── WappMeta ─────────────────────────────────────────────────────────────────

/// Derived view over a finalized container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WappMeta {
    pub file_version: u16,
    pub content_size: u32,
    pub app_type:     AppType,
    pub app_version:  AppVersion,
    pub crc32:        u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub display_name: BTreeMap<String, String>,
}

// ── AppMeta (JSON input) ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAppType {
    Code(u8),
    Name(String),
}

#[derive(Deserialize)]
struct RawAppMeta {
    version: String,
    #[serde(rename = "type")]
    app_type: RawAppType,
    display_name: BTreeMap<String, String>,
}

/// Application description used to build a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMeta {
    pub app_type:     AppType,
    pub version:      AppVersion,
    pub display_name: BTreeMap<String, String>,
}

impl AppMeta {
    pub fn from_json(json: &str) -> Result<Self, MetaError> {
        let raw: RawAppMeta = serde_json::from_str(json)?;

        let app_type = match raw.app_type {
            RawAppType::Code(c)    => AppType::from(c),
            RawAppType::Name(name) => AppType::from_name(&name)
                .ok_or(MetaError::UnknownAppType(name))?,
        };
        if !raw.display_name.contains_key(DISPLAY_NAME_KEY) {
            return Err(MetaError::MissingDisplayName);
        }

        Ok(Self {
            app_type,
            version: raw.version.parse()?,
            display_name: raw.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse_and_display() {
        let v: AppVersion = "1.20.255".parse().unwrap();
        assert_eq!(v, AppVersion([1, 20, 255]));
        assert_eq!(v.to_string(), "1.20.255");
    }

    #[test]
    fn version_rejects_bad_forms() {
        for s in ["1.2", "1.2.3.4", "1..3", "1.2.256", "a.b.c", "+1.2.3", ""] {
            assert!(s.parse::<AppVersion>().is_err(), "{s}");
        }
    }

    #[test]
    fn app_type_codes() {
        assert_eq!(AppType::from(1), AppType::Watchface);
        assert_eq!(AppType::from(2), AppType::Application);
        assert_eq!(AppType::from(7), AppType::Other(7));
        assert_eq!(AppType::Other(7).code(), 7);
        assert_eq!(AppType::Watchface.to_string(), "watchface (1)");
        assert_eq!(AppType::Other(9).to_string(), "application (9)");
    }

    #[test]
    fn json_with_type_name() {
        let meta = AppMeta::from_json(
            r#"{"version": "1.0.2", "type": "face",
                "display_name": {"display_name": "Clock", "theme_class": "dark"}}"#,
        )
        .unwrap();
        assert_eq!(meta.app_type, AppType::Watchface);
        assert_eq!(meta.version, AppVersion([1, 0, 2]));
        assert_eq!(meta.display_name["theme_class"], "dark");
    }

    #[test]
    fn json_with_numeric_type() {
        let meta = AppMeta::from_json(
            r#"{"version": "0.0.1", "type": 5, "display_name": {"display_name": "X"}}"#,
        )
        .unwrap();
        assert_eq!(meta.app_type, AppType::Other(5));
    }

    #[test]
    fn json_errors() {
        let missing = AppMeta::from_json(
            r#"{"version": "1.0.0", "type": "app", "display_name": {"other": "x"}}"#,
        );
        assert!(matches!(missing, Err(MetaError::MissingDisplayName)));

        let unknown = AppMeta::from_json(
            r#"{"version": "1.0.0", "type": "widget", "display_name": {"display_name": "x"}}"#,
        );
        assert!(matches!(unknown, Err(MetaError::UnknownAppType(t)) if t == "widget"));

        let version = AppMeta::from_json(
            r#"{"version": "1.0", "type": "app", "display_name": {"display_name": "x"}}"#,
        );
        assert!(matches!(version, Err(MetaError::InvalidVersion(_))));

        assert!(matches!(AppMeta::from_json("{"), Err(MetaError::Json(_))));
    }

    #[test]
    fn meta_serializes_flat() {
        let meta = WappMeta {
            file_version: 3,
            content_size: 80,
            app_type: AppType::Application,
            app_version: AppVersion([1, 2, 3]),
            crc32: 0xDEAD_BEEF,
            display_name: BTreeMap::new(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["app_type"], 2);
        assert_eq!(json["app_version"], "1.2.3");
        assert!(json.get("display_name").is_none());
    }
}
