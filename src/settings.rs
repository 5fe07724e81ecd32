//! Application settings.
//!
//! One [`Settings`] value is built at startup, wrapped in an `Arc` and handed
//! to the [`App`](crate::App); every request and response of that app sees the
//! same snapshot. Nothing is looked up globally.
//!
//! # Examples
//!
//! ```
//! use maestro_web::Settings;
//! use std::time::Duration;
//!
//! let settings = Settings {
//!     jsonp_callback_name: "cb".to_string(),
//!     cookie_expire: Some(Duration::from_secs(3600)),
//!     ..Settings::default()
//! };
//! assert_eq!(settings.view_engine, "html");
//! ```
//!
//! From TOML:
//! ```
//! use maestro_web::Settings;
//!
//! let settings = Settings::from_toml_str(r#"
//!     jsonp_callback_name = "handleData"
//!     cookie_expire = 600
//!     powered_by = false
//! "#).unwrap();
//!
//! assert_eq!(settings.jsonp_callback_name, "handleData");
//! assert!(!settings.powered_by);
//! ```

use crate::errors::SettingsError;
use serde::{Deserialize, Deserializer};
use std::{fs, path::Path, time::Duration};

/// Recognized application options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the template renderer used by [`send`](crate::Response::send)
    /// for textual bodies (default: `"html"`).
    pub view_engine: String,

    /// Namespace prefix for controller lookups (default: `"\\"`).
    pub controller_namespace: String,

    /// Lifetime of cookies that set no `max_age` of their own, in seconds
    /// (default: none, i.e. session cookies).
    #[serde(deserialize_with = "seconds")]
    pub cookie_expire: Option<Duration>,

    /// Function name JSONP bodies are wrapped in (default: `"callback"`).
    pub jsonp_callback_name: String,

    /// Whether responses advertise the framework in `X-Powered-By`
    /// (default: `true`). When disabled the header is still sent, carrying
    /// [`POWERED_BY_DISABLED`](crate::response::POWERED_BY_DISABLED).
    pub powered_by: bool,

    /// Deployment environment label (default: `"development"`).
    pub env: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            view_engine: "html".to_string(),
            controller_namespace: "\\".to_string(),
            cookie_expire: None,
            jsonp_callback_name: "callback".to_string(),
            powered_by: true,
            env: "development".to_string(),
        }
    }
}

impl Settings {
    /// Parses settings from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(src)?)
    }

    /// Reads and parses a TOML settings file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_missing_keys() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn full_document() {
        let settings = Settings::from_toml_str(
            r#"
            view_engine = "tera"
            controller_namespace = "app::controllers"
            cookie_expire = 86400
            jsonp_callback_name = "cb"
            powered_by = false
            env = "production"
            "#,
        )
        .unwrap();

        assert_eq!(settings.view_engine, "tera");
        assert_eq!(settings.controller_namespace, "app::controllers");
        assert_eq!(settings.cookie_expire, Some(Duration::from_secs(86400)));
        assert_eq!(settings.jsonp_callback_name, "cb");
        assert!(!settings.powered_by);
        assert_eq!(settings.env, "production");
    }

    #[test]
    fn parse_error() {
        assert!(matches!(
            Settings::from_toml_str("powered_by = \"yes\""),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Settings::load("/definitely/not/here.toml"),
            Err(SettingsError::Io(_))
        ));
    }
}
