//! Cookie queueing and `Set-Cookie` serialization.
//!
//! Signing is an external capability: the framework never looks inside a
//! signature, it only asks a [`CookieSigner`] to produce or verify one.

use std::time::Duration;

/// Signs outgoing cookie values and verifies incoming ones.
///
/// # Examples
/// ```
/// use maestro_web::CookieSigner;
///
/// struct Prefix;
///
/// impl CookieSigner for Prefix {
///     fn sign(&self, value: &str) -> String {
///         format!("s:{value}.sig")
///     }
///
///     fn unsign(&self, value: &str) -> Option<String> {
///         value.strip_prefix("s:")?.strip_suffix(".sig").map(str::to_string)
///     }
/// }
///
/// assert_eq!(Prefix.unsign(&Prefix.sign("bob")).as_deref(), Some("bob"));
/// ```
pub trait CookieSigner: Send + Sync + 'static {
    /// Returns the signed form of `value` as it goes on the wire.
    fn sign(&self, value: &str) -> String;

    /// Returns the original value when `value` carries a valid signature.
    fn unsign(&self, value: &str) -> Option<String>;
}

/// Attributes of a queued cookie.
///
/// # Examples
/// ```
/// use maestro_web::CookieOptions;
/// use std::time::Duration;
///
/// let options = CookieOptions {
///     signed: true,
///     max_age: Some(Duration::from_secs(60)),
///     ..CookieOptions::default()
/// };
/// assert_eq!(options.path, "/");
/// assert!(options.http_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// Replace the value with the signer's output before emission (default: `false`).
    pub signed: bool,

    /// Cookie lifetime. Falls back to
    /// [`Settings::cookie_expire`](crate::Settings::cookie_expire) when `None`.
    pub max_age: Option<Duration>,

    /// Default: `"/"`.
    pub path: String,

    pub domain: Option<String>,

    /// Default: `true`.
    pub http_only: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            signed: false,
            max_age: None,
            path: "/".to_string(),
            domain: None,
            http_only: true,
        }
    }
}

/// A cookie waiting for emission. `value == None` encodes deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cookie {
    pub(crate) name: String,
    pub(crate) value: Option<String>,
    pub(crate) options: CookieOptions,
}

const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

impl Cookie {
    /// Appends the `Set-Cookie` value (without the header name).
    ///
    /// `value` is the wire value: already signed when the cookie is signed.
    pub(crate) fn write_to(
        &self,
        value: Option<&str>,
        default_max_age: Option<Duration>,
        secure: bool,
        buffer: &mut Vec<u8>,
    ) {
        buffer.extend_from_slice(self.name.as_bytes());
        buffer.push(b'=');

        match value {
            Some(value) => {
                buffer.extend_from_slice(value.as_bytes());

                if let Some(max_age) = self.options.max_age.or(default_max_age) {
                    buffer.extend_from_slice(b"; Max-Age=");
                    buffer.extend_from_slice(max_age.as_secs().to_string().as_bytes());
                }
            }
            None => {
                buffer.extend_from_slice(b"; Max-Age=0; Expires=");
                buffer.extend_from_slice(EPOCH.as_bytes());
            }
        }

        buffer.extend_from_slice(b"; Path=");
        buffer.extend_from_slice(self.options.path.as_bytes());

        if let Some(domain) = &self.options.domain {
            buffer.extend_from_slice(b"; Domain=");
            buffer.extend_from_slice(domain.as_bytes());
        }
        if secure {
            buffer.extend_from_slice(b"; Secure");
        }
        if self.options.http_only {
            buffer.extend_from_slice(b"; HttpOnly");
        }
    }
}
