use crate::{
    errors::{ExtensionError, RequestError},
    http::cookie::CookieSigner,
    query::{Params, Query},
    Method,
};
use memchr::{memchr, memchr_iter};
use std::{
    any::Any,
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
};
use url::Url;

/// Upper bound on decoded query and form parameters per request.
const PARAMS_LIMIT: usize = 256;

/// Everything the host transport knows about one inbound request.
///
/// This is the only input of [`Request::new`]; nothing is read from the
/// process environment.
///
/// # Examples
/// ```
/// use maestro_web::request::TransportInput;
///
/// let input = TransportInput::new("POST", "http://localhost/users?page=2")
///     .header("Content-Type", "application/x-www-form-urlencoded")
///     .header("X-Forwarded-For", "203.0.113.7, 10.0.0.2")
///     .cookie("sid", "abc")
///     .body(b"name=ada".to_vec());
///
/// assert_eq!(input.method, "POST");
/// ```
#[derive(Debug, Clone)]
pub struct TransportInput {
    /// Request method token as received (`"GET"`).
    pub method: String,
    /// Absolute URL: `scheme://host[:port]/path[?query]`.
    pub url: String,
    /// Raw header pairs; names are normalized to lower case by [`Request::new`].
    pub headers: Vec<(String, String)>,
    /// Raw cookie pairs.
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Overrides the `content-type` header when set.
    pub content_type: Option<String>,
    pub remote_addr: IpAddr,
}

impl TransportInput {
    pub fn new<M: Into<String>, U: Into<String>>(method: M, url: U) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            content_type: None,
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = addr;
        self
    }
}

/// Decoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// GET and HEAD requests, or no payload at all.
    Empty,
    /// `application/x-www-form-urlencoded` payload.
    Form(Params),
    /// `application/json` payload of a PUT or DELETE request.
    Json(serde_json::Value),
    /// Any other payload, untouched.
    Raw(Vec<u8>),
}

/// Snapshot of one inbound HTTP request.
///
/// Built once per dispatch cycle by [`Request::new`]. Method, URL parts and
/// headers never change afterwards; route parameters are merged into
/// [`params`](Request::params) by the dispatcher, and handlers may stash typed
/// values in [`extensions`](Request::extensions_mut).
///
/// # Body decoding
///
/// | Method          | Body                                                   |
/// |-----------------|--------------------------------------------------------|
/// | `GET`, `HEAD`   | [`Body::Empty`]                                        |
/// | `POST`          | [`Body::Form`]                                         |
/// | `PUT`, `DELETE` | by content type: JSON, form, otherwise [`Body::Raw`]   |
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    uri: String,
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,

    headers: Params,
    content_type: Option<String>,
    params: Params,
    body: Body,

    cookies: Params,
    signed_cookies: Params,

    ip: IpAddr,
    ips: Vec<String>,

    extensions: Extensions,
}

impl Request {
    /// Builds the request snapshot from transport data.
    ///
    /// Signed cookies are the raw cookies `signer` accepts; without a signer
    /// the set is empty.
    pub fn new(
        input: TransportInput,
        signer: Option<&dyn CookieSigner>,
    ) -> Result<Self, RequestError> {
        let method = input
            .method
            .parse::<Method>()
            .map_err(|_| RequestError::UnsupportedMethod(input.method.clone()))?;

        let url = Url::parse(&input.url)?;
        let path = url.path().to_string();
        let query = url.query().map(str::to_string);
        let uri = match &query {
            Some(query) => format!("{path}?{query}"),
            None => path.clone(),
        };

        let headers: Params = input
            .headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        let content_type = input
            .content_type
            .or_else(|| headers.get("content-type").map(str::to_string));

        let params: Params = match &query {
            Some(query) => Query::parse(query.as_bytes(), PARAMS_LIMIT)?,
            None => Params::new(),
        };
        let body = Self::decode_body(method, content_type.as_deref(), input.body)?;

        let cookies: Params = input.cookies.into_iter().collect();
        let signed_cookies = match signer {
            Some(signer) => cookies
                .iter()
                .filter_map(|(name, value)| Some((name, signer.unsign(value)?)))
                .collect(),
            None => Params::new(),
        };

        let ips = match headers.get("x-forwarded-for") {
            Some(chain) => split_forwarded(chain),
            None => vec![input.remote_addr.to_string()],
        };

        Ok(Request {
            method,
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            url: input.url,
            uri,
            path,
            query,

            headers,
            content_type,
            params,
            body,

            cookies,
            signed_cookies,

            ip: input.remote_addr,
            ips,

            extensions: Extensions::default(),
        })
    }

    fn decode_body(
        method: Method,
        content_type: Option<&str>,
        raw: Vec<u8>,
    ) -> Result<Body, RequestError> {
        if raw.is_empty() {
            return Ok(Body::Empty);
        }

        let essence = content_type.map(mime_essence);
        let body = match (method, essence.as_deref()) {
            (Method::Get | Method::Head, _) => Body::Empty,
            (Method::Post, _) => Body::Form(Query::parse(&raw, PARAMS_LIMIT)?),
            (_, Some("application/json")) => Body::Json(serde_json::from_slice(&raw)?),
            (_, Some("application/x-www-form-urlencoded")) => {
                Body::Form(Query::parse(&raw, PARAMS_LIMIT)?)
            }
            _ => Body::Raw(raw),
        };

        Ok(body)
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Full URL as supplied by the transport.
    #[inline(always)]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path plus query (`/users/42?tab=posts`).
    #[inline(always)]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline(always)]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[inline(always)]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query component without the leading `?`.
    #[inline(always)]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Looks up a header by name, case-insensitively.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        match name.bytes().any(|b| b.is_ascii_uppercase()) {
            true => self.headers.get(&name.to_ascii_lowercase()),
            false => self.headers.get(name),
        }
    }

    /// All headers, names in lower case, in arrival order.
    #[inline(always)]
    pub fn headers(&self) -> &Params {
        &self.headers
    }

    /// Declared content type (not sniffed).
    #[inline(always)]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Checks the declared content type, ignoring parameters such as `charset`.
    ///
    /// # Examples
    /// ```
    /// use maestro_web::{request::TransportInput, Request};
    ///
    /// let input = TransportInput::new("PUT", "http://localhost/doc")
    ///     .header("Content-Type", "application/json; charset=utf-8")
    ///     .body(b"{}".to_vec());
    /// let req = Request::new(input, None).unwrap();
    ///
    /// assert!(req.is("application/json"));
    /// assert!(!req.is("text/html"));
    /// ```
    pub fn is(&self, content_type: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| mime_essence(ct).eq_ignore_ascii_case(content_type))
    }

    /// Query parameters, overlaid with route parameters after dispatch.
    #[inline(always)]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Merges route parameters over the query parameters; route values win.
    #[inline]
    pub fn set_params(&mut self, route_params: Params) {
        self.params.merge(route_params);
    }

    /// Looks a parameter up in the route/query params, then in the body.
    pub fn param(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.params.get(name) {
            return Some(value);
        }

        match &self.body {
            Body::Form(form) => form.get(name),
            Body::Json(serde_json::Value::Object(map)) => map.get(name)?.as_str(),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn body(&self) -> &Body {
        &self.body
    }

    #[inline(always)]
    pub fn cookies(&self) -> &Params {
        &self.cookies
    }

    /// Cookies whose signature the configured signer accepted, with the
    /// signature stripped.
    #[inline(always)]
    pub fn signed_cookies(&self) -> &Params {
        &self.signed_cookies
    }

    #[inline]
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent")
    }

    /// `true` for requests issued by `XMLHttpRequest` and friends.
    #[inline]
    pub fn xhr(&self) -> bool {
        self.headers
            .get("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// `true` when the `X-PJAX` header is present and non-empty.
    #[inline]
    pub fn pjax(&self) -> bool {
        self.headers.get("x-pjax").is_some_and(|v| !v.is_empty())
    }

    /// `true` when the request arrived over HTTPS.
    #[inline]
    pub fn secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Address of the transport peer.
    #[inline(always)]
    pub const fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Proxy chain from `X-Forwarded-For`, client first; just the peer
    /// address when the header is absent.
    #[inline(always)]
    pub fn ips(&self) -> &[String] {
        &self.ips
    }

    #[inline(always)]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[inline(always)]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// `text/html; charset=utf-8` -> `text/html`
fn mime_essence(content_type: &str) -> String {
    let end = memchr(b';', content_type.as_bytes()).unwrap_or(content_type.len());
    content_type[..end].trim().to_ascii_lowercase()
}

fn split_forwarded(chain: &str) -> Vec<String> {
    let bytes = chain.as_bytes();
    let mut start = 0;
    let mut ips = Vec::new();

    for comma in memchr_iter(b',', bytes).chain(std::iter::once(bytes.len())) {
        let ip = chain[start..comma].trim();
        if !ip.is_empty() {
            ips.push(ip.to_string());
        }
        start = comma + 1;
    }

    ips
}

// EXTENSIONS

/// Typed per-request storage for values shared between handlers.
///
/// Lookups name both the key and the expected type, so a typo or a type
/// confusion is an error instead of a silent `None`.
///
/// # Examples
/// ```
/// use maestro_web::{request::Extensions, errors::ExtensionError};
///
/// let mut ext = Extensions::default();
/// ext.insert("user_id", 42u64);
///
/// assert_eq!(ext.get::<u64>("user_id"), Ok(&42));
/// assert_eq!(
///     ext.get::<String>("user_id"),
///     Err(ExtensionError::TypeMismatch("user_id".into()))
/// );
/// assert_eq!(
///     ext.get::<u64>("userid"),
///     Err(ExtensionError::Missing("userid".into()))
/// );
/// ```
#[derive(Default)]
pub struct Extensions {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<K: Into<String>, T: Any + Send + Sync>(&mut self, key: K, value: T) {
        self.map.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Result<&T, ExtensionError> {
        let value = self
            .map
            .get(key)
            .ok_or_else(|| ExtensionError::Missing(key.to_string()))?;

        (**value)
            .downcast_ref::<T>()
            .ok_or_else(|| ExtensionError::TypeMismatch(key.to_string()))
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Result<&mut T, ExtensionError> {
        let value = self
            .map
            .get_mut(key)
            .ok_or_else(|| ExtensionError::Missing(key.to_string()))?;

        (**value)
            .downcast_mut::<T>()
            .ok_or_else(|| ExtensionError::TypeMismatch(key.to_string()))
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns `true` if a value was removed.
    #[inline]
    pub fn remove(&mut self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}
