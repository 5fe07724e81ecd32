//! HTTP response state machine.
//!
//! A [`Response`] is `OPEN` while handlers accumulate status, headers,
//! cookies and locals, and becomes `LOCKED` exactly once, when one of the
//! finalize entry points ([`send`](Response::send), [`json`](Response::json),
//! [`jsonp`](Response::jsonp), [`redirect`](Response::redirect),
//! [`sendfile`](Response::sendfile)) emits the wire bytes into its buffer.
//! After that every mutator and every finalize call is rejected with
//! [`ResponseError::Locked`] and the emitted bytes never change.

use crate::{
    conductor::Control,
    errors::ResponseError,
    http::{
        cookie::{Cookie, CookieOptions, CookieSigner},
        types::{write_title_case, StatusCode},
    },
    render::{Render, RenderData, Renderer},
    Settings,
};
use memchr::memchr3;
use serde_json::{Map, Value};
use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use write::WriteBuffer;

/// Value of `X-Powered-By` when advertising is switched off. The header is
/// never omitted.
pub const POWERED_BY_DISABLED: &str = "unspecified";

const POWERED_BY: &str = "maestro_web";

/// Body handed to a finalize entry point.
///
/// Structured values always render as JSON, files always stream, everything
/// else goes through the entry point's own renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No body: the canonical reason phrase of the status is sent instead.
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
    File(PathBuf),
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}
impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}
impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}
impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(value.to_vec())
    }
}
impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}
impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}
impl From<Map<String, Value>> for Payload {
    fn from(value: Map<String, Value>) -> Self {
        Payload::Json(Value::Object(value))
    }
}
impl From<PathBuf> for Payload {
    fn from(value: PathBuf) -> Self {
        Payload::File(value)
    }
}
impl From<&Path> for Payload {
    fn from(value: &Path) -> Self {
        Payload::File(value.to_path_buf())
    }
}
impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Empty, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseState {
    Open,
    Locked,
}

/// HTTP response builder for one dispatch cycle.
///
/// Header names are case-insensitive and kept in insertion order; they are
/// emitted in Title-Case. Mutators return `Result<&mut Self, _>` so calls chain
/// with `?`.
///
/// # Examples
/// ```
/// # let resp = maestro_web::run_test(|_, resp| {
/// use maestro_web::StatusCode;
/// use serde_json::json;
///
/// resp.status(StatusCode::Created)?
///     .set("x-request-id", 17)?
///     .json(json!({"id": 42}))
/// # });
/// # assert!(resp.is_locked());
/// ```
///
/// Emitted wire format:
/// ```text
/// HTTP/1.1 201 Created\r\n
/// X-Request-Id: 17\r\n
/// Content-Type: application/json\r\n
/// Content-Length: 9\r\n
/// X-Powered-By: maestro_web\r\n
/// \r\n
/// {"id":42}
/// ```
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, Vec<String>)>,
    links: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    locals: Map<String, Value>,
    renderer: Option<Renderer>,
    powered_by: bool,

    settings: Arc<Settings>,
    signer: Option<Arc<dyn CookieSigner>>,
    secure: bool,

    state: ResponseState,
    buffer: Vec<u8>,
    body_start: usize,
}

impl Response {
    /// Creates an `OPEN` response with status 200.
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Vec::new(),
            links: Vec::new(),
            cookies: Vec::new(),
            locals: Map::new(),
            renderer: None,
            powered_by: settings.powered_by,

            settings,
            signer: None,
            secure: false,

            state: ResponseState::Open,
            buffer: Vec::new(),
            body_start: 0,
        }
    }

    #[inline]
    pub(crate) fn with_signer(mut self, signer: Option<Arc<dyn CookieSigner>>) -> Self {
        self.signer = signer;
        self
    }

    /// Cookies get the `Secure` attribute when the request came over HTTPS.
    #[inline]
    pub(crate) fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[inline]
    fn ensure_open(&self, operation: &str) -> Result<(), ResponseError> {
        match self.state {
            ResponseState::Open => Ok(()),
            ResponseState::Locked => {
                tracing::warn!(operation, "rejected mutation of a sent response");
                Err(ResponseError::Locked)
            }
        }
    }

    fn header_slot(&mut self, field: &str) -> Option<&mut Vec<String>> {
        self.headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, values)| values)
    }

    fn put_header(
        &mut self,
        field: &str,
        value: String,
        overwrite: bool,
    ) -> Result<(), ResponseError> {
        check_field(field, &value)?;

        match self.header_slot(field) {
            Some(values) if overwrite => *values = vec![value],
            Some(_) => {}
            None => self.headers.push((field.to_ascii_lowercase(), vec![value])),
        }
        Ok(())
    }
}

/// Rejects CR, LF and NUL, which would end a header line early.
#[inline]
fn check_field(field: &str, value: &str) -> Result<(), ResponseError> {
    let clean = |s: &str| memchr3(b'\r', b'\n', b'\0', s.as_bytes()).is_none();

    match clean(field) && clean(value) {
        true => Ok(()),
        false => Err(ResponseError::InvalidHeader(field.to_string())),
    }
}

// Accessors
impl Response {
    #[inline(always)]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns the first value of header `field`, case-insensitively.
    ///
    /// # Examples
    /// ```
    /// # maestro_web::run_test(|_, resp| {
    /// resp.set("Content-Type", "text/plain")?;
    /// assert_eq!(resp.get("content-type"), Some("text/plain"));
    /// assert_eq!(resp.get("x-missing"), None);
    /// # resp.send(())
    /// # });
    /// ```
    pub fn get(&self, field: &str) -> Option<&str> {
        self.get_all(field).first().map(String::as_str)
    }

    /// Returns every value of header `field`.
    pub fn get_all(&self, field: &str) -> &[String] {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    /// Values merged into object-shaped bodies at render time.
    #[inline(always)]
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    /// Locals stay writable after finalize; they are no longer observable.
    #[inline(always)]
    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    /// Renderer chosen by the last finalize call.
    #[inline(always)]
    pub fn renderer(&self) -> Option<&Renderer> {
        self.renderer.as_ref()
    }

    #[inline(always)]
    pub fn is_powered_by(&self) -> bool {
        self.powered_by
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.state == ResponseState::Locked
    }

    /// Emitted bytes: status line, headers, cookies and body. Empty while `OPEN`.
    #[inline(always)]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Emitted status line and header block, including the blank line.
    #[inline(always)]
    pub fn head(&self) -> &[u8] {
        &self.buffer[..self.body_start]
    }

    /// Emitted body bytes.
    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.buffer[self.body_start..]
    }
}

// Mutators, valid only while OPEN
impl Response {
    /// Sets the status code used by the next finalize call.
    #[inline]
    pub fn status(&mut self, status: StatusCode) -> Result<&mut Self, ResponseError> {
        self.ensure_open("status")?;
        self.status = status;
        Ok(self)
    }

    /// Sets header `field`, replacing previous values.
    ///
    /// # Examples
    /// ```
    /// # maestro_web::run_test(|_, resp| {
    /// resp.set("cache-control", "no-store")?
    ///     .set("x-retry-after", 30)?
    ///     .set("x-beta", true)?;
    /// assert_eq!(resp.get("X-Retry-After"), Some("30"));
    /// # resp.send(())
    /// # });
    /// ```
    pub fn set<V: WriteBuffer>(&mut self, field: &str, value: V) -> Result<&mut Self, ResponseError> {
        self.ensure_open("set")?;
        self.put_header(field, write::to_string(value), true)?;
        Ok(self)
    }

    /// Sets header `field` only when it has no value yet.
    pub fn set_default<V: WriteBuffer>(
        &mut self,
        field: &str,
        value: V,
    ) -> Result<&mut Self, ResponseError> {
        self.ensure_open("set_default")?;
        self.put_header(field, write::to_string(value), false)?;
        Ok(self)
    }

    /// Sets several headers at once, replacing previous values.
    ///
    /// Stops at the first invalid field; the fields before it stay set.
    pub fn set_many<I, N, V>(&mut self, fields: I) -> Result<&mut Self, ResponseError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: WriteBuffer,
    {
        self.ensure_open("set_many")?;
        for (field, value) in fields {
            self.put_header(field.as_ref(), write::to_string(value), true)?;
        }
        Ok(self)
    }

    /// Adds another value to header `field`. Each value is emitted on its own line.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// resp.append("vary", "accept")?.append("vary", "cookie")?;
    /// resp.send("ok")
    /// # });
    /// # let head = std::str::from_utf8(resp.head()).unwrap();
    /// # assert!(head.contains("Vary: accept\r\nVary: cookie\r\n"));
    /// ```
    pub fn append<V: WriteBuffer>(&mut self, field: &str, value: V) -> Result<&mut Self, ResponseError> {
        self.ensure_open("append")?;
        let value = write::to_string(value);
        check_field(field, &value)?;

        match self.header_slot(field) {
            Some(values) => values.push(value),
            None => self.headers.push((field.to_ascii_lowercase(), vec![value])),
        }
        Ok(self)
    }

    /// Adds `Link` entries as `(rel, url)` pairs; a repeated `rel` replaces its url.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// resp.links([("next", "/users?page=3"), ("last", "/users?page=9")])?;
    /// resp.send(())
    /// # });
    /// # let head = std::str::from_utf8(resp.head()).unwrap();
    /// # assert!(head.contains("Link: </users?page=3>; rel=\"next\"\r\n"));
    /// ```
    pub fn links<I, R, U>(&mut self, links: I) -> Result<&mut Self, ResponseError>
    where
        I: IntoIterator<Item = (R, U)>,
        R: Into<String>,
        U: Into<String>,
    {
        self.ensure_open("links")?;
        for (rel, url) in links {
            let (rel, url) = (rel.into(), url.into());
            check_field("link", &rel)?;
            check_field("link", &url)?;

            match self.links.iter_mut().find(|(r, _)| *r == rel) {
                Some(slot) => slot.1 = url,
                None => self.links.push((rel, url)),
            }
        }
        Ok(self)
    }

    /// Switches the `X-Powered-By` marker for this response.
    #[inline]
    pub fn powered_by(&mut self, enabled: bool) -> Result<&mut Self, ResponseError> {
        self.ensure_open("powered_by")?;
        self.powered_by = enabled;
        Ok(self)
    }

    /// Queues a cookie. A cookie of the same name queued earlier is replaced.
    ///
    /// Signed cookies need a [`CookieSigner`] configured on the
    /// [`App`](crate::App); otherwise [`ResponseError::SignerMissing`] is
    /// returned.
    pub fn cookie<N: Into<String>, V: Into<String>>(
        &mut self,
        name: N,
        value: V,
        options: CookieOptions,
    ) -> Result<&mut Self, ResponseError> {
        self.ensure_open("cookie")?;
        let name = name.into();

        if options.signed && self.signer.is_none() {
            return Err(ResponseError::SignerMissing(name));
        }

        self.queue_cookie(Cookie {
            name,
            value: Some(value.into()),
            options,
        })?;
        Ok(self)
    }

    /// Queues an immediate-expiry deletion of cookie `name`.
    pub fn clear_cookie<N: Into<String>>(
        &mut self,
        name: N,
        options: CookieOptions,
    ) -> Result<&mut Self, ResponseError> {
        self.ensure_open("clear_cookie")?;
        self.queue_cookie(Cookie {
            name: name.into(),
            value: None,
            options,
        })?;
        Ok(self)
    }

    fn queue_cookie(&mut self, cookie: Cookie) -> Result<(), ResponseError> {
        let parts = [
            Some(cookie.name.as_str()),
            cookie.value.as_deref(),
            Some(cookie.options.path.as_str()),
            cookie.options.domain.as_deref(),
        ];
        for part in parts.into_iter().flatten() {
            check_field(&cookie.name, part)?;
        }

        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(slot) => *slot = cookie,
            None => self.cookies.push(cookie),
        }
        Ok(())
    }
}

// Finalize entry points
impl Response {
    /// Sends `body` and locks the response.
    ///
    /// Structured bodies are sent as [`json`](Response::json), files as
    /// [`sendfile`](Response::sendfile); text goes through the configured view
    /// engine with `content-type: text/html` unless already set.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// resp.send("<h1>Hello</h1>")
    /// # });
    /// # assert_eq!(resp.body(), b"<h1>Hello</h1>");
    /// ```
    pub fn send<P: Into<Payload>>(&mut self, body: P) -> Result<Control, ResponseError> {
        self.ensure_open("send")?;

        match body.into() {
            Payload::Json(value) => self.json(value),
            Payload::File(path) => self.sendfile(path),
            payload => {
                self.put_header("content-type", "text/html".to_string(), false)?;
                let renderer = Renderer::Template {
                    engine: self.settings.view_engine.clone(),
                };
                self.finalize(payload, renderer)
            }
        }
    }

    /// Sets `status`, then [`send`](Response::send)s `body`. The same as
    /// `status(status)?.send(body)`.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// use maestro_web::StatusCode;
    ///
    /// resp.send_with(StatusCode::Created, "saved")
    /// # });
    /// # assert_eq!(resp.status_code(), maestro_web::StatusCode::Created);
    /// # assert_eq!(resp.body(), b"saved");
    /// ```
    #[inline]
    pub fn send_with<P: Into<Payload>>(
        &mut self,
        status: StatusCode,
        body: P,
    ) -> Result<Control, ResponseError> {
        self.status(status)?.send(body)
    }

    /// Sends `body` as `application/json` and locks the response.
    ///
    /// Object bodies get [`locals`](Response::locals) merged in, locals winning
    /// on key collision. Text bodies are encoded as JSON strings.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// use serde_json::json;
    ///
    /// resp.locals_mut().insert("v".into(), json!(2));
    /// resp.json(json!({"a": 1}))
    /// # });
    /// # assert_eq!(resp.body(), br#"{"a":1,"v":2}"#);
    /// ```
    pub fn json<P: Into<Payload>>(&mut self, body: P) -> Result<Control, ResponseError> {
        self.ensure_open("json")?;
        self.put_header("content-type", Renderer::Json.content_type().to_string(), true)?;
        self.finalize(body.into(), Renderer::Json)
    }

    /// Sets `status`, then sends `body` as [`json`](Response::json).
    #[inline]
    pub fn json_with<P: Into<Payload>>(
        &mut self,
        status: StatusCode,
        body: P,
    ) -> Result<Control, ResponseError> {
        self.status(status)?.json(body)
    }

    /// Sends `body` as JSON wrapped in the callback named by
    /// [`Settings::jsonp_callback_name`](crate::Settings::jsonp_callback_name).
    pub fn jsonp<P: Into<Payload>>(&mut self, body: P) -> Result<Control, ResponseError> {
        self.ensure_open("jsonp")?;

        let callback = match self.settings.jsonp_callback_name.as_str() {
            "" => "callback".to_string(),
            name => name.to_string(),
        };
        let renderer = Renderer::Jsonp { callback };

        self.put_header("content-type", renderer.content_type().to_string(), true)?;
        self.finalize(body.into(), renderer)
    }

    /// Redirects to `url` with `302 Found`.
    #[inline]
    pub fn redirect<U: AsRef<str>>(&mut self, url: U) -> Result<Control, ResponseError> {
        self.redirect_with(StatusCode::Found, url)
    }

    /// Redirects to `url` with an explicit status.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// use maestro_web::StatusCode;
    ///
    /// resp.redirect_with(StatusCode::MovedPermanently, "/new")
    /// # });
    /// # assert_eq!(resp.get("location"), Some("/new"));
    /// ```
    pub fn redirect_with<U: AsRef<str>>(
        &mut self,
        status: StatusCode,
        url: U,
    ) -> Result<Control, ResponseError> {
        self.ensure_open("redirect")?;
        self.put_header("location", url.as_ref().to_string(), true)?;
        self.status = status;
        self.send(())
    }

    /// Streams the file at `path` as an attachment.
    ///
    /// The status becomes 200 when the file exists and 404 otherwise; a missing
    /// file is sent as an empty body, not as an error.
    pub fn sendfile<P: AsRef<Path>>(&mut self, path: P) -> Result<Control, ResponseError> {
        self.sendfile_inner(path.as_ref().to_path_buf())
    }

    /// Like [`sendfile`](Response::sendfile), with `path` resolved under `root`.
    ///
    /// # Examples
    /// ```
    /// # let resp = maestro_web::run_test(|_, resp| {
    /// resp.sendfile_from("/var/www/downloads", "missing.pdf")
    /// # });
    /// # assert_eq!(resp.status_code(), maestro_web::StatusCode::NotFound);
    /// # assert_eq!(resp.get("content-length"), Some("0"));
    /// ```
    pub fn sendfile_from<R: AsRef<Path>, P: AsRef<Path>>(
        &mut self,
        root: R,
        path: P,
    ) -> Result<Control, ResponseError> {
        self.sendfile_inner(root.as_ref().join(path))
    }

    fn sendfile_inner(&mut self, path: PathBuf) -> Result<Control, ResponseError> {
        self.ensure_open("sendfile")?;

        let size = fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());
        let (status, length, stream) = match size {
            Some(size) => (StatusCode::Ok, size, Some(path.clone())),
            None => {
                tracing::debug!(path = %path.display(), "sendfile target not found");
                (StatusCode::NotFound, 0, None)
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.status = status;
        #[rustfmt::skip]
        let headers = [
            ("content-type",        "application/octet-stream".to_string()),
            ("content-length",      length.to_string()),
            ("content-description", "File Transfer".to_string()),
            ("content-disposition", format!("attachment; filename={filename}")),
            ("expires",             "0".to_string()),
            ("cache-control",       "must-revalidate".to_string()),
            ("pragma",              "public".to_string()),
        ];
        for (field, value) in headers {
            self.put_header(field, value, true)?;
        }

        self.finalize(Payload::File(path), Renderer::FileStream { path: stream })
    }

    /// Renders the body, locks the response and emits it into the buffer.
    fn finalize(&mut self, payload: Payload, renderer: Renderer) -> Result<Control, ResponseError> {
        let mut body = Vec::new();

        if self.status != StatusCode::NoContent {
            match &payload {
                Payload::Json(Value::Object(map)) => {
                    let mut merged = map.clone();
                    merged.extend(self.locals.clone());
                    renderer.render(RenderData::Structured(&Value::Object(merged)), &mut body)?;
                }
                Payload::Json(value) => renderer.render(RenderData::Structured(value), &mut body)?,
                Payload::Empty => {
                    renderer.render(RenderData::Raw(self.status.reason().as_bytes()), &mut body)?
                }
                Payload::Text(text) => renderer.render(RenderData::Raw(text.as_bytes()), &mut body)?,
                Payload::Bytes(bytes) => renderer.render(RenderData::Raw(bytes), &mut body)?,
                Payload::File(path) => {
                    let path = path.to_string_lossy();
                    renderer.render(RenderData::Raw(path.as_bytes()), &mut body)?
                }
            }

            self.put_header("content-length", body.len().to_string(), false)?;
        }

        self.state = ResponseState::Locked;
        self.renderer = Some(renderer);
        self.emit(&body);

        tracing::trace!(
            status = self.status.as_u16(),
            length = body.len(),
            "response finalized"
        );
        Ok(Control::Stop)
    }

    fn emit(&mut self, body: &[u8]) {
        let buffer = &mut self.buffer;
        buffer.extend_from_slice(self.status.first_line());

        for (name, values) in &self.headers {
            for value in values {
                write_header(buffer, name, value);
            }
        }
        for (rel, url) in &self.links {
            write_header(buffer, "link", &format!("<{url}>; rel=\"{rel}\""));
        }

        let marker = match self.powered_by {
            true => POWERED_BY,
            false => POWERED_BY_DISABLED,
        };
        write_header(buffer, "x-powered-by", marker);

        for cookie in &self.cookies {
            let value = match (&cookie.value, &self.signer) {
                (Some(value), Some(signer)) if cookie.options.signed => {
                    Some(Cow::Owned(signer.sign(value)))
                }
                (value, _) => value.as_deref().map(Cow::Borrowed),
            };

            buffer.extend_from_slice(b"Set-Cookie: ");
            cookie.write_to(
                value.as_deref(),
                self.settings.cookie_expire,
                self.secure,
                buffer,
            );
            buffer.extend_from_slice(b"\r\n");
        }

        buffer.extend_from_slice(b"\r\n");
        self.body_start = buffer.len();

        if self.status != StatusCode::NoContent {
            buffer.extend_from_slice(body);
        }
    }
}

#[inline]
fn write_header(buffer: &mut Vec<u8>, name: &str, value: &str) {
    write_title_case(name, buffer);
    buffer.extend_from_slice(b": ");
    buffer.extend_from_slice(value.as_bytes());
    buffer.extend_from_slice(b"\r\n");
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("links", &self.links)
            .field("cookies", &self.cookies)
            .field("locals", &self.locals)
            .field("renderer", &self.renderer)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub mod write {
    //! Header value formatting.

    use std::{borrow::Cow, rc::Rc, sync::Arc};

    /// Trait for values that can be written as a header value.
    ///
    /// Implemented for strings, booleans, `char` and integer types
    /// (excluding floating-point numbers, whose formatting is locale- and
    /// precision-sensitive).
    ///
    /// # Example
    /// ```
    /// use maestro_web::WriteBuffer;
    ///
    /// struct Etag(u64);
    ///
    /// impl WriteBuffer for Etag {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.push(b'"');
    ///         self.0.write_to(buffer);
    ///         buffer.push(b'"');
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Appends the value's UTF-8 representation to the buffer.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    pub(crate) fn to_string<T: WriteBuffer>(value: T) -> String {
        let mut buffer = Vec::new();
        value.write_to(&mut buffer);

        match String::from_utf8(buffer) {
            Ok(value) => value,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    macro_rules! impl_write_buffer {
        (str => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let value: &str = self.as_ref();
                    buffer.extend_from_slice(value.as_bytes());
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer + ?Sized> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl WriteBuffer for str {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self.as_bytes());
        }
    }
    impl_write_buffer! {
        str => String, Box<str>, Cow<'_, str>, Arc<str>, Rc<str>
    }
    impl_write_buffer! {
        number(u128), write_u128 => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        number(i128), write_i128 => i8, i16, i32, i64, i128, isize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline(always)]
    fn write_u128(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn write_i128(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        let (arr, start) = number_to_bytes(value.unsigned_abs());
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn values() {
            assert_eq!(to_string("text/plain"), "text/plain");
            assert_eq!(to_string(String::from("a")), "a");
            assert_eq!(to_string(0u8), "0");
            assert_eq!(to_string(u64::MAX), "18446744073709551615");
            assert_eq!(to_string(-42i32), "-42");
            assert_eq!(to_string(true), "true");
            assert_eq!(to_string('é'), "é");
        }
    }
}
