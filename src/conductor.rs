//! Handler chain execution and the application object.

use crate::{
    errors::{BoxError, CompileError, DispatchError, RequestError},
    http::cookie::CookieSigner,
    request::TransportInput,
    router::{Resolution, RouteEntry, RouteTable},
    Method, Request, Response, Settings, StatusCode, Verbs,
};
use std::sync::Arc;

/// Signal returned by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Run the next matched handler.
    Continue,
    /// Halt the chain. Every finalize call on [`Response`] returns this.
    Stop,
}

/// Result type of [`Handler::handle`].
pub type HandlerResult = Result<Control, BoxError>;

/// A route handler or middleware.
///
/// Handlers run synchronously, one after another, over the same request and
/// response. Returning an error aborts the dispatch cycle; the error reaches
/// the host as [`DispatchError::Handler`].
///
/// # Examples
/// ```
/// use maestro_web::{Control, Handler, HandlerResult, Request, Response};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn handle(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
///         let name = req.param("name").unwrap_or("world").to_string();
///         Ok(resp.send(format!("Hello, {name}!"))?)
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &mut Request, resp: &mut Response) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        self(req, resp)
    }
}

/// Identity helper that lets closure handlers infer their signature.
///
/// ```
/// use maestro_web::{handler_fn, Control};
///
/// let log = handler_fn(|req, _| {
///     println!("{} {}", req.method(), req.path());
///     Ok(Control::Continue)
/// });
/// ```
#[inline(always)]
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&mut Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
{
    f
}

/// Boxed handler stored in the application's route table.
pub type BoxedHandler = Box<dyn Handler>;

/// Route table of an [`App`].
pub type Routes = RouteTable<BoxedHandler>;

impl Routes {
    /// Boxes `handler` and registers it.
    pub fn add<V: Into<Verbs>, H: Handler>(
        &mut self,
        pattern: &str,
        verbs: V,
        handler: H,
    ) -> Result<&mut Self, CompileError> {
        self.register(pattern, verbs, Box::new(handler))
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// Runs matched handlers in order over one request/response pair.
///
/// The chain stops on [`Control::Stop`] or as soon as the response is
/// finalized. A chain that ends with the response still open finalizes it
/// with the reason phrase of its current status.
pub struct Conductor<'a> {
    entries: Vec<&'a RouteEntry<BoxedHandler>>,
}

impl<'a> Conductor<'a> {
    #[inline]
    pub fn new(entries: Vec<&'a RouteEntry<BoxedHandler>>) -> Self {
        Self { entries }
    }

    pub fn run(&self, req: &mut Request, resp: &mut Response) -> Result<(), DispatchError> {
        for entry in &self.entries {
            let pattern = entry.pattern.source();
            tracing::trace!(pattern, "running handler");

            match entry.handler.handle(req, resp) {
                Ok(Control::Stop) => break,
                Ok(Control::Continue) if resp.is_locked() => break,
                Ok(Control::Continue) => {}
                Err(source) => {
                    tracing::warn!(pattern, error = %source, "handler failed");
                    return Err(DispatchError::Handler {
                        pattern: pattern.to_string(),
                        source,
                    });
                }
            }
        }

        if !resp.is_locked() {
            resp.send(())?;
        }
        Ok(())
    }
}

/// The application: settings, cookie signer and mounted routes.
///
/// Build it once, then share it (typically behind an `Arc`) between the
/// threads serving requests; dispatch only reads it.
///
/// # Examples
/// ```
/// use maestro_web::{handler_fn, request::TransportInput, App, Control, Method, Settings, StatusCode};
/// use serde_json::json;
///
/// let mut app = App::new(Settings::default());
/// app.mount_all(handler_fn(|_, resp| {
///     resp.set("x-frame-options", "DENY")?;
///     Ok(Control::Continue)
/// }))?
/// .route("/users/:id", Method::Get, handler_fn(|req, resp| {
///     let id = req.param("id").unwrap_or_default().to_string();
///     Ok(resp.json(json!({ "id": id }))?)
/// }))?;
///
/// let resp = app.conduct(TransportInput::new("GET", "http://localhost/users/42"))?;
/// assert_eq!(resp.status_code(), StatusCode::Ok);
/// assert_eq!(resp.get("x-frame-options"), Some("DENY"));
/// assert_eq!(resp.body(), br#"{"id":"42"}"#);
///
/// let resp = app.conduct(TransportInput::new("POST", "http://localhost/users/42"))?;
/// assert_eq!(resp.status_code(), StatusCode::MethodNotAllowed);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct App {
    routes: Routes,
    settings: Arc<Settings>,
    signer: Option<Arc<dyn CookieSigner>>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            routes: Routes::new(),
            settings: Arc::new(settings),
            signer: None,
        }
    }

    /// Configures the capability used for signed cookies.
    pub fn with_signer<S: CookieSigner>(mut self, signer: S) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    #[inline(always)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline(always)]
    pub(crate) fn shared_settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    #[inline(always)]
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Mounts `handler` at `pattern` for every verb.
    #[inline]
    pub fn mount<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, CompileError> {
        self.route(pattern, Verbs::ALL, handler)
    }

    /// Mounts `handler` at `/*` for every verb.
    ///
    /// The route matches every request, so the router never resolves to 404
    /// or 405 once it is mounted: a chain that nobody finalizes ends in the
    /// default `200 OK`. Mount a final fallback that sends its own 404 when
    /// those outcomes matter.
    #[inline]
    pub fn mount_all<H: Handler>(&mut self, handler: H) -> Result<&mut Self, CompileError> {
        self.route("/*", Verbs::ALL, handler)
    }

    /// Mounts `handler` at `pattern` for the given verbs.
    pub fn route<V: Into<Verbs>, H: Handler>(
        &mut self,
        pattern: &str,
        verbs: V,
        handler: H,
    ) -> Result<&mut Self, CompileError> {
        self.routes.add(pattern, verbs, handler)?;
        Ok(self)
    }

    #[inline]
    pub fn get<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, CompileError> {
        self.route(pattern, Method::Get, handler)
    }

    #[inline]
    pub fn post<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, CompileError> {
        self.route(pattern, Method::Post, handler)
    }

    #[inline]
    pub fn put<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, CompileError> {
        self.route(pattern, Method::Put, handler)
    }

    #[inline]
    pub fn delete<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, CompileError> {
        self.route(pattern, Method::Delete, handler)
    }

    /// Hands the route table to a registration function, such as a routes
    /// module kept apart from the application setup.
    ///
    /// ```
    /// use maestro_web::{handler_fn, App, Method, Routes, Settings, errors::CompileError};
    ///
    /// fn routes(table: &mut Routes) -> Result<(), CompileError> {
    ///     table
    ///         .add("/", Method::Get, handler_fn(|_, resp| Ok(resp.send("home")?)))?
    ///         .add("/about", Method::Get, handler_fn(|_, resp| Ok(resp.send("about")?)))?;
    ///     Ok(())
    /// }
    ///
    /// let mut app = App::new(Settings::default());
    /// app.load_routes(routes).unwrap();
    /// assert_eq!(app.routes().len(), 2);
    /// ```
    pub fn load_routes<F>(&mut self, f: F) -> Result<&mut Self, CompileError>
    where
        F: FnOnce(&mut Routes) -> Result<(), CompileError>,
    {
        f(&mut self.routes)?;
        Ok(self)
    }

    /// Builds the request snapshot and a fresh response for it.
    pub fn prepare(&self, input: TransportInput) -> Result<(Request, Response), RequestError> {
        let req = Request::new(input, self.signer.as_deref())?;
        let resp = Response::new(Arc::clone(&self.settings))
            .with_signer(self.signer.clone())
            .with_secure(req.secure());

        Ok((req, resp))
    }

    /// Resolves the request and runs the matched handlers.
    ///
    /// No route gives `404 Not Found`; a path served only under other verbs
    /// gives `405 Method Not Allowed` with an `Allow` header. Either way the
    /// body is the reason phrase.
    pub fn dispatch(&self, req: &mut Request, resp: &mut Response) -> Result<(), DispatchError> {
        let method = req.method();

        match self.routes.match_all(method, req.path()) {
            Resolution::Matched { entries, params } => {
                tracing::debug!(%method, path = req.path(), handlers = entries.len(), "dispatching");
                req.set_params(params);
                Conductor::new(entries).run(req, resp)
            }
            Resolution::MethodNotAllowed { allowed } => {
                tracing::debug!(%method, path = req.path(), "method not allowed");
                resp.status(StatusCode::MethodNotAllowed)?
                    .set("allow", allowed.to_header_value())?
                    .send(())?;
                Ok(())
            }
            Resolution::NotFound => {
                tracing::debug!(%method, path = req.path(), "no route");
                resp.status(StatusCode::NotFound)?.send(())?;
                Ok(())
            }
        }
    }

    /// Runs one full dispatch cycle and returns the finalized response.
    pub fn conduct(&self, input: TransportInput) -> Result<Response, DispatchError> {
        let (mut req, mut resp) = self.prepare(input)?;
        self.dispatch(&mut req, &mut resp)?;
        Ok(resp)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes.len())
            .field("settings", &self.settings)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ResponseError, http::cookie::CookieOptions, query::Params, tools::*,
    };
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct Suffix;

    impl CookieSigner for Suffix {
        fn sign(&self, value: &str) -> String {
            format!("{value}--sig")
        }

        fn unsign(&self, value: &str) -> Option<String> {
            value.strip_suffix("--sig").map(str::to_string)
        }
    }

    fn get(app: &App, url: &str) -> Response {
        app.conduct(TransportInput::new("GET", url)).unwrap()
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut app = App::new(Settings::default());

        for name in ["first", "second", "third"] {
            let trace = Arc::clone(&trace);
            app.mount(
                "/a/:x",
                handler_fn(move |_, _| {
                    trace.lock().unwrap().push(name);
                    Ok(Control::Continue)
                }),
            )
            .unwrap();
        }

        let resp = get(&app, "http://localhost/a/b");
        assert_eq!(*trace.lock().unwrap(), ["first", "second", "third"]);

        // Exhausted chain sends the default reason phrase
        assert!(resp.is_locked());
        assert_eq!(str_op(resp.body()), "OK");
    }

    #[test]
    fn param_route_registered_first_wins() {
        let mut app = App::new(Settings::default());
        app.get("/a/:x", handler_fn(|req, resp| {
            let x = req.param("x").unwrap_or_default().to_string();
            Ok(resp.send(format!("param {x}"))?)
        }))
        .unwrap()
        .get("/a/b", handler_fn(|_, resp| Ok(resp.send("literal")?)))
        .unwrap();

        assert_eq!(str_op(get(&app, "http://localhost/a/b").body()), "param b");
    }

    #[test]
    fn stop_and_finalize_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut app = App::new(Settings::default());

        let counter = Arc::clone(&calls);
        app.mount_all(handler_fn(move |req, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            match req.path() {
                "/stop" => Ok(Control::Stop),
                _ => Ok(Control::Continue),
            }
        }))
        .unwrap();

        // Finalizing implies STOP even when the handler says continue
        app.mount("/send", handler_fn(|_, resp| {
            resp.send("sent")?;
            Ok(Control::Continue)
        }))
        .unwrap();

        let counter = Arc::clone(&calls);
        app.mount_all(handler_fn(move |_, _| {
            counter.fetch_add(100, Ordering::SeqCst);
            Ok(Control::Continue)
        }))
        .unwrap();

        let resp = get(&app, "http://localhost/stop");
        assert_eq!(calls.swap(0, Ordering::SeqCst), 1);
        assert_eq!(str_op(resp.body()), "OK");

        let resp = get(&app, "http://localhost/send");
        assert_eq!(calls.swap(0, Ordering::SeqCst), 1);
        assert_eq!(str_op(resp.body()), "sent");

        get(&app, "http://localhost/other");
        assert_eq!(calls.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn not_found() {
        let mut app = App::new(Settings::default());
        app.get("/exists", handler_fn(|_, resp| Ok(resp.send("x")?)))
            .unwrap();

        let resp = get(&app, "http://localhost/missing");
        assert_eq!(resp.status_code(), StatusCode::NotFound);
        assert_eq!(str_op(resp.body()), "Not Found");
        assert!(str_op(resp.head()).starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn method_not_allowed() {
        let mut app = App::new(Settings::default());
        app.route("/users", Method::Get | Method::Head, handler_fn(|_, resp| Ok(resp.send("x")?)))
            .unwrap()
            .post("/users", handler_fn(|_, resp| Ok(resp.send("y")?)))
            .unwrap();

        let resp = app
            .conduct(TransportInput::new("DELETE", "http://localhost/users"))
            .unwrap();
        assert_eq!(resp.status_code(), StatusCode::MethodNotAllowed);
        assert_eq!(resp.get("allow"), Some("GET, POST, HEAD"));
        assert_eq!(str_op(resp.body()), "Method Not Allowed");
    }

    #[test]
    fn catch_all_masks_router_fallbacks() {
        let mut app = App::new(Settings::default());
        app.mount_all(handler_fn(|_, _| Ok(Control::Continue)))
            .unwrap()
            .get("/users", handler_fn(|_, resp| Ok(resp.send("x")?)))
            .unwrap();

        let resp = get(&app, "http://localhost/missing");
        assert_eq!(resp.status_code(), StatusCode::Ok);
        let resp = app
            .conduct(TransportInput::new("DELETE", "http://localhost/users"))
            .unwrap();
        assert_eq!(resp.status_code(), StatusCode::Ok);
        assert_eq!(resp.get("allow"), None);

        app.mount_all(handler_fn(|_, resp| {
            Ok(resp.send_with(StatusCode::NotFound, ())?)
        }))
        .unwrap();

        let resp = get(&app, "http://localhost/missing");
        assert_eq!(resp.status_code(), StatusCode::NotFound);
        assert_eq!(str_op(resp.body()), "Not Found");
        assert_eq!(str_op(get(&app, "http://localhost/users").body()), "x");
    }

    #[test]
    fn route_params_override_query() {
        let seen = Arc::new(Mutex::new(Params::new()));
        let mut app = App::new(Settings::default());

        let store = Arc::clone(&seen);
        app.get("/users/:id", handler_fn(move |req, _| {
            *store.lock().unwrap() = req.params().clone();
            Ok(Control::Continue)
        }))
        .unwrap();

        get(&app, "http://localhost/users/42?id=7&tab=posts");

        let params = seen.lock().unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("tab"), Some("posts"));
    }

    #[test]
    fn handler_fault_propagates() {
        let mut app = App::new(Settings::default());
        app.get("/boom", handler_fn(|_, _| Err("database down".into())))
            .unwrap()
            .get("/boom", handler_fn(|_, _| unreachable!()))
            .unwrap();

        match app.conduct(TransportInput::new("GET", "http://localhost/boom")) {
            Err(DispatchError::Handler { pattern, source }) => {
                assert_eq!(pattern, "/boom");
                assert_eq!(source.to_string(), "database down");
            }
            other => panic!("expected handler fault, got {other:?}"),
        }
    }

    #[test]
    fn response_misuse_is_a_fault() {
        let mut app = App::new(Settings::default());
        app.get("/twice", handler_fn(|_, resp| {
            resp.send("one")?;
            resp.send("two")?;
            Ok(Control::Stop)
        }))
        .unwrap();

        match app.conduct(TransportInput::new("GET", "http://localhost/twice")) {
            Err(DispatchError::Handler { source, .. }) => {
                assert!(matches!(
                    source.downcast_ref::<ResponseError>(),
                    Some(ResponseError::Locked)
                ));
            }
            other => panic!("expected handler fault, got {other:?}"),
        }
    }

    #[test]
    fn bad_input_is_a_request_error() {
        let app = App::new(Settings::default());

        assert!(matches!(
            app.conduct(TransportInput::new("PATCH", "http://localhost/")),
            Err(DispatchError::Request(RequestError::UnsupportedMethod(_)))
        ));
    }

    #[test]
    fn signer_reaches_request_and_response() {
        let mut app = App::new(Settings::default()).with_signer(Suffix);
        app.get("/login", handler_fn(|req, resp| {
            let previous = req.signed_cookies().get("sid").unwrap_or("none").to_string();
            resp.cookie("sid", "new", CookieOptions { signed: true, ..CookieOptions::default() })?;
            Ok(resp.send(previous)?)
        }))
        .unwrap();

        let input = TransportInput::new("GET", "https://localhost/login").cookie("sid", "old--sig");
        let resp = app.conduct(input).unwrap();

        assert_eq!(str_op(resp.body()), "old");
        assert!(str_op(resp.head())
            .contains("Set-Cookie: sid=new--sig; Path=/; Secure; HttpOnly\r\n"));
    }

    #[test]
    fn load_routes_and_locals() {
        let mut app = App::new(Settings::default());
        app.mount_all(handler_fn(|_, resp| {
            resp.locals_mut().insert("app".into(), json!("maestro"));
            Ok(Control::Continue)
        }))
        .unwrap()
        .load_routes(|routes| {
            routes.add("/info", Method::Get, handler_fn(|_, resp| {
                Ok(resp.send(json!({"version": 1}))?)
            }))?;
            Ok(())
        })
        .unwrap();

        let resp = get(&app, "http://localhost/info");
        assert_eq!(resp.get("content-type"), Some("application/json"));
        assert_eq!(str_op(resp.body()), r#"{"version":1,"app":"maestro"}"#);
    }
}
