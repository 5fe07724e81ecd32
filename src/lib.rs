//! maestro_web - ordered route dispatch with exactly-once response finalization
//!
//! An [`App`] holds an ordered table of routes: mount patterns made of
//! literal segments, `:name` parameters and a trailing `*` wildcard, each
//! with a set of accepted [verbs](Verbs). For every request, **all** matching
//! routes run in registration order over one shared [`Request`] /
//! [`Response`] pair until a handler finalizes the response or returns
//! [`Control::Stop`].
//!
//! The response is a small state machine. It accumulates status, headers,
//! cookies and locals while `OPEN`; the first call to a finalize method
//! ([`send`](Response::send), [`json`](Response::json),
//! [`jsonp`](Response::jsonp), [`redirect`](Response::redirect),
//! [`sendfile`](Response::sendfile)) emits the status line, headers, cookies
//! and body in that order and locks it. Anything after that is rejected with
//! [`ResponseError::Locked`](errors::ResponseError::Locked).
//!
//! # Dispatch outcomes
//!
//! - no pattern matches: `404 Not Found`
//! - patterns match but none accepts the verb: `405 Method Not Allowed` with
//!   an `Allow` header
//! - no handler finalizes: the default response (`200 OK`, reason phrase body)
//!
//! # Examples
//!
//! Without a network, one dispatch cycle at a time:
//! ```
//! use maestro_web::{handler_fn, request::TransportInput, App, Control, Settings, StatusCode};
//! use serde_json::json;
//!
//! let mut app = App::new(Settings::default());
//! app.mount_all(handler_fn(|req, resp| {
//!     resp.locals_mut().insert("path".into(), req.path().into());
//!     Ok(Control::Continue)
//! }))?
//! .get("/users/:id", handler_fn(|req, resp| {
//!     Ok(resp.json(json!({ "id": req.param("id") }))?)
//! }))?;
//!
//! let resp = app.conduct(TransportInput::new("GET", "http://localhost/users/7"))?;
//! assert_eq!(resp.status_code(), StatusCode::Ok);
//! assert_eq!(resp.body(), br#"{"id":"7","path":"/users/7"}"#);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Served over TCP:
//! ```no_run
//! use maestro_web::{handler_fn, App, Server, Settings};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = App::new(Settings::load("maestro.toml")?);
//!     app.get("/", handler_fn(|_, resp| Ok(resp.send("Hello World!")?)))?;
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await?)
//!         .app(app)
//!         .build()?
//!         .launch()
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (dispatch at `debug`, handler calls at
//! `trace`, faults and rejected mutations at `warn`) and installs no
//! subscriber of its own.

pub(crate) mod http {
    pub(crate) mod cookie;
    pub mod query;
    pub mod request;
    pub mod response;
    pub(crate) mod types;
}
pub mod router {
    pub mod dispatcher;
    pub mod pattern;
    pub mod table;

    pub use self::{
        dispatcher::Resolution,
        table::{RouteEntry, RouteTable},
    };
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub mod conductor;
pub mod errors;
pub mod limits;
pub mod render;
pub(crate) mod settings;

pub use crate::{
    conductor::{handler_fn, App, BoxedHandler, Conductor, Control, Handler, HandlerResult, Routes},
    http::{
        cookie::{CookieOptions, CookieSigner},
        query,
        request::{self, Request},
        response::{self, write::WriteBuffer, Payload, Response},
        types::{Method, StatusCode, Verbs},
    },
    server::server_impl::{Server, ServerBuilder},
    settings::Settings,
};

#[doc(hidden)]
pub fn run_test<F>(f: F) -> Response
where
    F: FnOnce(&mut Request, &mut Response) -> Result<Control, errors::ResponseError>,
{
    let input = request::TransportInput::new("GET", "http://localhost/");
    let mut req = match Request::new(input, None) {
        Ok(req) => req,
        Err(err) => panic!("invalid test request: {err}"),
    };
    let mut resp = Response::new(std::sync::Arc::new(Settings::default()));

    let _ = f(&mut req, &mut resp);
    resp
}

#[cfg(test)]
pub mod tools {
    use std::str::from_utf8;

    #[inline]
    pub fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }
}
