use maestro_web::{
    handler_fn, request::Body, App, Control, Handler, HandlerResult, Method, Request, Response,
    Server, Settings, StatusCode,
};
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// In-memory user store shared by the collection and item routes.
#[derive(Clone, Default)]
struct Users {
    names: Arc<Mutex<BTreeMap<u64, String>>>,
}

impl Handler for Users {
    fn handle(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        let mut names = self.names.lock().map_err(|_| "user store poisoned")?;

        let id = match req.param("id") {
            Some(id) => match id.parse::<u64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    return Ok(resp.json_with(StatusCode::BadRequest, json!({"error": "id must be a number"}))?)
                }
            },
            None => None,
        };

        match (req.method(), id) {
            (Method::Get, None) => Ok(resp.json(json!({ "users": *names }))?),
            (Method::Get, Some(id)) => match names.get(&id) {
                Some(name) => Ok(resp.json(json!({ "id": id, "name": name }))?),
                None => Ok(resp.status(StatusCode::NotFound)?.json(json!({"error": "no such user"}))?),
            },
            (Method::Post, None) => {
                let Some(name) = req.param("name") else {
                    return Ok(resp.status(StatusCode::BadRequest)?.json(json!({"error": "name is required"}))?);
                };
                let id = names.keys().next_back().map_or(1, |last| last + 1);
                names.insert(id, name.to_string());

                Ok(resp
                    .status(StatusCode::Created)?
                    .set("location", format!("/users/{id}"))?
                    .json(json!({ "id": id, "name": name }))?)
            }
            (Method::Put, Some(id)) => {
                let name = match req.body() {
                    Body::Json(value) => value.get("name").and_then(|v| v.as_str()).map(str::to_string),
                    _ => req.param("name").map(str::to_string),
                };
                match name {
                    Some(name) => {
                        names.insert(id, name);
                        Ok(resp.status(StatusCode::NoContent)?.send(())?)
                    }
                    None => Ok(resp.status(StatusCode::BadRequest)?.json(json!({"error": "name is required"}))?),
                }
            }
            (Method::Delete, Some(id)) => {
                names.remove(&id);
                Ok(resp.status(StatusCode::NoContent)?.send(())?)
            }
            (_, None) => method_not_allowed(resp, "GET, POST"),
            (_, Some(_)) => method_not_allowed(resp, "GET, PUT, DELETE"),
        }
    }
}

// Users is mounted for every verb and answers 405 itself.
fn method_not_allowed(resp: &mut Response, allow: &str) -> HandlerResult {
    Ok(resp
        .set("allow", allow)?
        .json_with(StatusCode::MethodNotAllowed, json!({"error": "method not allowed"}))?)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let users = Users::default();

    let mut app = App::new(Settings::default());
    app.mount_all(handler_fn(|req, resp| {
        tracing::info!(method = %req.method(), uri = req.uri(), ip = %req.ip(), "request");
        resp.set("x-content-type-options", "nosniff")?;
        Ok(Control::Continue)
    }))
    .unwrap()
    .mount("/users", users.clone())
    .unwrap()
    .mount("/users/:id", users)
    .unwrap()
    .get(
        "/jsonp/users",
        handler_fn(|_, resp| Ok(resp.jsonp(json!({ "users": [] }))?)),
    )
    .unwrap()
    // The logger matches every path, so unknown ones need an explicit 404.
    .mount_all(handler_fn(|_, resp| {
        Ok(resp.json_with(StatusCode::NotFound, json!({"error": "not found"}))?)
    }))
    .unwrap();

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .app(app)
        .build()
        .unwrap()
        .launch()
        .await;
}
