use maestro_web::{
    handler_fn, App, CookieOptions, CookieSigner, Method, Server, Settings, StatusCode,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DOWNLOADS: &str = "./public";

/// Toy signer: appends a keyed checksum. Use a real MAC in production.
struct Checksum(u64);

impl Checksum {
    fn digest(&self, value: &str) -> u64 {
        value
            .bytes()
            .fold(self.0, |acc, b| acc.rotate_left(5) ^ u64::from(b))
    }
}

impl CookieSigner for Checksum {
    fn sign(&self, value: &str) -> String {
        format!("{value}.{:x}", self.digest(value))
    }

    fn unsign(&self, value: &str) -> Option<String> {
        let (value, sig) = value.rsplit_once('.')?;
        (u64::from_str_radix(sig, 16).ok()? == self.digest(value)).then(|| value.to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let settings = Settings::from_toml_str(
        r#"
        cookie_expire = 3600
        powered_by = false
        "#,
    )
    .unwrap();

    let mut app = App::new(settings).with_signer(Checksum(0x5eed));
    app.load_routes(|routes| {
        routes
            .add("/", Method::Get, handler_fn(|_, resp| Ok(resp.redirect("/files/readme.txt")?)))?
            .add(
                "/old/*",
                Method::Get | Method::Head,
                handler_fn(|req, resp| {
                    let rest = req.param("*").unwrap_or_default().to_string();
                    Ok(resp.redirect_with(StatusCode::MovedPermanently, format!("/files/{rest}"))?)
                }),
            )?
            .add(
                "/files/*",
                Method::Get | Method::Head,
                handler_fn(|req, resp| {
                    let name = req.param("*").unwrap_or_default().to_string();
                    if name.split('/').any(|part| part == "..") {
                        return Ok(resp.status(StatusCode::Forbidden)?.send(())?);
                    }
                    Ok(resp.sendfile_from(DOWNLOADS, name)?)
                }),
            )?
            .add(
                "/login/:user",
                Method::Post,
                handler_fn(|req, resp| {
                    let user = req.param("user").unwrap_or_default().to_string();
                    let options = CookieOptions {
                        signed: true,
                        max_age: Some(Duration::from_secs(24 * 3600)),
                        ..CookieOptions::default()
                    };
                    resp.cookie("user", user, options)?.cookie("theme", "dark", CookieOptions::default())?;
                    Ok(resp.redirect("/whoami")?)
                }),
            )?
            .add(
                "/logout",
                Method::Post,
                handler_fn(|_, resp| {
                    resp.clear_cookie("user", CookieOptions::default())?;
                    Ok(resp.redirect("/")?)
                }),
            )?
            .add(
                "/whoami",
                Method::Get,
                handler_fn(|req, resp| match req.signed_cookies().get("user") {
                    Some(user) => Ok(resp.send(format!("<p>Signed in as {user}</p>"))?),
                    None => {
                        resp.links([("login", "/login/guest")])?;
                        Ok(resp.status(StatusCode::Unauthorized)?.send(())?)
                    }
                }),
            )?;
        Ok(())
    })
    .unwrap();

    app.mount_all(handler_fn(|req, resp| {
        tracing::info!(path = req.path(), "fell through every route");
        Ok(resp.status(StatusCode::NotFound)?.send("Nothing here")?)
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
