use crate::{
    conductor::App,
    errors::BuildError,
    limits::{ConnLimits, ReqLimits, ServerLimits, WaitStrategy},
    server::connection::{error_response, write_bytes, HttpConnection},
    StatusCode,
};
use crossbeam::queue::SegQueue;
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::sleep as tokio_sleep,
};

/// TCP host that feeds HTTP/1.x requests into an [`App`].
///
/// Every connection carries exactly one request and is closed after the
/// response (`connection: close`). A fixed pool of worker tasks drains the
/// queue of accepted connections; see
/// [`ServerLimits`](crate::limits::ServerLimits#connection-management).
///
/// Requests that never reach the router are answered directly:
///
/// | Condition                              | Status |
/// |----------------------------------------|--------|
/// | malformed request line or header       | `400`  |
/// | `Content-Length` above the body limit  | `413`  |
/// | head above the size or count limit     | `431`  |
/// | `Transfer-Encoding` present            | `501`  |
/// | handler fault                          | `500`  |
/// | admission queue full                   | `503`  |
///
/// # Examples
///
/// ```no_run
/// use maestro_web::{handler_fn, App, Server, Settings};
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut app = App::new(Settings::default());
///     app.get("/", handler_fn(|_, resp| Ok(resp.send("Hello world!")?)))?;
///
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await?)
///         .app(app)
///         .build()?
///         .launch()
///         .await;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    stream_queue: TcpQueue,
    error_queue: TcpQueue,
    server_limits: ServerLimits,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            app: None,
            server_limits: None,
            request_limits: None,
            connection_limits: None,
        }
    }

    /// Address the listener is bound to.
    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, queueing them for the workers.
    pub async fn launch(self) {
        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            workers = self.server_limits.max_connections,
            "listening"
        );

        loop {
            let value = match self.listener.accept().await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            match self.stream_queue.len() < self.server_limits.max_pending_connections {
                true => self.stream_queue.push(value),
                false => {
                    tracing::debug!(peer = %value.1, "admission queue full");
                    self.error_queue.push(value)
                }
            }
        }
    }

    #[inline]
    async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listener", &self.listener)
            .field("pending", &self.stream_queue.len())
            .field("server_limits", &self.server_limits)
            .finish()
    }
}

/// Builder for configuring and creating [`Server`] instances.
#[derive(Debug)]
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    app: Option<Arc<App>>,

    server_limits: Option<ServerLimits>,
    request_limits: Option<ReqLimits>,
    connection_limits: Option<ConnLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener. **Required.**
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the application requests are dispatched to. **Required.**
    ///
    /// Routes must be mounted before this call; the route table is read-only
    /// while serving.
    #[inline(always)]
    pub fn app(mut self, app: App) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Spawns the worker pool and returns the server, ready to
    /// [`launch`](Server::launch).
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Server, BuildError> {
        let listener = self.listener.ok_or(BuildError::MissingListener)?;
        let app = self.app.ok_or(BuildError::MissingApp)?;
        let server_limits = self.server_limits.unwrap_or_default();
        let conn_limits = self.connection_limits.unwrap_or_default();
        let req_limits = self.request_limits.unwrap_or_default();

        let stream_queue = Arc::new(SegQueue::new());
        let error_queue = Arc::new(SegQueue::new());

        for _ in 0..server_limits.max_connections {
            let conn = HttpConnection::new(app.clone(), conn_limits.clone(), req_limits.clone());
            Self::spawn_worker(&stream_queue, conn, &server_limits);
        }
        if server_limits.count_503_handlers != 0 {
            for _ in 0..server_limits.count_503_handlers {
                Self::spawn_alarmist(&error_queue, &app, &server_limits, &conn_limits);
            }
        } else {
            Self::spawn_quiet_alarmist(&error_queue, &server_limits);
        }

        Ok(Server {
            listener,
            stream_queue,
            error_queue,
            server_limits,
        })
    }

    #[inline]
    fn spawn_worker(queue: &TcpQueue, mut conn: HttpConnection, limits: &ServerLimits) {
        let queue = queue.clone();
        let wait = limits.wait_strategy.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, peer) = Server::get_stream(&queue, &wait).await;

                if let Err(err) = conn.run(&mut stream, peer).await {
                    tracing::debug!(%peer, error = %err, "connection dropped");
                }
                let _ = stream.shutdown().await;
            }
        });
    }

    #[inline]
    fn spawn_alarmist(queue: &TcpQueue, app: &App, limits: &ServerLimits, conn_limits: &ConnLimits) {
        let queue = queue.clone();
        let wait = limits.wait_strategy.clone();
        let write_timeout = conn_limits.socket_write_timeout;

        let reply = match error_response(&app.shared_settings(), StatusCode::ServiceUnavailable) {
            Ok(resp) => resp.buffer().to_vec(),
            Err(err) => {
                tracing::warn!(error = %err, "cannot build the 503 response");
                Vec::new()
            }
        };

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = Server::get_stream(&queue, &wait).await;

                let _ = write_bytes(&mut stream, &reply, write_timeout).await;
                let _ = stream.shutdown().await;
            }
        });
    }

    #[inline]
    fn spawn_quiet_alarmist(queue: &TcpQueue, limits: &ServerLimits) {
        let queue = queue.clone();
        let wait = limits.wait_strategy.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = Server::get_stream(&queue, &wait).await;

                drop(stream);
            }
        });
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler_fn, Method, Settings};
    use tokio::io::AsyncReadExt;

    fn app() -> App {
        let mut app = App::new(Settings::default());
        app.route(
            "/hello/:name",
            Method::Get | Method::Head,
            handler_fn(|req, resp| {
                let name = req.param("name").unwrap_or_default().to_string();
                Ok(resp.send(format!("Hello, {name}!"))?)
            }),
        )
        .unwrap()
        .post(
            "/echo",
            handler_fn(|req, resp| {
                let text = req.param("text").unwrap_or_default().to_string();
                Ok(resp.send(text)?)
            }),
        )
        .unwrap()
        .get("/fail", handler_fn(|_, _| Err("boom".into())))
        .unwrap();
        app
    }

    async fn serve(limits: ReqLimits) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::builder()
            .listener(listener)
            .app(app())
            .server_limits(ServerLimits {
                max_connections: 2,
                ..ServerLimits::default()
            })
            .request_limits(limits)
            .build()
            .unwrap();

        let addr = server.local_addr().unwrap();
        tokio::spawn(server.launch());
        addr
    }

    async fn exchange(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn dispatches_requests() {
        let addr = serve(ReqLimits::default()).await;

        let resp = exchange(addr, "GET /hello/ada HTTP/1.1\r\nHost: test\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
        assert!(resp.contains("Connection: close\r\n"), "{resp}");
        assert!(resp.ends_with("\r\n\r\nHello, ada!"), "{resp}");

        let resp = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nContent-Length: 8\r\n\r\ntext=hey",
        )
        .await;
        assert!(resp.ends_with("\r\n\r\nhey"), "{resp}");

        let resp = exchange(addr, "HEAD /hello/ada HTTP/1.1\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
        assert!(resp.ends_with("\r\n\r\n"), "{resp}");

        let resp = exchange(addr, "DELETE /echo HTTP/1.1\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{resp}");
        assert!(resp.contains("Allow: POST\r\n"), "{resp}");

        let resp = exchange(addr, "GET /missing HTTP/1.1\r\n\r\n").await;
        assert!(resp.ends_with("\r\n\r\nNot Found"), "{resp}");
    }

    #[tokio::test]
    async fn rejects_before_dispatch() {
        let addr = serve(ReqLimits {
            head_size: 128,
            body_size: 16,
            ..ReqLimits::default()
        })
        .await;

        #[rustfmt::skip]
        let cases = [
            ("GET /x\r\n\r\n",                                        "400 Bad Request"),
            ("PATCH / HTTP/1.1\r\n\r\n",                              "400 Bad Request"),
            ("POST /echo HTTP/1.1\r\nContent-Length: 99\r\n\r\n",    "413 Payload Too Large"),
            ("GET /fail HTTP/1.1\r\n\r\n",                            "500 Internal Server Error"),
        ];

        for (request, status) in cases {
            let resp = exchange(addr, request).await;
            assert!(resp.starts_with(&format!("HTTP/1.1 {status}\r\n")), "{resp}");
            assert!(resp.contains("Connection: close\r\n"), "{resp}");
        }

        let long = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(200));
        let resp = exchange(addr, &long).await;
        assert!(resp.starts_with("HTTP/1.1 431 "), "{resp}");
    }

    #[tokio::test]
    async fn build_requires_parts() {
        assert_eq!(
            Server::builder().app(app()).build().err(),
            Some(BuildError::MissingListener)
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(
            Server::builder().listener(listener).build().err(),
            Some(BuildError::MissingApp)
        );
    }
}
