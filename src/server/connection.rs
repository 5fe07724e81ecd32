use crate::{
    conductor::App,
    errors::ResponseError,
    limits::{ConnLimits, ReqLimits},
    request::TransportInput,
    Method, Response, Settings, StatusCode,
};
use memchr::{memchr, memmem};
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const READ_CHUNK: usize = 4096;

/// Why a connection ended without a normal response.
#[derive(Debug, Error)]
pub(crate) enum ConnError {
    #[error("connection closed before a request arrived")]
    Closed,

    #[error("socket operation timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The request is answered with this status instead of being dispatched.
    #[error("request rejected with status {}", .0.as_u16())]
    Reject(StatusCode),

    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Request line and headers of one HTTP/1.x request.
#[derive(Debug, Default)]
pub(crate) struct Head {
    pub(crate) method: String,
    pub(crate) target: String,
    pub(crate) host: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) content_length: usize,
}

/// Serves exactly one request per TCP connection.
pub(crate) struct HttpConnection {
    app: Arc<App>,
    settings: Arc<Settings>,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    buffer: Vec<u8>,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(app: Arc<App>, conn_limits: ConnLimits, req_limits: ReqLimits) -> Self {
        Self {
            settings: app.shared_settings(),
            app,
            conn_limits,
            req_limits,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    pub(crate) async fn run(&mut self, stream: &mut TcpStream, peer: SocketAddr) -> Result<(), ConnError> {
        self.buffer.clear();

        match self.serve(stream, peer).await {
            Err(ConnError::Reject(status)) => {
                tracing::debug!(%peer, status = status.as_u16(), "request rejected");
                let resp = error_response(&self.settings, status)?;
                write_bytes(stream, resp.buffer(), self.conn_limits.socket_write_timeout).await
            }
            other => other,
        }
    }

    async fn serve(&mut self, stream: &mut TcpStream, peer: SocketAddr) -> Result<(), ConnError> {
        let head_end = self.read_head(stream).await?;
        let head = parse_head(&self.buffer[..head_end], &self.req_limits)?;

        if head.content_length > self.req_limits.body_size {
            return Err(ConnError::Reject(StatusCode::PayloadTooLarge));
        }

        let body_start = head_end + 4;
        let body_end = body_start + head.content_length;
        while self.buffer.len() < body_end {
            if self.read_chunk(stream).await? == 0 {
                return Err(ConnError::Reject(StatusCode::BadRequest));
            }
        }

        let local = stream.local_addr()?;
        let input = TransportInput {
            url: request_url(&head, local)?,
            method: head.method,
            headers: head.headers,
            cookies: head.cookies,
            body: self.buffer[body_start..body_end].to_vec(),
            content_type: None,
            remote_addr: peer.ip(),
        };

        let (mut req, mut resp) = self.app.prepare(input).map_err(|err| {
            tracing::debug!(%peer, error = %err, "invalid request");
            ConnError::Reject(StatusCode::BadRequest)
        })?;
        resp.set("connection", "close")?;

        if let Err(err) = self.app.dispatch(&mut req, &mut resp) {
            tracing::warn!(%peer, path = req.path(), error = %err, "dispatch failed");
            return Err(ConnError::Reject(StatusCode::InternalServerError));
        }

        let bytes = match req.method() {
            Method::Head => resp.head(),
            _ => resp.buffer(),
        };
        write_bytes(stream, bytes, self.conn_limits.socket_write_timeout).await
    }

    /// Reads until the blank line ending the head; returns its offset.
    async fn read_head(&mut self, stream: &mut TcpStream) -> Result<usize, ConnError> {
        let mut searched = 0;

        loop {
            if let Some(pos) = memmem::find(&self.buffer[searched..], b"\r\n\r\n") {
                return match searched + pos > self.req_limits.head_size {
                    true => Err(ConnError::Reject(StatusCode::RequestHeaderFieldsTooLarge)),
                    false => Ok(searched + pos),
                };
            }
            if self.buffer.len() > self.req_limits.head_size {
                return Err(ConnError::Reject(StatusCode::RequestHeaderFieldsTooLarge));
            }

            searched = self.buffer.len().saturating_sub(3);
            if self.read_chunk(stream).await? == 0 {
                return Err(match self.buffer.is_empty() {
                    true => ConnError::Closed,
                    false => ConnError::Reject(StatusCode::BadRequest),
                });
            }
        }
    }

    async fn read_chunk(&mut self, stream: &mut TcpStream) -> Result<usize, ConnError> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = timeout(self.conn_limits.socket_read_timeout, stream.read(&mut chunk))
            .await
            .map_err(|_| ConnError::Timeout)??;

        self.buffer.extend_from_slice(&chunk[..read]);
        Ok(read)
    }
}

/// Parses the request line and headers.
pub(crate) fn parse_head(src: &[u8], limits: &ReqLimits) -> Result<Head, ConnError> {
    const BAD: ConnError = ConnError::Reject(StatusCode::BadRequest);

    let text = simdutf8::basic::from_utf8(src).map_err(|_| BAD)?;
    let mut lines = text.split("\r\n");

    let mut parts = lines.next().unwrap_or_default().split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(BAD);
    };
    if method.is_empty() || target.is_empty() || !version.starts_with("HTTP/1.") {
        return Err(BAD);
    }

    let mut head = Head {
        method: method.to_string(),
        target: target.to_string(),
        ..Head::default()
    };

    for (index, line) in lines.enumerate() {
        if index >= limits.header_count {
            return Err(ConnError::Reject(StatusCode::RequestHeaderFieldsTooLarge));
        }

        let colon = memchr(b':', line.as_bytes()).ok_or(BAD)?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.is_empty() {
            return Err(BAD);
        }

        match name.to_ascii_lowercase().as_str() {
            "host" if value.is_empty() => head.host = None,
            "host" if is_authority(value) => head.host = Some(value.to_string()),
            "host" => return Err(BAD),
            "cookie" => head.cookies.extend(value.split(';').filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })),
            "content-length" => head.content_length = value.parse().map_err(|_| BAD)?,
            "transfer-encoding" => return Err(ConnError::Reject(StatusCode::NotImplemented)),
            _ => {}
        }
        head.headers.push((name.to_string(), value.to_string()));
    }

    Ok(head)
}

/// `Host` is spliced into the request URL, so it must be a bare
/// `host[:port]` with nothing that starts a path, query or userinfo.
fn is_authority(host: &str) -> bool {
    !host.bytes().any(|b| {
        matches!(b, b'/' | b'?' | b'#' | b'@' | b'\\')
            || b.is_ascii_whitespace()
            || b.is_ascii_control()
    })
}

/// Absolute URL of the request: origin-form targets are resolved against the
/// `Host` header, falling back to the local socket address.
fn request_url(head: &Head, local: SocketAddr) -> Result<String, ConnError> {
    match head.target.as_bytes().first() {
        Some(b'/') => Ok(match &head.host {
            Some(host) => format!("http://{host}{}", head.target),
            None => format!("http://{local}{}", head.target),
        }),
        _ if head.target.starts_with("http://") || head.target.starts_with("https://") => {
            Ok(head.target.clone())
        }
        _ => Err(ConnError::Reject(StatusCode::BadRequest)),
    }
}

/// Finalized response for a request that never reaches the router.
pub(crate) fn error_response(
    settings: &Arc<Settings>,
    status: StatusCode,
) -> Result<Response, ResponseError> {
    let mut resp = Response::new(Arc::clone(settings));
    resp.status(status)?.set("connection", "close")?.send(())?;
    Ok(resp)
}

#[inline]
pub(crate) async fn write_bytes(
    stream: &mut TcpStream,
    bytes: &[u8],
    limit: Duration,
) -> Result<(), ConnError> {
    timeout(limit, stream.write_all(bytes))
        .await
        .map_err(|_| ConnError::Timeout)??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Head, StatusCode> {
        parse_head(src.as_bytes(), &ReqLimits::default()).map_err(|err| match err {
            ConnError::Reject(status) => status,
            other => panic!("unexpected {other:?}"),
        })
    }

    #[test]
    fn head() {
        let head = parse(
            "POST /users?page=2 HTTP/1.1\r\n\
             Host: example.com:8080\r\n\
             Content-Length: 8\r\n\
             Cookie: sid=abc; theme = dark;broken\r\n\
             X-Empty:",
        )
        .unwrap();

        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "/users?page=2");
        assert_eq!(head.host.as_deref(), Some("example.com:8080"));
        assert_eq!(head.content_length, 8);
        let cookies: Vec<_> = head
            .cookies
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        assert_eq!(cookies, [("sid", "abc"), ("theme", "dark")]);
        assert_eq!(head.headers.len(), 4);
        assert_eq!(head.headers[3], ("X-Empty".into(), "".into()));

        let local: SocketAddr = "127.0.0.1:80".parse().unwrap();
        assert_eq!(
            request_url(&head, local).unwrap(),
            "http://example.com:8080/users?page=2"
        );
    }

    #[test]
    fn url_without_host() {
        let head = parse("GET / HTTP/1.0").unwrap();
        let local: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        assert_eq!(request_url(&head, local).unwrap(), "http://127.0.0.1:8080/");

        let head = parse("GET /public HTTP/1.1\r\nHost: ").unwrap();
        assert_eq!(request_url(&head, local).unwrap(), "http://127.0.0.1:8080/public");

        let head = parse("GET http://other.test/a HTTP/1.1").unwrap();
        assert_eq!(request_url(&head, local).unwrap(), "http://other.test/a");

        let head = parse("OPTIONS * HTTP/1.1").unwrap();
        assert!(request_url(&head, local).is_err());
    }

    #[test]
    fn malformed() {
        #[rustfmt::skip]
        let cases = [
            ("GET /",                                   StatusCode::BadRequest),
            ("GET / HTTP/2",                            StatusCode::BadRequest),
            ("GET  / HTTP/1.1",                         StatusCode::BadRequest),
            ("GET / HTTP/1.1 extra",                    StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nno colon",              StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\n: value",               StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nContent-Length: x",     StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nHost: a.test/admin?x=",  StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nHost: a.test#frag",      StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nHost: user@a.test",      StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nHost: a.test\\b",        StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nHost: a test",           StatusCode::BadRequest),
            ("GET / HTTP/1.1\r\nTransfer-Encoding: chunked",
                                                        StatusCode::NotImplemented),
        ];

        for (src, expected) in cases {
            assert_eq!(parse(src).err(), Some(expected), "{src:?}");
        }

        assert_eq!(
            parse_head(b"GET /\xff HTTP/1.1", &ReqLimits::default())
                .err()
                .map(|err| err.to_string()),
            Some("request rejected with status 400".into())
        );
    }

    #[test]
    fn header_count_limit() {
        let limits = ReqLimits {
            header_count: 2,
            ..ReqLimits::default()
        };

        assert!(parse_head(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2", &limits).is_ok());
        assert!(matches!(
            parse_head(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3", &limits),
            Err(ConnError::Reject(StatusCode::RequestHeaderFieldsTooLarge))
        ));
    }

    #[test]
    fn canned_error_response() {
        let resp = error_response(
            &Arc::new(Settings::default()),
            StatusCode::ServiceUnavailable,
        )
        .unwrap();

        assert!(resp.is_locked());
        assert!(resp.head().starts_with(b"HTTP/1.1 503 Service Unavailable\r\n"));
        assert_eq!(resp.get("connection"), Some("close"));
        assert_eq!(resp.body(), b"Service Unavailable");
    }
}
