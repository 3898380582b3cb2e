//! Development server with live reload.
//!
//! ```text
//! GET /__livereload   Server-Sent Events: `reload` (full page) or `css`
//! GET /*              build directory via tower-http ServeDir;
//!                     text/html responses get the client script injected
//! ```
//!
//! The client script opens an `EventSource` on `/__livereload`. A `css`
//! event re-requests every stylesheet with a cache-busting query; `reload`
//! reloads the page.

use crate::watch::ReloadKind;
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Path of the live-reload event stream.
pub const LIVERELOAD_PATH: &str = "/__livereload";

const CLIENT_SCRIPT: &str = r#"<script>
(function () {
  var source = new EventSource("/__livereload");
  source.addEventListener("reload", function () { location.reload(); });
  source.addEventListener("css", function () {
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
      var url = new URL(link.href);
      url.searchParams.set("livereload", Date.now());
      link.href = url.toString();
    });
  });
})();
</script>"#;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("no free port in {host}:{first}..{last}")]
    NoFreePort { host: String, first: u16, last: u16 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveEvent {
    Reload(ReloadKind),
    Close,
}

/// Handle for pushing reload events to every connected browser.
#[derive(Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<LiveEvent>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Tell clients to reload. Returns how many are connected.
    pub fn notify(&self, kind: ReloadKind) -> usize {
        self.tx.send(LiveEvent::Reload(kind)).unwrap_or(0)
    }

    /// End every open event stream so the server can shut down.
    pub fn close(&self) {
        self.tx.send(LiveEvent::Close).ok();
    }

    fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }
}

/// Insert the client script before the last `</body>`, or append it.
///
/// Works on raw bytes so pages in any ASCII-compatible encoding pass
/// through unchanged.
pub fn inject_script(html: &[u8]) -> Vec<u8> {
    const BODY_CLOSE: &[u8] = b"</body>";
    let pos = html
        .windows(BODY_CLOSE.len())
        .rposition(|window| window.eq_ignore_ascii_case(BODY_CLOSE))
        .unwrap_or(html.len());
    let mut out = Vec::with_capacity(html.len() + CLIENT_SCRIPT.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(CLIENT_SCRIPT.as_bytes());
    out.extend_from_slice(&html[pos..]);
    out
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}

async fn inject_livereload(request: Request, next: Next) -> Response {
    let is_get = request.method() == Method::GET;
    let response = next.run(request).await;
    if !is_get || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let html = inject_script(&bytes);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

async fn livereload_events(
    State(live): State<LiveReload>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(live.subscribe()).map_while(|message| {
        let kind = match message {
            Ok(LiveEvent::Reload(kind)) => kind,
            Ok(LiveEvent::Close) => return None,
            // Missed events; a full reload covers whatever they were.
            Err(_) => ReloadKind::Full,
        };
        Some(Ok(Event::default()
            .event(kind.event_name())
            .data(kind.event_name())))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Router serving `build_dir` with live reload.
pub fn router(build_dir: &Path, live: LiveReload, cors: bool) -> Router {
    let app = Router::new()
        .route(LIVERELOAD_PATH, get(livereload_events))
        .fallback_service(ServeDir::new(build_dir))
        .layer(middleware::from_fn(inject_livereload))
        .with_state(live);
    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Bind `host:port`, moving up one port at a time while the address is in
/// use, for at most `attempts` ports.
pub async fn bind(host: &str, port: u16, attempts: u16) -> Result<TcpListener, ServerError> {
    let mut last = port;
    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        last = candidate;
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port = candidate, "port in use, trying next");
            }
            Err(source) => {
                return Err(ServerError::Bind {
                    addr: format!("{host}:{candidate}"),
                    source,
                });
            }
        }
    }
    Err(ServerError::NoFreePort {
        host: host.to_string(),
        first: port,
        last,
    })
}

/// Serve until `shutdown` resolves and open connections finish.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("index.html"),
            "<html><body><h1>Shop</h1></body></html>",
        )
        .unwrap();
        std::fs::create_dir_all(tmp.path().join("css")).unwrap();
        std::fs::write(tmp.path().join("css/styles.min.css"), ".a{color:red}").unwrap();
        tmp
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn inject_before_body_close() {
        let out = inject_script(b"<html><BODY><p>x</p></BODY></html>");
        let out = String::from_utf8(out).unwrap();
        let script = out.find("<script>").unwrap();
        assert!(script < out.find("</BODY>").unwrap());
        assert!(out.ends_with("</BODY></html>"));
    }

    #[test]
    fn inject_appends_without_body() {
        let out = String::from_utf8(inject_script(b"<p>fragment</p>")).unwrap();
        assert!(out.starts_with("<p>fragment</p><script>"));
    }

    /// `<p>Привет</p>` in windows-1251.
    const CP1251_PAGE: &[u8] = b"<html><body><p>\xcf\xf0\xe8\xe2\xe5\xf2</p></body></html>";

    #[test]
    fn inject_keeps_non_utf8_bytes() {
        let out = inject_script(CP1251_PAGE);
        let prefix = b"<html><body><p>\xcf\xf0\xe8\xe2\xe5\xf2</p>";
        assert!(out.starts_with(prefix));
        assert!(out[prefix.len()..].starts_with(b"<script>"));
        assert!(out.ends_with(b"</body></html>"));
        assert_eq!(out.len(), CP1251_PAGE.len() + CLIENT_SCRIPT.len());
    }

    #[tokio::test]
    async fn non_utf8_page_is_served_byte_exact() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("legacy.html"), CP1251_PAGE).unwrap();
        let app = router(tmp.path(), LiveReload::new(), false);

        let response = app.oneshot(get_request("/legacy.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        assert_eq!(bytes.to_vec(), inject_script(CP1251_PAGE));
        assert!(!bytes.windows(3).any(|w| w == "\u{FFFD}".as_bytes()));
    }

    #[tokio::test]
    async fn html_gets_client_script() {
        let tmp = site();
        let app = router(tmp.path(), LiveReload::new(), true);
        let response = app.oneshot(get_request("/index.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("new EventSource(\"/__livereload\")"));
        assert!(body.ends_with("</body></html>"));
    }

    #[tokio::test]
    async fn directory_index_gets_client_script() {
        let tmp = site();
        let app = router(tmp.path(), LiveReload::new(), true);
        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("EventSource"));
    }

    #[tokio::test]
    async fn other_files_are_untouched() {
        let tmp = site();
        let app = router(tmp.path(), LiveReload::new(), true);
        let response = app
            .oneshot(get_request("/css/styles.min.css"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, ".a{color:red}");
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let tmp = site();
        let app = router(tmp.path(), LiveReload::new(), true);
        let response = app.oneshot(get_request("/nope.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_header_follows_config() {
        let tmp = site();
        let request = || {
            axum::http::Request::builder()
                .uri("/css/styles.min.css")
                .header(header::ORIGIN, "http://example.test")
                .body(Body::empty())
                .unwrap()
        };

        let open = router(tmp.path(), LiveReload::new(), true)
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(
            open.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );

        let closed = router(tmp.path(), LiveReload::new(), false)
            .oneshot(request())
            .await
            .unwrap();
        assert!(
            closed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn event_stream_delivers_reload_then_closes() {
        let tmp = site();
        let live = LiveReload::new();
        let app = router(tmp.path(), live.clone(), true);

        let response = app.oneshot(get_request(LIVERELOAD_PATH)).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        assert_eq!(live.notify(ReloadKind::Css), 1);
        live.close();

        let body = tokio::time::timeout(Duration::from_secs(5), body_string(response))
            .await
            .unwrap();
        assert!(body.contains("event: css\n"));
        assert!(body.contains("data: css\n"));
    }

    #[test]
    fn notify_without_clients_reports_zero() {
        assert_eq!(LiveReload::new().notify(ReloadKind::Full), 0);
    }

    #[tokio::test]
    async fn bind_skips_taken_port() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = bind("127.0.0.1", port, 1).await;
        assert!(matches!(result, Err(ServerError::NoFreePort { .. })));

        if port < u16::MAX - 20 {
            let listener = bind("127.0.0.1", port, 20).await.unwrap();
            assert_ne!(listener.local_addr().unwrap().port(), port);
        }
    }
}
