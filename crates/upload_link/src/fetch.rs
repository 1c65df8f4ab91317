//! Transport seam.
//!
//! The link never talks to the network itself. It builds an [`HttpRequest`]
//! and hands it to an injected [`Fetch`] implementation together with an
//! [`AbortSignal`]. A transport that observes the signal must stop and
//! return [`LinkError::aborted`].

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::body::RequestBody;
use crate::config::Headers;
use crate::error::{LinkError, LinkResult};

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Lowercase header names. No `content-type` for multipart bodies.
    pub headers: Headers,
    /// Credentials mode, for transports that have one.
    pub credentials: Option<String>,
    pub body: RequestBody,
    /// Fires when the subscriber cancels.
    pub signal: Option<AbortSignal>,
    /// Pass-through options from [`FetchOptions::extra`](crate::config::FetchOptions).
    pub extra: Map<String, Value>,
}

impl HttpRequest {
    /// Returns a header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A received HTTP response, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response without headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a JSON response.
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status, value.to_string()).with_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The HTTP primitive the link sends requests through.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Sends `request` to `uri`.
    ///
    /// Any response, including non-2xx, is `Ok`. Failing to get a response is
    /// a network error; being cancelled through `request.signal` is
    /// [`LinkError::aborted`].
    async fn fetch(&self, uri: &str, request: HttpRequest) -> LinkResult<HttpResponse>;
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    async fn fetch(&self, uri: &str, request: HttpRequest) -> LinkResult<HttpResponse> {
        (**self).fetch(uri, request).await
    }
}

/// A [`Fetch`] backed by a closure.
pub struct FnFetch<F>(F);

/// Wraps a closure as a [`Fetch`].
///
/// ```ignore
/// let fetch = fetch_fn(|uri, request| async move {
///     Ok(HttpResponse::json(StatusCode::OK, &json!({"data": {}})))
/// });
/// ```
pub fn fetch_fn<F, Fut>(f: F) -> FnFetch<F>
where
    F: Fn(String, HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult<HttpResponse>> + Send,
{
    FnFetch(f)
}

#[async_trait]
impl<F, Fut> Fetch for FnFetch<F>
where
    F: Fn(String, HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult<HttpResponse>> + Send,
{
    async fn fetch(&self, uri: &str, request: HttpRequest) -> LinkResult<HttpResponse> {
        (self.0)(uri.to_string(), request).await
    }
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Owner side of a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    state: Arc<AbortState>,
}

impl AbortController {
    /// Creates a controller that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: Arc::clone(&self.state),
        }
    }

    /// Fires the signal. Returns false if it had already fired.
    pub fn abort(&self) -> bool {
        if self.state.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.notify.notify_waiters();
        true
    }
}

/// Observer side of a cancellation token.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Returns true once the controller has fired.
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    /// Resolves when the controller fires.
    pub async fn aborted(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent abort is not missed.
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    /// Runs `future` unless the signal fires first, in which case the future
    /// is dropped and [`LinkError::aborted`] is returned.
    pub async fn race<T, F>(&self, future: F) -> LinkResult<T>
    where
        F: Future<Output = LinkResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.aborted() => Err(LinkError::aborted()),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_fires_once() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        assert!(controller.abort());
        assert!(!controller.abort());
        assert!(signal.is_aborted());
        signal.aborted().await;
    }

    #[tokio::test]
    async fn test_race_returns_abort_error() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let pending = tokio::spawn(async move {
            signal
                .race(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, LinkError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort();

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_abort());
    }

    #[tokio::test]
    async fn test_race_passes_result_through() {
        let signal = AbortController::new().signal();
        let value = signal.race(async { Ok::<_, LinkError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_fn_fetch() {
        let fetch = fetch_fn(|uri, request| async move {
            assert_eq!(uri, "/graphql");
            assert_eq!(request.method, Method::POST);
            Ok(HttpResponse::new(StatusCode::OK, "ok"))
        });
        let request = HttpRequest {
            method: Method::POST,
            headers: Headers::new(),
            credentials: None,
            body: RequestBody::Json("{}".into()),
            signal: None,
            extra: Map::new(),
        };

        let response = fetch.fetch("/graphql", request).await.unwrap();
        assert_eq!(response.text(), "ok");
    }
}
