//! The upload link.
//!
//! # Example
//!
//! ```ignore
//! use upload_link::{Operation, UploadFile, UploadLink};
//!
//! let link = UploadLink::builder(ReqwestFetch::new())
//!     .uri("http://localhost:4000/api")
//!     .header("authorization", "Bearer token")
//!     .build();
//!
//! let operation = Operation::new("mutation ($file: Upload!) { upload(file: $file) }")
//!     .with_variable("file", UploadFile::from_path("avatar.png")?);
//!
//! let result = link.execute(operation).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::body::{encode_body, operation_body};
use crate::config::{select_http_config, FetchOptions, Headers, HttpConfig};
use crate::error::LinkResult;
use crate::extract::{extract_and_replace, ExtractedFile};
use crate::fetch::{Fetch, HttpRequest};
use crate::observable::Observable;
use crate::operation::Operation;
use crate::response::{parse_and_check_response, FetchResult};

/// URI used when none is configured.
pub const DEFAULT_URI: &str = "/graphql";

/// Where requests are sent.
#[derive(Clone)]
pub enum UriSource {
    Static(String),
    /// Computed per operation.
    Dynamic(Arc<dyn Fn(&Operation) -> String + Send + Sync>),
}

impl UriSource {
    /// Resolves the URI for `operation`.
    pub fn resolve(&self, operation: &Operation) -> String {
        match self {
            Self::Static(uri) => uri.clone(),
            Self::Dynamic(f) => f(operation),
        }
    }
}

impl Default for UriSource {
    fn default() -> Self {
        Self::Static(DEFAULT_URI.to_string())
    }
}

impl fmt::Debug for UriSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(uri) => f.debug_tuple("Static").field(uri).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for UriSource {
    fn from(uri: &str) -> Self {
        Self::Static(uri.to_string())
    }
}

impl From<String> for UriSource {
    fn from(uri: String) -> Self {
        Self::Static(uri)
    }
}

/// A request ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub uri: String,
    pub request: HttpRequest,
    /// Files moved out of the variables, in field order.
    pub files: Vec<ExtractedFile>,
}

/// Builder for [`UploadLink`].
pub struct UploadLinkBuilder {
    uri: UriSource,
    fetch: Arc<dyn Fetch>,
    config: HttpConfig,
}

impl UploadLinkBuilder {
    /// Sets a static URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = UriSource::Static(uri.into());
        self
    }

    /// Computes the URI from each operation.
    pub fn uri_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Operation) -> String + Send + Sync + 'static,
    {
        self.uri = UriSource::Dynamic(Arc::new(f));
        self
    }

    /// Sets the transport options.
    pub fn fetch_options(mut self, options: FetchOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Sets the credentials mode.
    pub fn credentials(mut self, credentials: impl Into<String>) -> Self {
        self.config.credentials = Some(credentials.into());
        self
    }

    /// Adds a header. Names are stored lowercase.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.config = self.config.header(name, value);
        self
    }

    /// Adds several headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        for (name, value) in headers {
            self.config = self.config.header(name, value);
        }
        self
    }

    /// Sets whether operation `extensions` are sent.
    pub fn include_extensions(mut self, include: bool) -> Self {
        self.config.http.include_extensions = Some(include);
        self
    }

    /// Sets whether the query text is sent.
    pub fn include_query(mut self, include: bool) -> Self {
        self.config.http.include_query = Some(include);
        self
    }

    /// Builds the link.
    pub fn build(self) -> UploadLink {
        UploadLink {
            uri: self.uri,
            fetch: self.fetch,
            config: self.config,
        }
    }
}

/// Sends GraphQL operations over HTTP, as JSON or, when the variables
/// contain files, as a multipart form.
#[derive(Clone)]
pub struct UploadLink {
    uri: UriSource,
    fetch: Arc<dyn Fetch>,
    config: HttpConfig,
}

impl UploadLink {
    /// Starts building a link that sends through `fetch`.
    pub fn builder<F: Fetch + 'static>(fetch: F) -> UploadLinkBuilder {
        UploadLinkBuilder {
            uri: UriSource::default(),
            fetch: Arc::new(fetch),
            config: HttpConfig::new(),
        }
    }

    /// Creates a link to `uri` backed by `reqwest`.
    #[cfg(feature = "reqwest")]
    pub fn new(uri: impl Into<String>) -> Self {
        Self::builder(crate::reqwest_fetch::ReqwestFetch::new())
            .uri(uri)
            .build()
    }

    /// The link's configuration layer.
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Runs the synchronous part of the pipeline: URI selection, option
    /// merging, file extraction, placeholder rewriting and body encoding.
    pub fn prepare(&self, operation: &Operation) -> LinkResult<PreparedRequest> {
        let context = operation.context();
        let uri = context.uri().unwrap_or_else(|| self.uri.resolve(operation));
        let resolved = select_http_config(&self.config, &context.http_config());

        let mut body = operation_body(operation, &resolved);
        let files = extract_and_replace(&mut body);
        let mut headers = resolved.headers;
        let encoded = encode_body(&body, &files, &mut headers)?;

        debug!(
            uri = %uri,
            operation = operation.operation_name().unwrap_or_default(),
            files = files.len(),
            multipart = encoded.is_multipart(),
            "prepared request"
        );

        Ok(PreparedRequest {
            uri,
            request: HttpRequest {
                method: resolved.method,
                headers,
                credentials: resolved.credentials,
                body: encoded,
                signal: None,
                extra: resolved.extra,
            },
            files,
        })
    }

    /// Prepares `operation` and returns an observable that sends it when
    /// subscribed.
    ///
    /// On subscribe the request goes out with the subscription's abort
    /// signal; the raw response is written to the operation's context before
    /// anything is emitted.
    pub fn request(&self, operation: Operation) -> LinkResult<Observable> {
        let PreparedRequest { uri, request, .. } = self.prepare(&operation)?;
        let fetch = Arc::clone(&self.fetch);
        let context = operation.context().clone();
        let operation_name = operation.operation_name().map(str::to_owned);

        Ok(Observable::new(move |signal| async move {
            let mut request = request;
            request.signal = Some(signal);

            debug!(uri = %uri, method = %request.method, "dispatching request");
            let response = fetch.fetch(&uri, request).await?;
            debug!(status = %response.status, "received response");

            context.set_response(response.clone());
            parse_and_check_response(&response, operation_name.as_deref())
        }))
    }

    /// Sends `operation` and waits for its result.
    pub async fn execute(&self, operation: Operation) -> LinkResult<FetchResult> {
        self.request(operation)?.result().await
    }
}

impl fmt::Debug for UploadLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadLink")
            .field("uri", &self.uri)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
