//! Operation descriptor and its per-call context.
//!
//! The [`Operation`] is immutable once built. Its [`OperationContext`] is a
//! shared, lockable bag: callers put per-call HTTP overrides in it, and the
//! link writes the raw HTTP response back into it.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::config::{FetchOptions, Headers, HttpConfig, HttpFlags};
use crate::fetch::HttpResponse;
use crate::value::UploadValue;

/// Contents of an operation's context.
///
/// The link reads `uri`, `http`, `fetch_options`, `credentials` and
/// `headers`, and writes `response`.
#[derive(Default)]
pub struct ContextData {
    /// Overrides the link URI for this call.
    pub uri: Option<String>,
    pub http: HttpFlags,
    pub fetch_options: FetchOptions,
    pub credentials: Option<String>,
    pub headers: Headers,
    /// Raw HTTP response of the last dispatched call.
    pub response: Option<HttpResponse>,
}

impl ContextData {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URI override.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Adds a header override. Names are stored lowercase.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the credentials override.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Sets the transport option overrides.
    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    /// Sets the body flag overrides.
    pub fn with_http(mut self, http: HttpFlags) -> Self {
        self.http = http;
        self
    }

    /// The context's configuration layer.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            http: self.http.clone(),
            options: self.fetch_options.clone(),
            credentials: self.credentials.clone(),
            headers: self.headers.clone(),
        }
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData")
            .field("uri", &self.uri)
            .field("http", &self.http)
            .field("fetch_options", &self.fetch_options)
            .field("credentials", &self.credentials)
            .field("headers", &self.headers)
            .field("response", &self.response.as_ref().map(|r| r.status))
            .finish()
    }
}

/// Shared handle to an operation's context.
#[derive(Clone, Default)]
pub struct OperationContext(Arc<RwLock<ContextData>>);

impl OperationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the context.
    pub fn read<R>(&self, f: impl FnOnce(&ContextData) -> R) -> R {
        f(&self.0.read())
    }

    /// Mutates the context.
    pub fn update<R>(&self, f: impl FnOnce(&mut ContextData) -> R) -> R {
        f(&mut self.0.write())
    }

    /// The URI override, if any.
    pub fn uri(&self) -> Option<String> {
        self.read(|data| data.uri.clone())
    }

    /// The context's configuration layer.
    pub fn http_config(&self) -> HttpConfig {
        self.read(ContextData::http_config)
    }

    /// The HTTP response of the last dispatched call.
    pub fn response(&self) -> Option<HttpResponse> {
        self.read(|data| data.response.clone())
    }

    pub(crate) fn set_response(&self, response: HttpResponse) {
        self.update(|data| data.response = Some(response));
    }
}

impl From<ContextData> for OperationContext {
    fn from(data: ContextData) -> Self {
        Self(Arc::new(RwLock::new(data)))
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationContext").field(&*self.0.read()).finish()
    }
}

/// A GraphQL operation to transport.
#[derive(Debug, Clone)]
pub struct Operation {
    query: String,
    operation_name: Option<String>,
    variables: UploadValue,
    extensions: Map<String, Value>,
    context: OperationContext,
}

impl Operation {
    /// Creates an operation with empty variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: UploadValue::object(),
            extensions: Map::new(),
            context: OperationContext::new(),
        }
    }

    /// Sets the operation name.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Replaces the variables.
    pub fn with_variables(mut self, variables: impl Into<UploadValue>) -> Self {
        self.variables = variables.into();
        self
    }

    /// Sets one variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<UploadValue>) -> Self {
        if !matches!(self.variables, UploadValue::Object(_)) {
            self.variables = UploadValue::object();
        }
        self.variables.insert(name, value);
        self
    }

    /// Sets one extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Uses a fresh context with the given contents.
    pub fn with_context(mut self, data: ContextData) -> Self {
        self.context = OperationContext::from(data);
        self
    }

    /// Uses an existing, possibly shared, context.
    pub fn with_shared_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn variables(&self) -> &UploadValue {
        &self.variables
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        &self.extensions
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }
}
