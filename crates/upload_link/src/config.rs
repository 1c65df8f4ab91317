//! Layered HTTP configuration.
//!
//! A request's HTTP settings come from three layers, merged field by field
//! in increasing precedence: built-in fallback, link configuration and the
//! operation's context. An unset field (`None`, or an absent header) never
//! overrides a lower layer.

use http::Method;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Header map with lowercase names, in insertion order.
pub type Headers = IndexMap<String, String>;

/// Flags controlling which fields go into the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpFlags {
    /// Whether to send the query text.
    pub include_query: Option<bool>,
    /// Whether to send the operation's `extensions`.
    pub include_extensions: Option<bool>,
}

/// Transport options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// HTTP method.
    pub method: Option<Method>,
    /// Options forwarded untouched to the [`Fetch`](crate::fetch::Fetch)
    /// implementation; merged key by key.
    pub extra: Map<String, Value>,
}

/// One configuration layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpConfig {
    pub http: HttpFlags,
    pub options: FetchOptions,
    pub credentials: Option<String>,
    pub headers: Headers,
}

impl HttpConfig {
    /// Creates an empty layer that overrides nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in fallback layer.
    pub fn fallback() -> Self {
        Self::new()
            .include_query(true)
            .include_extensions(false)
            .header("accept", "*/*")
            .header("content-type", "application/json")
            .method(Method::POST)
    }

    /// Sets a header. Names are stored lowercase.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the credentials mode.
    pub fn credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.options.method = Some(method);
        self
    }

    /// Sets a pass-through transport option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.extra.insert(key.into(), value.into());
        self
    }

    /// Sets whether the query text is sent.
    pub fn include_query(mut self, include: bool) -> Self {
        self.http.include_query = Some(include);
        self
    }

    /// Sets whether `extensions` are sent.
    pub fn include_extensions(mut self, include: bool) -> Self {
        self.http.include_extensions = Some(include);
        self
    }
}

/// Fully merged configuration for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHttpConfig {
    pub include_query: bool,
    pub include_extensions: bool,
    pub method: Method,
    pub credentials: Option<String>,
    pub headers: Headers,
    pub extra: Map<String, Value>,
}

impl Default for ResolvedHttpConfig {
    fn default() -> Self {
        Self {
            include_query: true,
            include_extensions: false,
            method: Method::POST,
            credentials: None,
            headers: Headers::new(),
            extra: Map::new(),
        }
    }
}

impl ResolvedHttpConfig {
    /// Applies one layer on top of the current values.
    pub fn apply(&mut self, layer: &HttpConfig) {
        if let Some(include) = layer.http.include_query {
            self.include_query = include;
        }
        if let Some(include) = layer.http.include_extensions {
            self.include_extensions = include;
        }
        if let Some(ref method) = layer.options.method {
            self.method = method.clone();
        }
        if let Some(ref credentials) = layer.credentials {
            self.credentials = Some(credentials.clone());
        }
        for (name, value) in &layer.headers {
            self.headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        for (key, value) in &layer.options.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Merges layers in the given order; later layers win.
pub fn merge_layers<'a, I>(layers: I) -> ResolvedHttpConfig
where
    I: IntoIterator<Item = &'a HttpConfig>,
{
    let mut resolved = ResolvedHttpConfig::default();
    for layer in layers {
        resolved.apply(layer);
    }
    resolved
}

/// Merges the fallback, link and context layers.
pub fn select_http_config(link: &HttpConfig, context: &HttpConfig) -> ResolvedHttpConfig {
    merge_layers([&HttpConfig::fallback(), link, context])
}
