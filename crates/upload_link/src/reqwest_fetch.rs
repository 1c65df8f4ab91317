//! [`Fetch`] over `reqwest`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::trace;

use crate::body::{MultipartForm, PartValue, RequestBody};
use crate::error::{ErrorCode, LinkError, LinkResult, ResultExt};
use crate::fetch::{Fetch, HttpRequest, HttpResponse};

/// Key in [`FetchOptions::extra`](crate::config::FetchOptions) holding a
/// request timeout in milliseconds.
pub const TIMEOUT_MS_OPTION: &str = "timeout_ms";

/// Sends requests with a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Creates a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_form(form: MultipartForm) -> LinkResult<Form> {
    let mut out = Form::new();
    for part in form.into_parts() {
        out = match part.value {
            PartValue::Text(text) => out.text(part.name, text),
            PartValue::File(file) => {
                let mut file_part =
                    Part::bytes(file.bytes().to_vec()).file_name(file.name().to_string());
                if let Some(content_type) = file.content_type() {
                    file_part = file_part
                        .mime_str(content_type)
                        .map_link_err_with(ErrorCode::InvalidRequest, "invalid content type")?;
                }
                out.part(part.name, file_part)
            }
        };
    }
    Ok(out)
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, uri: &str, request: HttpRequest) -> LinkResult<HttpResponse> {
        let HttpRequest {
            method,
            headers,
            credentials,
            body,
            signal,
            extra,
        } = request;

        if let Some(credentials) = credentials {
            trace!(credentials = %credentials, "credentials mode has no effect on this transport");
        }

        let mut builder = self.client.request(method, uri);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ms) = extra.get(TIMEOUT_MS_OPTION).and_then(serde_json::Value::as_u64) {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder = match body {
            RequestBody::Json(text) => builder.body(text),
            RequestBody::Multipart(form) => builder.multipart(to_form(form)?),
        };

        let send = async move {
            let response = builder
                .send()
                .await
                .map_link_err_with(ErrorCode::NetworkError, "request failed")?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_link_err_with(ErrorCode::NetworkError, "failed to read response body")?;
            trace!(status = %status, bytes = body.len(), "response body read");
            Ok::<_, LinkError>(HttpResponse {
                status,
                headers,
                body,
            })
        };

        match signal {
            Some(signal) => signal.race(send).await,
            None => send.await,
        }
    }
}
