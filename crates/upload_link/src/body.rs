//! Request body selection and encoding.
//!
//! Without files the body is a JSON document. With files it becomes a
//! multipart form in the single-level layout Absinthe expects: `query`,
//! `operationName` and `variables` text fields, then one part per file named
//! by its placeholder index. There is no `operations`/`map` field pair.

use std::fmt;
use tracing::debug;

use crate::config::{Headers, ResolvedHttpConfig};
use crate::error::{ErrorCode, LinkResult, ResultExt};
use crate::extract::ExtractedFile;
use crate::operation::Operation;
use crate::value::{PathSegment, Upload, UploadValue};

/// Value of one multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    File(Upload),
}

/// One multipart field.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

/// A multipart form, in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Appends a file field. The part's filename is the file's own name.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, file: Upload) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File(file),
        });
        self
    }

    /// Returns the fields in order.
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Consumes the form, returning its fields.
    pub fn into_parts(self) -> Vec<FormPart> {
        self.parts
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the form has no fields.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the first text field with this name.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match &part.value {
            PartValue::Text(text) if part.name == name => Some(text.as_str()),
            _ => None,
        })
    }

    /// Returns the first file field with this name.
    pub fn get_file(&self, name: &str) -> Option<&Upload> {
        self.parts.iter().find_map(|part| match &part.value {
            PartValue::File(file) if part.name == name => Some(file),
            _ => None,
        })
    }
}

impl fmt::Display for MultipartForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match &part.value {
                PartValue::Text(text) => writeln!(f, "{}: {}", part.name, text)?,
                PartValue::File(file) => writeln!(
                    f,
                    "{}: <file {} ({} bytes)>",
                    part.name,
                    file.name(),
                    file.bytes().len()
                )?,
            }
        }
        Ok(())
    }
}

/// Encoded HTTP body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(String),
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Returns true for a multipart body.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// Builds the body tree `{query, operationName, variables, extensions}` for
/// `operation`, honoring the include flags.
///
/// `operationName` is left out when the operation has none. The variables
/// are cloned so the operation itself is never rewritten.
pub fn operation_body(operation: &Operation, config: &ResolvedHttpConfig) -> UploadValue {
    let mut body = UploadValue::object();
    if config.include_query {
        body.insert("query", operation.query());
    }
    if let Some(name) = operation.operation_name() {
        body.insert("operationName", name);
    }
    body.insert("variables", operation.variables().clone());
    if config.include_extensions {
        body.insert(
            "extensions",
            UploadValue::from(serde_json::Value::Object(operation.extensions().clone())),
        );
    }
    body
}

/// Encodes a rewritten body.
///
/// With no files the whole body is serialized as JSON and `headers` are left
/// alone. With files, `content-type` is removed from `headers` so the
/// transport can set the multipart boundary, and the form carries `query`,
/// `operationName` (empty when absent), `variables` as JSON, `extensions` as
/// JSON when the body has them, then one part per file.
pub fn encode_body(
    body: &UploadValue,
    files: &[ExtractedFile],
    headers: &mut Headers,
) -> LinkResult<RequestBody> {
    if files.is_empty() {
        let payload = serde_json::to_string(body)
            .map_link_err_with(ErrorCode::SerializeError, "Payload is not serializable")?;
        debug!(bytes = payload.len(), "encoded JSON body");
        return Ok(RequestBody::Json(payload));
    }

    headers.shift_remove("content-type");

    let field = |name: &str| body.get_path(&[PathSegment::from(name)]);
    let text = |name: &str| field(name).and_then(UploadValue::as_str).unwrap_or_default().to_string();
    let json = |name: &str| -> LinkResult<String> {
        serde_json::to_string(field(name).unwrap_or(&UploadValue::Null))
            .map_link_err_with(ErrorCode::SerializeError, format!("{name} are not serializable"))
    };

    let mut form = MultipartForm::new()
        .text("query", text("query"))
        .text("operationName", text("operationName"))
        .text("variables", json("variables")?);
    if field("extensions").is_some() {
        form = form.text("extensions", json("extensions")?);
    }
    for file in files {
        form = form.file(file.index.clone(), file.file.clone());
    }

    debug!(files = files.len(), fields = form.len(), "encoded multipart body");
    Ok(RequestBody::Multipart(form))
}
