//! Variable trees that may carry files.
//!
//! GraphQL variables are JSON-like, except that any leaf may be a file. The
//! [`UploadValue`] tagged union models that directly, and the file-like
//! capability is the explicit [`FileLike`] trait rather than a structural
//! guess about the value's shape.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ErrorCode, LinkError, LinkResult, ResultExt};

/// A binary payload with a file name, eligible for multipart upload.
pub trait FileLike: fmt::Debug + Send + Sync {
    /// File name sent as the multipart part's `filename`.
    fn name(&self) -> &str;

    /// File contents.
    fn bytes(&self) -> Bytes;

    /// Optional MIME type of the contents.
    fn content_type(&self) -> Option<&str> {
        None
    }
}

/// Shared handle to a file value.
///
/// Two handles are equal when they point at the same file, which mirrors
/// identity semantics of file objects in a variables tree.
#[derive(Clone)]
pub struct Upload(Arc<dyn FileLike>);

impl Upload {
    /// Wraps a file-like value.
    pub fn new<F: FileLike + 'static>(file: F) -> Self {
        Self(Arc::new(file))
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Returns the file contents.
    pub fn bytes(&self) -> Bytes {
        self.0.bytes()
    }

    /// Returns the MIME type, if known.
    pub fn content_type(&self) -> Option<&str> {
        self.0.content_type()
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Upload").field(&self.0).finish()
    }
}

impl PartialEq for Upload {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

/// An in-memory file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    name: String,
    content_type: Option<String>,
    data: Bytes,
}

impl UploadFile {
    /// Creates a file from a name and its contents.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Sets the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reads a file from disk, naming it after the last path component.
    pub fn from_path(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_link_err_with(ErrorCode::InvalidRequest, format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                LinkError::invalid_request(format!("{} has no file name", path.display()))
            })?;
        Ok(Self::new(name, data))
    }
}

impl FileLike for UploadFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Field(s)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Location of a value inside a request body, rendered as a dot path
/// (`variables.files.0`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilePath(Vec<PathSegment>);

impl FilePath {
    /// Creates an empty (root) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PathSegment>> for FilePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for FilePath {
    type Err = LinkError;

    /// Parses a dot path. All-digit segments address list items.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        s.split('.')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(LinkError::invalid_request(format!(
                        "empty segment in path '{s}'"
                    )));
                }
                Ok(match segment.parse::<usize>() {
                    Ok(index) if segment.bytes().all(|b| b.is_ascii_digit()) => {
                        PathSegment::Index(index)
                    }
                    _ => PathSegment::Field(segment.to_string()),
                })
            })
            .collect::<LinkResult<Vec<_>>>()
            .map(Self)
    }
}

/// Most nulls [`UploadValue::set_path`] will insert to reach a list index.
pub const MAX_LIST_PADDING: usize = 1024;

/// A JSON-like value whose leaves may be files.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UploadValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<UploadValue>),
    Object(IndexMap<String, UploadValue>),
    File(Upload),
}

impl UploadValue {
    /// Creates an empty object.
    pub fn object() -> Self {
        Self::Object(IndexMap::new())
    }

    /// Returns true if this value is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Returns the file handle, if this value is a file.
    pub fn as_file(&self) -> Option<&Upload> {
        match self {
            Self::File(upload) => Some(upload),
            _ => None,
        }
    }

    /// Returns the string, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Inserts a key into an object value. Non-objects are left untouched.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<UploadValue>) {
        if let Self::Object(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// Looks up the value at `path`.
    pub fn get_path(&self, path: &[PathSegment]) -> Option<&UploadValue> {
        path.iter().try_fold(self, |node, segment| match (node, segment) {
            (Self::Object(map), PathSegment::Field(key)) => map.get(key),
            (Self::Object(map), PathSegment::Index(i)) => map.get(&i.to_string()),
            (Self::List(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        })
    }

    /// Mutable lookup of the value at `path`.
    pub fn get_path_mut(&mut self, path: &[PathSegment]) -> Option<&mut UploadValue> {
        let mut node = self;
        for segment in path {
            node = match (node, segment) {
                (Self::Object(map), PathSegment::Field(key)) => map.get_mut(key)?,
                (Self::Object(map), PathSegment::Index(i)) => map.get_mut(&i.to_string())?,
                (Self::List(items), PathSegment::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Replaces an existing value at `path`, returning the previous one.
    ///
    /// Returns `None` and leaves the tree untouched when the path does not
    /// resolve.
    pub fn replace_path(&mut self, path: &[PathSegment], value: UploadValue) -> Option<UploadValue> {
        self.get_path_mut(path)
            .map(|slot| std::mem::replace(slot, value))
    }

    /// Writes `value` at `path`, creating missing containers on the way.
    ///
    /// A missing or null intermediate becomes an object for a field segment
    /// and a list for an index segment; lists are padded with nulls, at most
    /// [`MAX_LIST_PADDING`] of them per list. Returns false, leaving the level
    /// untouched, when the path crosses a scalar or a file or needs more
    /// padding than that.
    pub fn set_path(&mut self, path: &[PathSegment], value: UploadValue) -> bool {
        let Some((head, rest)) = path.split_first() else {
            *self = value;
            return true;
        };

        if let PathSegment::Index(i) = head {
            let len = match self {
                Self::List(items) => Some(items.len()),
                Self::Null => Some(0),
                _ => None,
            };
            if len.is_some_and(|len| i.saturating_sub(len) > MAX_LIST_PADDING) {
                return false;
            }
        }

        if matches!(self, Self::Null) {
            *self = match head {
                PathSegment::Field(_) => Self::object(),
                PathSegment::Index(_) => Self::List(Vec::new()),
            };
        }

        let child = match (self, head) {
            (Self::Object(map), PathSegment::Field(key)) => {
                map.entry(key.clone()).or_insert(Self::Null)
            }
            (Self::Object(map), PathSegment::Index(i)) => {
                map.entry(i.to_string()).or_insert(Self::Null)
            }
            (Self::List(items), PathSegment::Index(i)) => {
                if *i >= items.len() {
                    items.resize(*i + 1, Self::Null);
                }
                &mut items[*i]
            }
            _ => return false,
        };
        child.set_path(rest, value)
    }

    /// Converts to plain JSON. Files become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::File(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl Serialize for UploadValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null | Self::File(_) => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => serializer.collect_seq(items.iter()),
            Self::Object(map) => serializer.collect_map(map.iter()),
        }
    }
}

impl From<serde_json::Value> for UploadValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Upload> for UploadValue {
    fn from(upload: Upload) -> Self {
        Self::File(upload)
    }
}

impl From<UploadFile> for UploadValue {
    fn from(file: UploadFile) -> Self {
        Self::File(Upload::new(file))
    }
}

impl From<String> for UploadValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for UploadValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for UploadValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<K: Into<String>> FromIterator<(K, UploadValue)> for UploadValue {
    fn from_iter<I: IntoIterator<Item = (K, UploadValue)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> FilePath {
        s.parse().unwrap()
    }

    #[test]
    fn test_path_parse_and_display() {
        let p = path("variables.files.0.avatar");
        assert_eq!(
            p.segments(),
            &[
                PathSegment::from("variables"),
                PathSegment::from("files"),
                PathSegment::Index(0),
                PathSegment::from("avatar"),
            ]
        );
        assert_eq!(p.to_string(), "variables.files.0.avatar");
        assert!(path("").is_root());
        assert!("variables..a".parse::<FilePath>().is_err());
    }

    #[test]
    fn test_get_and_replace_path() {
        let mut value = UploadValue::from(json!({"a": {"b": [1, 2, {"c": "x"}]}}));
        let p = path("a.b.2.c");
        assert_eq!(value.get_path(p.segments()), Some(&UploadValue::from("x")));

        let old = value.replace_path(p.segments(), UploadValue::from("y"));
        assert_eq!(old, Some(UploadValue::from("x")));
        assert_eq!(value.to_json(), json!({"a": {"b": [1, 2, {"c": "y"}]}}));

        assert!(value
            .replace_path(path("a.missing").segments(), UploadValue::Null)
            .is_none());
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut value = UploadValue::object();
        assert!(value.set_path(path("variables.list.2.file").segments(), UploadValue::from("x")));
        assert_eq!(
            value.to_json(),
            json!({"variables": {"list": [null, null, {"file": "x"}]}})
        );

        let mut scalar = UploadValue::from(json!({"a": 1}));
        assert!(!scalar.set_path(path("a.b").segments(), UploadValue::Null));
    }

    #[test]
    fn test_set_path_limits_list_padding() {
        let mut value = UploadValue::from(json!({"list": [1]}));

        let far = format!("list.{}", 1 + MAX_LIST_PADDING + 1);
        assert!(!value.set_path(path(&far).segments(), UploadValue::from("x")));
        let huge = format!("list.{}", usize::MAX);
        assert!(!value.set_path(path(&huge).segments(), UploadValue::from("x")));
        assert_eq!(value.to_json(), json!({"list": [1]}));

        let mut empty = UploadValue::object();
        assert!(!empty.set_path(path("fresh.99999999999").segments(), UploadValue::from("x")));
        assert!(empty.set_path(path("99999999999").segments(), UploadValue::from("x")));
        assert_eq!(empty.to_json()["99999999999"], json!("x"));

        let edge = format!("list.{}", 1 + MAX_LIST_PADDING);
        assert!(value.set_path(path(&edge).segments(), UploadValue::from("x")));
        assert_eq!(value.to_json()["list"].as_array().map(Vec::len), Some(MAX_LIST_PADDING + 2));
    }

    #[test]
    fn test_files_serialize_as_null() {
        let mut value = UploadValue::from(json!({"name": "doc", "n": 1.5}));
        value.insert("file", UploadFile::new("a.txt", "hello"));

        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"name":"doc","n":1.5,"file":null}"#);
        assert_eq!(value.to_json(), json!({"name": "doc", "n": 1.5, "file": null}));
    }

    #[test]
    fn test_upload_identity_equality() {
        let a = Upload::new(UploadFile::new("a.txt", "same"));
        let b = Upload::new(UploadFile::new("a.txt", "same"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.name(), "a.txt");
        assert_eq!(a.bytes(), Bytes::from_static(b"same"));
    }

    #[test]
    fn test_upload_file_from_path() {
        let dir = std::env::temp_dir().join(format!("upload_link_value_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("note.txt");
        std::fs::write(&file_path, b"contents").unwrap();

        let file = UploadFile::from_path(&file_path).unwrap();
        assert_eq!(file.name(), "note.txt");
        assert_eq!(file.bytes(), Bytes::from_static(b"contents"));
        assert!(file.content_type().is_none());

        let missing = UploadFile::from_path(dir.join("missing.bin")).unwrap_err();
        assert_eq!(missing.code, ErrorCode::InvalidRequest);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
