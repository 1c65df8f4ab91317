//! File extraction and placeholder rewriting.
//!
//! Extraction walks a body depth-first (object keys in insertion order, list
//! items by index) and records every file leaf with its path. Rewriting then
//! numbers the files from 1 and writes each number, as a string, back at the
//! file's location. The number is also the multipart field name of the file.

use tracing::{trace, warn};

use crate::value::{FilePath, PathSegment, Upload, UploadValue};

/// A file found in a body, before it is numbered.
#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    /// Location of the file, from the body root.
    pub path: FilePath,
    /// The file itself.
    pub file: Upload,
}

/// A numbered file whose location now holds its placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFile {
    /// 1-based placeholder, also the multipart field name.
    pub index: String,
    /// Location of the placeholder, from the body root.
    pub path: FilePath,
    /// The file itself.
    pub file: Upload,
}

/// Finds all files in `root` in deterministic depth-first order.
///
/// The input is not modified. Files are leaves: nothing inside a file value
/// is visited.
pub fn extract_files(root: &UploadValue) -> Vec<FileExtraction> {
    let mut found = Vec::new();
    let mut stack = Vec::new();
    walk(root, &mut stack, &mut found);
    found
}

fn walk(node: &UploadValue, stack: &mut Vec<PathSegment>, found: &mut Vec<FileExtraction>) {
    match node {
        UploadValue::File(file) => {
            let path = FilePath::from(stack.clone());
            trace!(path = %path, name = file.name(), "found file");
            found.push(FileExtraction {
                path,
                file: file.clone(),
            });
        }
        UploadValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                stack.push(PathSegment::Index(i));
                walk(item, stack, found);
                stack.pop();
            }
        }
        UploadValue::Object(map) => {
            for (key, value) in map {
                stack.push(PathSegment::Field(key.clone()));
                walk(value, stack, found);
                stack.pop();
            }
        }
        UploadValue::Null | UploadValue::Bool(_) | UploadValue::Number(_) | UploadValue::String(_) => {}
    }
}

/// Numbers `extractions` from 1 and writes each number into `root` at the
/// file's path, replacing the file.
///
/// Runs once per request; the tree is mutated in place.
pub fn assign_placeholders(
    root: &mut UploadValue,
    extractions: Vec<FileExtraction>,
) -> Vec<ExtractedFile> {
    extractions
        .into_iter()
        .enumerate()
        .map(|(i, FileExtraction { path, file })| {
            let index = (i + 1).to_string();
            if root
                .replace_path(path.segments(), UploadValue::String(index.clone()))
                .is_none()
            {
                warn!(path = %path, "extracted file path no longer resolves");
            }
            ExtractedFile { index, path, file }
        })
        .collect()
}

/// Extracts every file from `root` and leaves placeholders in its place.
pub fn extract_and_replace(root: &mut UploadValue) -> Vec<ExtractedFile> {
    let extractions = extract_files(root);
    assign_placeholders(root, extractions)
}
