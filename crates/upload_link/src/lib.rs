//! Upload Link
//!
//! A GraphQL HTTP link that sends operations as JSON, or as a multipart form
//! when the variables contain files. The multipart layout is the flat one
//! Absinthe expects: `query`, `operationName` and `variables` fields, with
//! each file replaced in `variables` by a placeholder index that names its
//! own part.
//!
//! # Usage
//!
//! ```ignore
//! use upload_link::{ContextData, Operation, UploadFile, UploadLink};
//!
//! let link = UploadLink::new("http://localhost:4000/api");
//!
//! let operation = Operation::new("mutation ($file: Upload!) { upload(file: $file) { id } }")
//!     .with_operation_name("Upload")
//!     .with_variable("file", UploadFile::from_path("avatar.png")?)
//!     .with_context(ContextData::new().with_header("authorization", "Bearer token"));
//!
//! let (mut notifications, subscription) = link.request(operation)?.into_channel();
//! ```

pub mod body;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod link;
pub mod observable;
pub mod operation;
#[cfg(feature = "reqwest")]
pub mod reqwest_fetch;
pub mod response;
pub mod value;

// Re-exports
pub use body::{FormPart, MultipartForm, PartValue, RequestBody};
pub use config::{FetchOptions, Headers, HttpConfig, HttpFlags, ResolvedHttpConfig};
pub use error::{ErrorCode, LinkError, LinkResult, ResultExt};
pub use extract::{extract_and_replace, extract_files, ExtractedFile, FileExtraction};
pub use fetch::{fetch_fn, AbortController, AbortSignal, Fetch, FnFetch, HttpRequest, HttpResponse};
pub use link::{PreparedRequest, UploadLink, UploadLinkBuilder, UriSource, DEFAULT_URI};
pub use observable::{Notification, Observable, Observer, Subscription};
pub use operation::{ContextData, Operation, OperationContext};
#[cfg(feature = "reqwest")]
pub use reqwest_fetch::ReqwestFetch;
pub use response::{parse_and_check_response, FetchResult, GraphQLError, Location, ResponseOutcome};
pub use value::{FileLike, FilePath, PathSegment, Upload, UploadFile, UploadValue};
