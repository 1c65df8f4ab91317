//! Response parsing and outcome classification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LinkError, LinkResult};
use crate::fetch::HttpResponse;

/// A GraphQL result as returned by the server.
///
/// Built leniently from any JSON object: `data` is kept whenever the key is
/// present, `null` included, and `errors` whenever it is an array, whatever
/// its items look like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct FetchResult {
    /// `Some(Value::Null)` when the server sent `"data": null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl FetchResult {
    /// Returns true if the result carries at least one error.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    /// Returns true if `data` is present and not `null`.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.is_null())
    }
}

impl From<Value> for FetchResult {
    fn from(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::default();
        };
        Self {
            data: object.remove("data"),
            errors: match object.remove("errors") {
                Some(Value::Array(items)) => {
                    Some(items.into_iter().map(GraphQLError::from).collect())
                }
                _ => None,
            },
            extensions: match object.remove("extensions") {
                Some(Value::Object(map)) => Some(map),
                _ => None,
            },
        }
    }
}

/// A GraphQL error.
///
/// Malformed entries never fail: a bare string becomes the message, and
/// fields of the wrong shape are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl From<Value> for GraphQLError {
    fn from(value: Value) -> Self {
        let mut object = match value {
            Value::Object(object) => object,
            Value::String(message) => {
                return Self {
                    message,
                    ..Self::default()
                }
            }
            other => {
                return Self {
                    message: other.to_string(),
                    ..Self::default()
                }
            }
        };

        let message = match object.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let locations = match object.remove("locations") {
            Some(Value::Array(items)) => Some(items.iter().filter_map(Location::from_value).collect()),
            _ => None,
        };
        let path = match object.remove("path") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        };
        let extensions = match object.remove("extensions") {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };

        Self {
            message,
            locations,
            path,
            extensions,
        }
    }
}

/// A source location of a GraphQL error. A missing coordinate is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Location {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let coordinate = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_default()
        };
        Some(Self {
            line: coordinate("line"),
            column: coordinate("column"),
        })
    }
}

/// Parses and validates a response.
///
/// The body is parsed first, so a non-JSON body is a parse error whatever the
/// status. A status of 300 or above is a server error that still carries the
/// parsed result. A 2xx JSON body with neither `data` nor `errors` is a
/// server error too.
pub fn parse_and_check_response(
    response: &HttpResponse,
    operation_name: Option<&str>,
) -> LinkResult<FetchResult> {
    let status = response.status;
    let body_text = response.text();

    let value: Value = serde_json::from_str(&body_text).map_err(|e| {
        LinkError::server_parse(status, body_text.clone(), format!("Failed to parse response: {e}"))
    })?;

    if status.as_u16() >= 300 {
        let error = LinkError::server(
            status,
            format!("Response not successful: Received status code {}", status.as_u16()),
        );
        return Err(if value.is_object() {
            error.with_result(FetchResult::from(value))
        } else {
            error
        });
    }

    let has_result = value
        .as_object()
        .is_some_and(|object| object.contains_key("data") || object.contains_key("errors"));
    if !has_result {
        return Err(LinkError::server(
            status,
            format!(
                "Server response was missing for query '{}'.",
                operation_name.unwrap_or_default()
            ),
        ));
    }

    Ok(FetchResult::from(value))
}

/// Terminal outcome of one link invocation.
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    /// Emit the result, then complete.
    Success(FetchResult),
    /// Emit the partial result, then fail.
    PartialFailure {
        result: FetchResult,
        error: LinkError,
    },
    /// Fail without emitting.
    Failure(LinkError),
    /// Emit nothing and signal nothing.
    Aborted,
}

impl ResponseOutcome {
    /// Classifies the result of a dispatched request.
    pub fn classify(result: LinkResult<FetchResult>) -> Self {
        match result {
            Ok(result) => Self::Success(result),
            Err(error) if error.is_abort() => {
                debug!("request aborted");
                Self::Aborted
            }
            Err(error) => match error.partial_result().cloned() {
                Some(result) => Self::PartialFailure { result, error },
                None => Self::Failure(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use http::StatusCode;
    use serde_json::json;

    fn respond(status: StatusCode, body: &str) -> HttpResponse {
        HttpResponse::new(status, body.to_string())
    }

    #[test]
    fn test_success() {
        let result =
            parse_and_check_response(&respond(StatusCode::OK, r#"{"data":{"x":1}}"#), None).unwrap();
        assert_eq!(result.data, Some(json!({"x": 1})));
        assert!(!result.has_errors());
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"data": {"x": 1}}));
    }

    #[test]
    fn test_errors_with_ok_status_are_a_result() {
        let body = r#"{"errors":[{"message":"denied","locations":[{"line":1,"column":3}]}],"data":null}"#;
        let result = parse_and_check_response(&respond(StatusCode::OK, body), None).unwrap();
        assert!(result.has_errors());
        assert_eq!(result.data, Some(Value::Null));
        assert!(!result.has_data());
        let error = &result.errors.as_ref().unwrap()[0];
        assert_eq!(error.message, "denied");
        assert_eq!(error.locations, Some(vec![Location { line: 1, column: 3 }]));
    }

    #[test]
    fn test_non_json_body() {
        let err = parse_and_check_response(&respond(StatusCode::BAD_GATEWAY, "<html>"), None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerParseError);
        assert_eq!(err.status, Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.body_text.as_deref(), Some("<html>"));
    }

    #[test]
    fn test_error_status_keeps_result() {
        let body = r#"{"errors":[{"message":"bad"}],"data":{"x":null}}"#;
        let err = parse_and_check_response(&respond(StatusCode::BAD_REQUEST, body), None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(err.message, "Response not successful: Received status code 400");
        assert!(err.partial_result().is_some());
    }

    #[test]
    fn test_loose_errors_keep_partial_result() {
        let body = r#"{"errors":[{"message":"bad","locations":[{"line":1}]}],"data":{"x":null}}"#;
        let err = parse_and_check_response(&respond(StatusCode::BAD_REQUEST, body), None)
            .unwrap_err();
        let partial = err.partial_result().expect("partial result kept");
        assert_eq!(partial.data, Some(json!({"x": null})));
        let error = &partial.errors.as_ref().unwrap()[0];
        assert_eq!(error.message, "bad");
        assert_eq!(error.locations, Some(vec![Location { line: 1, column: 0 }]));

        let body = r#"{"errors":["plain string", 7],"data":{"x":1}}"#;
        let err = parse_and_check_response(&respond(StatusCode::BAD_REQUEST, body), None)
            .unwrap_err();
        let errors = err.partial_result().and_then(|r| r.errors.clone()).unwrap();
        assert_eq!(errors[0].message, "plain string");
        assert_eq!(errors[1].message, "7");
    }

    #[test]
    fn test_loose_errors_with_ok_status_are_a_result() {
        let body = r#"{"errors":[{"message":"bad","locations":[{"line":1}],"path":"oops"}],"data":{"x":null}}"#;
        let result = parse_and_check_response(&respond(StatusCode::OK, body), None).unwrap();
        assert_eq!(result.data, Some(json!({"x": null})));
        assert!(result.has_errors());
        assert_eq!(result.errors.as_ref().unwrap()[0].path, None);
    }

    #[test]
    fn test_null_data_survives_serialization() {
        let body = r#"{"errors":[{"message":"denied"}],"data":null}"#;
        let result = parse_and_check_response(&respond(StatusCode::OK, body), None).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"errors": [{"message": "denied"}], "data": null})
        );
    }

    #[test]
    fn test_missing_result() {
        let err = parse_and_check_response(&respond(StatusCode::OK, r#"{"foo":1}"#), Some("GetUser"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(err.message, "Server response was missing for query 'GetUser'.");
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            ResponseOutcome::classify(Ok(FetchResult::default())),
            ResponseOutcome::Success(_)
        ));
        assert!(matches!(
            ResponseOutcome::classify(Err(LinkError::aborted())),
            ResponseOutcome::Aborted
        ));
        assert!(matches!(
            ResponseOutcome::classify(Err(LinkError::network("reset"))),
            ResponseOutcome::Failure(_)
        ));

        let partial: FetchResult =
            serde_json::from_value(json!({"errors": [{"message": "bad"}], "data": {"x": null}}))
                .unwrap();
        let error = LinkError::server(StatusCode::BAD_REQUEST, "bad").with_result(partial.clone());
        match ResponseOutcome::classify(Err(error)) {
            ResponseOutcome::PartialFailure { result, error } => {
                assert_eq!(result, partial);
                assert_eq!(error.status, Some(StatusCode::BAD_REQUEST));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let errors_only: FetchResult =
            serde_json::from_value(json!({"errors": [{"message": "bad"}]})).unwrap();
        let error = LinkError::server(StatusCode::BAD_REQUEST, "bad").with_result(errors_only);
        assert!(matches!(
            ResponseOutcome::classify(Err(error)),
            ResponseOutcome::Failure(_)
        ));
    }
}
