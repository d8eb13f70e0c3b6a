use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::store::StoreError;

/// Body of a `/process` call. Both fields are optional at the decoding level so that
/// missing fields surface as validation failures rather than decoding failures.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProcessRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A request that passed validation: a positive user id and non-empty data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequest {
    pub user_id: i64,
    pub data: String,
}

impl ProcessRequest {
    pub fn new(user_id: i64, data: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            data: Some(data.into()),
        }
    }

    #[instrument(skip_all)]
    pub fn from_bytes(bytes: Bytes) -> Result<ProcessRequest, ProcessError> {
        tracing::debug!(len = bytes.len(), "decoding new request");
        let payload = String::from_utf8(bytes.into()).map_err(|e| {
            tracing::error!("failed to decode body: {}", e);
            ProcessError::RequestDecodingError(String::from("invalid body encoding"))
        })?;

        Ok(serde_json::from_str::<ProcessRequest>(&payload)?)
    }

    pub fn validate(self) -> Result<ValidRequest, ProcessError> {
        let user_id = match self.user_id {
            None | Some(0) => return Err(ProcessError::MissingUserId),
            Some(id) if id < 0 => return Err(ProcessError::InvalidUserId(id)),
            Some(id) => id,
        };
        let data = match self.data {
            Some(data) if !data.is_empty() => data,
            _ => return Err(ProcessError::MissingData),
        };

        Ok(ValidRequest { user_id, data })
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub processed_data: String,
    pub user_profile: String,
    pub timestamp: DateTime<Utc>,
    pub processing_time: Duration,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessResponse {
    pub processed_data: String,
    pub user_profile: String,
    pub timestamp: String,
    pub processing_time: String,
}

impl From<ProcessResult> for ProcessResponse {
    fn from(result: ProcessResult) -> Self {
        Self {
            processed_data: result.processed_data,
            user_profile: result.user_profile,
            timestamp: result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            processing_time: format_millis(result.processing_time),
        }
    }
}

/// Renders a duration as fractional milliseconds, e.g. `12.345678ms`.
pub fn format_millis(duration: Duration) -> String {
    format!("{}ms", duration.as_nanos() as f64 / 1_000_000.0)
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),

    #[error("Missing user_id or data")]
    MissingUserId,
    #[error("Missing user_id or data")]
    MissingData,
    #[error("user_id must be positive, got {0}")]
    InvalidUserId(i64),

    #[error("profile lookup failed: {0}")]
    Internal(#[from] StoreError),
}

impl ProcessError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, ProcessError::Internal(_))
    }
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ProcessError::RequestDecodingError(_)
            | ProcessError::RequestParsingError(_)
            | ProcessError::MissingUserId
            | ProcessError::MissingData
            | ProcessError::InvalidUserId(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            ProcessError::Internal(_) => {
                tracing::error!("Processing error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_owned(),
                )
            }
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_request_fields() {
        let request =
            ProcessRequest::from_bytes(Bytes::from(r#"{"user_id": 3, "data": "hello"}"#)).unwrap();

        assert_eq!(request, ProcessRequest::new(3, "hello"));
    }

    #[test]
    fn rejects_invalid_json() {
        match ProcessRequest::from_bytes(Bytes::from("x")) {
            Err(ProcessError::RequestParsingError(_)) => (),
            other => panic!("Expected RequestParsingError, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_utf8() {
        match ProcessRequest::from_bytes(Bytes::from_static(&[0xff, 0xfe])) {
            Err(ProcessError::RequestDecodingError(_)) => (),
            other => panic!("Expected RequestDecodingError, got {:?}", other),
        }
    }

    #[test]
    fn missing_fields_fail_validation() {
        let cases = [
            (ProcessRequest::default(), "empty"),
            (
                ProcessRequest {
                    user_id: Some(1),
                    data: None,
                },
                "no data",
            ),
            (
                ProcessRequest {
                    user_id: None,
                    data: Some("x".to_owned()),
                },
                "no user_id",
            ),
            (ProcessRequest::new(1, ""), "empty data"),
            (ProcessRequest::new(0, "x"), "zero user_id"),
            (ProcessRequest::new(-4, "x"), "negative user_id"),
        ];

        for (request, case) in cases {
            let error = request.validate().expect_err(case);
            assert!(error.is_validation(), "{case}: {error:?}");
        }
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(
            ProcessRequest::new(999, "x").validate().unwrap(),
            ValidRequest {
                user_id: 999,
                data: "x".to_owned()
            }
        );
    }

    #[test]
    fn response_formats_timestamp_and_duration() {
        let response = ProcessResponse::from(ProcessResult {
            processed_data: "0".repeat(32),
            user_profile: "user3_profile_data_with_more_content".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            processing_time: Duration::from_micros(12_345),
        });

        assert_eq!(response.timestamp, "2024-05-01T12:30:00.000Z");
        assert_eq!(response.processing_time, "12.345ms");
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let error = ProcessError::Internal(StoreError::QueryError {
            command: "SELECT".to_owned(),
            error: sqlx::Error::PoolClosed,
        });

        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProcessError::MissingData.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
