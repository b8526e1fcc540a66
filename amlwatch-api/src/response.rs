//! Success envelope shared by every JSON endpoint.
//!
//! `{ "success": true, "data": ..., "metadata": { ... } }`. Failures use the
//! `ApiError` body instead.

use amlwatch_core::DateWindow;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Where the payload was served from
    pub source: &'static str,
    pub query_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DateWindow>,
}

impl ResponseMetadata {
    pub fn cache(window: &DateWindow) -> Self {
        Self {
            source: "cache",
            query_time: Utc::now(),
            record_count: None,
            window: Some(*window),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            metadata: None,
            status: StatusCode::OK,
        }
    }

    /// 202, for work started in the background.
    pub fn accepted(data: T) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            ..Self::ok(data)
        }
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// A list read through the cache for `window`, with its length.
    pub fn list(data: Vec<T>, window: &DateWindow) -> Self {
        let count = data.len();
        Self::ok(data).with_metadata(ResponseMetadata::cache(window).with_count(count))
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_list_envelope_carries_count_and_window() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        let body = serde_json::to_value(ApiResponse::list(vec![1, 2, 3], &window)).unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([1, 2, 3]));
        assert_eq!(body["metadata"]["source"], "cache");
        assert_eq!(body["metadata"]["recordCount"], 3);
        assert!(body.get("status").is_none());
    }

    #[test]
    fn test_plain_envelope_omits_metadata() {
        let body = serde_json::to_value(ApiResponse::ok("done")).unwrap();
        assert!(body.get("metadata").is_none());
        assert_eq!(ApiResponse::accepted(()).status, StatusCode::ACCEPTED);
    }
}
