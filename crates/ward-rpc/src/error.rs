//! Error envelope surfaced to RPC clients: `{url, method, status, code,
//! scope, message, inner?}`. An `ApiError`/`IntoResponse` pairing adapted
//! to a plain JSON envelope since this layer speaks HTTP/JSON only, not
//! gRPC.

use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::context::ScopeBreadcrumb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalError,
    /// Client-side wrapper: a remote response was not 200 and did not
    /// carry a valid error envelope of its own.
    UnexpectedStatusCode,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::UnexpectedStatusCode => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub code: ErrorCode,
    pub scope: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<ErrorEnvelope>>,
}

#[derive(Debug, thiserror::Error)]
#[error("{} {}: {} ({})", .0.method, .0.url, .0.message, .0.scope)]
pub struct ApiError(pub ErrorEnvelope);

impl ApiError {
    pub fn new(url: &str, method: &str, code: ErrorCode, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self(ErrorEnvelope {
            url: url.to_string(),
            method: method.to_string(),
            status: code.status().as_u16(),
            code,
            scope: scope.render(),
            message: message.into(),
            inner: None,
        })
    }

    pub fn bad_request(url: &str, method: &str, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self::new(url, method, ErrorCode::BadRequest, scope, message)
    }

    pub fn unauthorized(url: &str, method: &str, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self::new(url, method, ErrorCode::Unauthorized, scope, message)
    }

    pub fn forbidden(url: &str, method: &str, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self::new(url, method, ErrorCode::Forbidden, scope, message)
    }

    pub fn not_found(url: &str, method: &str, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self::new(url, method, ErrorCode::NotFound, scope, message)
    }

    pub fn internal(url: &str, method: &str, scope: &ScopeBreadcrumb, message: impl Into<String>) -> Self {
        Self::new(url, method, ErrorCode::InternalError, scope, message)
    }

    /// Wraps `self` as the `inner` of a new envelope at an outer scope
    /// boundary. When the remote envelope already echoes this URL/method
    /// it should be returned verbatim instead of calling this — see
    /// [`ApiError::propagate`].
    pub fn wrapped(self, url: &str, method: &str, code: ErrorCode, scope: &ScopeBreadcrumb) -> Self {
        let message = self.0.message.clone();
        Self(ErrorEnvelope {
            url: url.to_string(),
            method: method.to_string(),
            status: code.status().as_u16(),
            code,
            scope: scope.render(),
            message,
            inner: Some(Box::new(self.0)),
        })
    }

    /// If `remote` already echoes `url`/`method`, return it verbatim;
    /// otherwise nest it inside a new `unexpected_status_code` envelope.
    pub fn propagate(remote: ErrorEnvelope, url: &str, method: &str, scope: &ScopeBreadcrumb) -> Self {
        if remote.url == url && remote.method == method {
            return Self(remote);
        }
        Self(ErrorEnvelope {
            url: url.to_string(),
            method: method.to_string(),
            status: ErrorCode::UnexpectedStatusCode.status().as_u16(),
            code: ErrorCode::UnexpectedStatusCode,
            scope: scope.render(),
            message: "remote call returned an error envelope for a different url/method".to_string(),
            inner: Some(Box::new(remote)),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.code.status();
        (status, axum::Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_matches_the_taxonomy_table() {
        assert_eq!(ErrorCode::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::InternalError.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn wrapped_nests_the_original_envelope() {
        let scope = ScopeBreadcrumb::default();
        let inner = ApiError::forbidden("/a", "GET", &scope, "no matching action");
        let outer = inner.wrapped("/b", "POST", ErrorCode::InternalError, &scope);
        assert_eq!(outer.0.inner.unwrap().message, "no matching action");
    }

    #[test]
    fn propagate_returns_matching_envelope_verbatim() {
        let scope = ScopeBreadcrumb::default();
        let remote = ApiError::not_found("/a", "GET", &scope, "missing").0;
        let result = ApiError::propagate(remote.clone(), "/a", "GET", &scope);
        assert_eq!(result.0.code, remote.code);
        assert!(result.0.inner.is_none());
    }

    #[test]
    fn propagate_nests_mismatched_envelope() {
        let scope = ScopeBreadcrumb::default();
        let remote = ApiError::not_found("/a", "GET", &scope, "missing").0;
        let result = ApiError::propagate(remote, "/b", "POST", &scope);
        assert_eq!(result.0.code, ErrorCode::UnexpectedStatusCode);
        assert!(result.0.inner.is_some());
    }
}
