//! The request-scoped carrier threaded as the first parameter of every
//! core operation: claims, workflow id, a scope breadcrumb for error
//! propagation, and a clock override. Each has a well-defined default
//! when absent.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use crate::error::ApiError;
use crate::token::TokenCodec;

/// A breadcrumb of nested call scopes, rendered as `a{k=v} → b{k=v}` for
/// the error envelope's `scope` field.
#[derive(Debug, Clone, Default)]
pub struct ScopeBreadcrumb(Vec<String>);

impl ScopeBreadcrumb {
    /// Returns a new breadcrumb with one more entry appended; the
    /// receiver is left untouched, matching the carrier's
    /// thread-through-by-value contract.
    pub fn entering(&self, label: &str, args: &[(&str, &str)]) -> Self {
        let mut entries = self.0.clone();
        let rendered = if args.is_empty() {
            label.to_string()
        } else {
            let joined = args.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
            format!("{label}{{{joined}}}")
        };
        entries.push(rendered);
        Self(entries)
    }

    pub fn render(&self) -> String {
        self.0.join(" → ")
    }
}

/// Anything exposing the process-wide resources `RequestContext`
/// extraction needs. Kept as a trait rather than a concrete `App` struct
/// so a service embedding this crate can shape its own Axum state.
pub trait AppState: Clone + Send + Sync + 'static {
    fn token_codec(&self) -> &TokenCodec;
    /// `true` disables non-production affordances such as the `Time-Now`
    /// header override.
    fn production(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub claims: Option<ward_types::Claims>,
    pub workflow_id: String,
    pub scope: ScopeBreadcrumb,
    pub now_override: Option<chrono::DateTime<chrono::Utc>>,
    pub request_method: String,
    pub request_url: String,
}

impl RequestContext {
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.now_override.unwrap_or_else(chrono::Utc::now)
    }

    pub fn enter(&self, label: &str, args: &[(&str, &str)]) -> Self {
        Self {
            claims: self.claims.clone(),
            workflow_id: self.workflow_id.clone(),
            scope: self.scope.entering(label, args),
            now_override: self.now_override,
            request_method: self.request_method.clone(),
            request_url: self.request_url.clone(),
        }
    }

    pub fn bad_request(&self, message: impl Into<String>) -> ApiError {
        ApiError::bad_request(&self.request_url, &self.request_method, &self.scope, message)
    }

    pub fn unauthorized(&self, message: impl Into<String>) -> ApiError {
        ApiError::unauthorized(&self.request_url, &self.request_method, &self.scope, message)
    }

    pub fn forbidden(&self, message: impl Into<String>) -> ApiError {
        ApiError::forbidden(&self.request_url, &self.request_method, &self.scope, message)
    }

    pub fn not_found(&self, message: impl Into<String>) -> ApiError {
        ApiError::not_found(&self.request_url, &self.request_method, &self.scope, message)
    }

    pub fn internal(&self, message: impl Into<String>) -> ApiError {
        ApiError::internal(&self.request_url, &self.request_method, &self.scope, message)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: AppState,
{
    type Rejection = ApiError;

    fn from_request_parts(parts: &mut Parts, state: &S) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let request_method = parts.method.to_string();
            let request_url = parts.uri.to_string();
            let scope = ScopeBreadcrumb::default();

            let maybe_bearer = Option::<TypedHeader<Authorization<Bearer>>>::from_request_parts(parts, state)
                .await
                .map_err(|err| ApiError::bad_request(&request_url, &request_method, &scope, err.to_string()))?;

            let claims = match maybe_bearer {
                Some(TypedHeader(auth)) => {
                    let claims = state
                        .token_codec()
                        .decode(auth.token())
                        .map_err(|err| ApiError::unauthorized(&request_url, &request_method, &scope, err.to_string()))?;
                    Some(claims)
                }
                None => None,
            };

            let workflow_id = parts
                .headers
                .get("workflow")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let now_override = if state.production() {
                None
            } else {
                parts
                    .headers
                    .get("time-now")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc))
            };

            Ok(RequestContext {
                claims,
                workflow_id,
                scope,
                now_override,
                request_method,
                request_url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breadcrumb_renders_label_only_without_args() {
        let scope = ScopeBreadcrumb::default().entering("store.insert", &[]);
        assert_eq!(scope.render(), "store.insert");
    }

    #[test]
    fn breadcrumb_renders_nested_entries_with_args() {
        let scope = ScopeBreadcrumb::default()
            .entering("store.insert", &[("id", "m1")])
            .entering("shard.route", &[("key", "m1")]);
        assert_eq!(scope.render(), "store.insert{id=m1} → shard.route{key=m1}");
    }

    #[test]
    fn entering_does_not_mutate_the_original() {
        let base = ScopeBreadcrumb::default().entering("a", &[]);
        let _extended = base.entering("b", &[]);
        assert_eq!(base.render(), "a");
    }
}
