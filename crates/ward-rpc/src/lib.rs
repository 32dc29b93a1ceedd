//! RPC boundary glue: explicit route descriptors, a request-scoped
//! context carrier, a JSON error envelope, and the JWT token codec,
//! built around a plain HTTP/JSON contract rather than a tonic/GraphQL
//! bridge.

mod context;
mod error;
mod route;
mod token;

pub use context::{AppState, RequestContext, ScopeBreadcrumb};
pub use error::{ApiError, ErrorCode, ErrorEnvelope};
pub use route::{RouteDescriptor, RouteTable};
pub use token::{TokenCodec, TokenError};

/// Authorizes a request against a compiled policy and returns the
/// resolved [`ward_types::Target`], translating [`ward_policy::MatchOutcome`]
/// into the error envelope's taxonomy.
pub fn authorize(
    policy: &ward_policy::CompiledPolicy,
    ctx: &RequestContext,
    method: &str,
    path: &str,
) -> Result<ward_types::Target, ApiError> {
    match policy.evaluate(method, path, ctx.claims.as_ref()) {
        ward_policy::MatchOutcome::Allow(target) => Ok(target),
        ward_policy::MatchOutcome::Forbidden => Err(ctx.forbidden("no policy action matches this request")),
        ward_policy::MatchOutcome::Unauthorized => Err(ctx.unauthorized("missing or invalid bearer token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext {
            claims: None,
            workflow_id: "wf-1".to_string(),
            scope: ScopeBreadcrumb::default(),
            now_override: None,
            request_method: "GET".to_string(),
            request_url: "/public/x".to_string(),
        }
    }

    #[test]
    fn authorize_allows_a_public_match_without_claims() {
        let policy = ward_policy::compile(&ward_policy::Policy {
            roles: Default::default(),
            permissions: Default::default(),
            public: std::collections::HashSet::from(["GET /public/{any...}".to_string()]),
        })
        .unwrap();

        let target = authorize(&policy, &ctx(), "GET", "/public/x").unwrap();
        assert_eq!(target, ward_types::Target::default());
    }

    #[test]
    fn authorize_reports_unauthorized_without_claims_on_a_gated_path() {
        let policy = ward_policy::compile(&ward_policy::Policy {
            roles: std::collections::HashMap::from([("r".to_string(), std::collections::HashSet::from(["p".to_string()]))]),
            permissions: std::collections::HashMap::from([("p".to_string(), std::collections::HashSet::from(["GET /a".to_string()]))]),
            public: Default::default(),
        })
        .unwrap();

        let err = authorize(&policy, &ctx(), "GET", "/a").unwrap_err();
        assert_eq!(err.0.code, ErrorCode::Unauthorized);
    }
}
