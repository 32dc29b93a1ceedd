//! Compiles a declarative role/permission/action policy into an ordered
//! matcher and evaluates `(method, path, claims)` into an allow/deny
//! decision plus a resolved [`Target`].

use std::collections::{HashMap, HashSet};
use ward_types::{Claims, Target};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("action `{0}` is missing a method; expected `METHOD path`")]
    MissingMethod(String),
    #[error("permission `{0}` referenced by a role is not declared in `permissions`")]
    UnknownPermission(String),
    #[error("`{{any...}}` may only appear as the terminal segment of action `{0}`")]
    NonTerminalOpenEnd(String),
}

/// The declarative policy document compiled by [`compile`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Policy {
    pub roles: HashMap<String, HashSet<String>>,
    pub permissions: HashMap<String, HashSet<String>>,
    pub public: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Fixed(String),
    User,
    Tenant,
    Entity,
    Any,
}

impl Segment {
    fn score(&self) -> i64 {
        match self {
            Segment::Fixed(_) => 0,
            Segment::User => 1,
            Segment::Tenant => 2,
            Segment::Entity => 3,
            Segment::Any => 4,
        }
    }

    fn classify(raw: &str) -> Segment {
        match raw {
            "{user}" => Segment::User,
            "{tenant}" => Segment::Tenant,
            "{entity}" => Segment::Entity,
            "{any}" => Segment::Any,
            fixed => Segment::Fixed(fixed.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledAction {
    method: String,
    /// `None` for public actions, which carry no role gate.
    role: Option<String>,
    segments: Vec<Segment>,
    open_end: bool,
    score: i64,
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn compile_action(action: &str, role: Option<String>) -> Result<CompiledAction, PolicyError> {
    let mut parts = action.splitn(2, ' ');
    let method = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| PolicyError::MissingMethod(action.to_string()))?
        .to_string();
    let path = parts.next().unwrap_or("");

    let raw = path_segments(path);
    if raw[..raw.len().saturating_sub(1)]
        .iter()
        .any(|s| *s == "{any...}")
    {
        return Err(PolicyError::NonTerminalOpenEnd(action.to_string()));
    }

    let open_end = raw.last().is_some_and(|s| *s == "{any...}");
    let raw = if open_end { &raw[..raw.len() - 1] } else { &raw[..] };
    let segments: Vec<Segment> = raw.iter().map(|s| Segment::classify(s)).collect();

    let score = segments.iter().map(Segment::score).sum::<i64>() - segments.len() as i64
        + if open_end { 1000 } else { 0 };

    Ok(CompiledAction {
        method,
        role,
        segments,
        open_end,
        score,
    })
}

impl CompiledAction {
    /// Attempts to match this action against a request, returning the
    /// resolved `Target` fragment contributed by placeholder segments.
    /// Does not apply the role gate — callers check that separately.
    fn try_match(&self, method: &str, request_segments: &[&str], claims: &Claims) -> Option<Target> {
        if self.method != method {
            return None;
        }
        if self.open_end {
            if request_segments.len() < self.segments.len() {
                return None;
            }
        } else if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut target = Target::default();
        for (segment, actual) in self.segments.iter().zip(request_segments.iter()) {
            match segment {
                Segment::Fixed(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                Segment::User => {
                    if claims.user == *actual {
                        target.user = Some((*actual).to_string());
                    } else {
                        return None;
                    }
                }
                Segment::Tenant => {
                    if claims.tenants.contains(*actual) {
                        target.tenant = Some((*actual).to_string());
                    } else {
                        return None;
                    }
                }
                Segment::Entity => {
                    if claims.entities.contains_key(*actual) {
                        target.entity = Some((*actual).to_string());
                    } else {
                        return None;
                    }
                }
                Segment::Any => {}
            }
        }
        Some(target)
    }
}

/// Outcome of evaluating a request against a [`CompiledPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Allow(Target),
    Forbidden,
    Unauthorized,
}

/// A policy compiled once at service start and evaluated read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    public: Vec<CompiledAction>,
    actions: Vec<CompiledAction>,
}

/// Compiles a [`Policy`] document into an ordered matcher.
///
/// Actions are sorted by ascending specificity score so the matcher can
/// always take the first hit.
pub fn compile(policy: &Policy) -> Result<CompiledPolicy, PolicyError> {
    let mut actions = Vec::new();
    for (role, permissions) in &policy.roles {
        for permission in permissions {
            let permission_actions = policy
                .permissions
                .get(permission)
                .ok_or_else(|| PolicyError::UnknownPermission(permission.clone()))?;
            for action in permission_actions {
                actions.push(compile_action(action, Some(role.clone()))?);
            }
        }
    }
    actions.sort_by_key(|a| a.score);

    let mut public = Vec::new();
    for action in &policy.public {
        public.push(compile_action(action, None)?);
    }
    public.sort_by_key(|a| a.score);

    Ok(CompiledPolicy { public, actions })
}

impl CompiledPolicy {
    /// Evaluates `(method, path)` against this policy.
    ///
    /// `claims` is `None` when no bearer token was presented or it failed
    /// to verify; `Some` carries already-verified claims (token decoding
    /// itself is `ward-rpc`'s concern, keeping this matcher crypto-free).
    pub fn evaluate(&self, method: &str, path: &str, claims: Option<&Claims>) -> MatchOutcome {
        let request_segments = path_segments(path);
        let empty = Claims::default();

        for action in &self.public {
            if let Some(target) = action.try_match(method, &request_segments, &empty) {
                return MatchOutcome::Allow(target);
            }
        }

        let Some(claims) = claims else {
            return MatchOutcome::Unauthorized;
        };

        for action in &self.actions {
            let Some(target) = action.try_match(method, &request_segments, claims) else {
                continue;
            };
            let role = action.role.as_deref().expect("non-public action always carries a role");
            if claims.roles_in_scope(target.entity.as_deref()).contains(role) {
                return MatchOutcome::Allow(target);
            }
            // Role not permitted for this candidate: keep looking, a later
            // (less specific) action may grant a role we do hold.
        }

        MatchOutcome::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_fixture() -> Policy {
        let mut roles = HashMap::new();
        roles.insert("r".to_string(), HashSet::from(["p".to_string()]));

        let mut permissions = HashMap::new();
        permissions.insert(
            "p".to_string(),
            HashSet::from(["GET /a/{tenant}/b/{any...}".to_string()]),
        );

        Policy {
            roles,
            permissions,
            public: HashSet::from(["GET /public/{any...}".to_string()]),
        }
    }

    fn claims_fixture() -> Claims {
        Claims::new("u")
            .with_tenants(["t1".to_string()])
            .with_roles(["r".to_string()])
    }

    #[test]
    fn scenario_public_allows_without_claims() {
        let compiled = compile(&policy_fixture()).unwrap();
        assert_eq!(
            compiled.evaluate("GET", "/public/x/y", None),
            MatchOutcome::Allow(Target::default())
        );
    }

    #[test]
    fn scenario_tenant_action_resolves_target() {
        let compiled = compile(&policy_fixture()).unwrap();
        let claims = claims_fixture();
        assert_eq!(
            compiled.evaluate("GET", "/a/t1/b/x/y", Some(&claims)),
            MatchOutcome::Allow(Target {
                tenant: Some("t1".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn scenario_wrong_tenant_is_forbidden() {
        let compiled = compile(&policy_fixture()).unwrap();
        let claims = claims_fixture();
        assert_eq!(
            compiled.evaluate("GET", "/a/t2/b/x", Some(&claims)),
            MatchOutcome::Forbidden
        );
    }

    #[test]
    fn missing_token_for_non_public_path_is_unauthorized() {
        let compiled = compile(&policy_fixture()).unwrap();
        assert_eq!(
            compiled.evaluate("GET", "/a/t1/b/x", None),
            MatchOutcome::Unauthorized
        );
    }

    #[test]
    fn more_specific_action_wins_over_wildcard_when_both_match() {
        let mut roles = HashMap::new();
        roles.insert(
            "a".to_string(),
            HashSet::from(["specific".to_string()]),
        );
        roles.insert("b".to_string(), HashSet::from(["wild".to_string()]));

        let mut permissions = HashMap::new();
        permissions.insert(
            "specific".to_string(),
            HashSet::from(["GET /path/to/specific".to_string()]),
        );
        permissions.insert(
            "wild".to_string(),
            HashSet::from(["GET /path/to/{any}".to_string()]),
        );

        let policy = Policy {
            roles,
            permissions,
            public: HashSet::new(),
        };
        let compiled = compile(&policy).unwrap();
        let claims = Claims::new("u").with_roles(["a".to_string()]);

        assert_eq!(
            compiled.evaluate("GET", "/path/to/specific", Some(&claims)),
            MatchOutcome::Allow(Target::default())
        );
        assert_eq!(
            compiled.evaluate("GET", "/path/to/other", Some(&claims)),
            MatchOutcome::Forbidden
        );
    }

    #[test]
    fn ungranted_role_falls_through_to_a_less_specific_match() {
        // Claims hold role "b" (wildcard) but not "a" (specific). The
        // specific action matches first but is gated out; the matcher
        // must continue to the wildcard action rather than stopping.
        let mut roles = HashMap::new();
        roles.insert("a".to_string(), HashSet::from(["specific".to_string()]));
        roles.insert("b".to_string(), HashSet::from(["wild".to_string()]));

        let mut permissions = HashMap::new();
        permissions.insert(
            "specific".to_string(),
            HashSet::from(["GET /path/to/specific".to_string()]),
        );
        permissions.insert(
            "wild".to_string(),
            HashSet::from(["GET /path/to/{any}".to_string()]),
        );

        let policy = Policy {
            roles,
            permissions,
            public: HashSet::new(),
        };
        let compiled = compile(&policy).unwrap();
        let claims = Claims::new("u").with_roles(["b".to_string()]);

        assert_eq!(
            compiled.evaluate("GET", "/path/to/specific", Some(&claims)),
            MatchOutcome::Allow(Target::default())
        );
    }

    #[test]
    fn empty_path_matches_trailing_open_end() {
        let mut permissions = HashMap::new();
        permissions.insert("p".to_string(), HashSet::new());
        let policy = Policy {
            roles: HashMap::new(),
            permissions,
            public: HashSet::from(["GET /{any...}".to_string()]),
        };
        let compiled = compile(&policy).unwrap();
        assert_eq!(
            compiled.evaluate("GET", "/", None),
            MatchOutcome::Allow(Target::default())
        );
    }

    #[test]
    fn non_terminal_open_end_is_rejected_at_compile_time() {
        let policy = Policy {
            roles: HashMap::new(),
            permissions: HashMap::new(),
            public: HashSet::from(["GET /{any...}/tail".to_string()]),
        };
        assert!(matches!(
            compile(&policy),
            Err(PolicyError::NonTerminalOpenEnd(_))
        ));
    }

    #[test]
    fn entity_scoped_role_only_applies_when_entity_placeholder_matched() {
        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), HashSet::from(["manage".to_string()]));

        let mut permissions = HashMap::new();
        permissions.insert(
            "manage".to_string(),
            HashSet::from(["POST /entities/{entity}/settings".to_string()]),
        );

        let policy = Policy {
            roles,
            permissions,
            public: HashSet::new(),
        };
        let compiled = compile(&policy).unwrap();

        let claims = Claims::new("u").with_entity_roles("acct-1", ["admin".to_string()]);
        assert_eq!(
            compiled.evaluate("POST", "/entities/acct-1/settings", Some(&claims)),
            MatchOutcome::Allow(Target {
                entity: Some("acct-1".to_string()),
                ..Default::default()
            })
        );
        assert_eq!(
            compiled.evaluate("POST", "/entities/acct-2/settings", Some(&claims)),
            MatchOutcome::Forbidden
        );
    }
}
