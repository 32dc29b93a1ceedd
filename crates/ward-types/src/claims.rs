//! The identity assertions carried in a signed token.

use std::collections::{HashMap, HashSet};

/// `Claims` as decoded from a verified token. `additions` carries arbitrary
/// extra fields the issuer attached, preserved for passthrough.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub user: String,
    #[serde(default)]
    pub tenants: HashSet<String>,
    #[serde(default)]
    pub roles: HashSet<String>,
    #[serde(default, deserialize_with = "deserialize_entities")]
    pub entities: HashMap<String, HashSet<String>>,
    #[serde(flatten)]
    pub additions: HashMap<String, serde_json::Value>,
}

/// Older tokens encoded `entities` as a flat array of entity names rather
/// than a map of entity -> roles. Such tokens are treated as carrying *no*
/// entity-scoped roles rather than rejected outright.
fn deserialize_entities<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, HashSet<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        serde_json::Value::Array(_) | serde_json::Value::Null => Ok(HashMap::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected an object or array for `entities`, found {other}"
        ))),
    }
}

impl Claims {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_tenants(mut self, tenants: impl IntoIterator<Item = String>) -> Self {
        self.tenants = tenants.into_iter().collect();
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_entity_roles(
        mut self,
        entity: impl Into<String>,
        roles: impl IntoIterator<Item = String>,
    ) -> Self {
        self.entities
            .insert(entity.into(), roles.into_iter().collect());
        self
    }

    /// The roles granted for the given entity, unioned with the claim's
    /// global roles. Used by the policy matcher's entity-scoped role gate.
    pub fn roles_in_scope(&self, entity: Option<&str>) -> HashSet<&str> {
        let mut scoped: HashSet<&str> = self.roles.iter().map(String::as_str).collect();
        if let Some(entity) = entity {
            if let Some(entity_roles) = self.entities.get(entity) {
                scoped.extend(entity_roles.iter().map(String::as_str));
            }
        }
        scoped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_flat_array_entities_become_empty_map() {
        let json = r#"{"user":"u","entities":["e1","e2"]}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert!(claims.entities.is_empty());
    }

    #[test]
    fn object_entities_decode_normally() {
        let json = r#"{"user":"u","entities":{"e1":["admin"]}}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(
            claims.entities.get("e1").unwrap(),
            &HashSet::from(["admin".to_string()])
        );
    }

    #[test]
    fn roles_in_scope_unions_global_and_entity_roles() {
        let claims = Claims::new("u")
            .with_roles(["viewer".to_string()])
            .with_entity_roles("acct-1", ["admin".to_string()]);

        let scoped = claims.roles_in_scope(Some("acct-1"));
        assert!(scoped.contains("viewer"));
        assert!(scoped.contains("admin"));

        let unscoped = claims.roles_in_scope(None);
        assert!(unscoped.contains("viewer"));
        assert!(!unscoped.contains("admin"));
    }

    #[test]
    fn additions_round_trip_arbitrary_fields() {
        let json = r#"{"user":"u","custom_field":42}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(
            claims.additions.get("custom_field"),
            Some(&serde_json::json!(42))
        );
    }
}
