//! Object identity and metadata.

/// Identity of a stored [`crate::Object`]: `id` is the primary key within
/// a shard, `shard_key` is the value the shard router hashes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Key {
    pub id: String,
    pub shard_key: String,
}

impl Key {
    pub fn new(id: impl Into<String>, shard_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shard_key: shard_key.into(),
        }
    }

    /// A `Key` whose shard key equals its id, the common case for objects
    /// addressed only by their own identity.
    pub fn self_sharded(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            shard_key: id.clone(),
            id,
        }
    }
}

/// Metadata attached to every stored object (spec GLOSSARY: Metadata).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub created_by: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub updated_by: String,
}

impl Metadata {
    pub fn new_at(now: chrono::DateTime<chrono::Utc>, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            created_at: now,
            created_by: user.clone(),
            updated_at: now,
            updated_by: user,
        }
    }

    pub fn touched_at(&self, now: chrono::DateTime<chrono::Utc>, user: impl Into<String>) -> Self {
        Self {
            created_at: self.created_at,
            created_by: self.created_by.clone(),
            updated_at: now,
            updated_by: user.into(),
        }
    }
}

/// The resolved subject of a successfully matched policy action.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Target {
    pub tenant: Option<String>,
    pub user: Option<String>,
    pub entity: Option<String>,
}
