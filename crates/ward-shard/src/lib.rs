//! Maps a shard key to one of N backend connections via `CRC32(key) mod N`.
//! A fan-out router generalized to an arbitrary cloneable backend handle.

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("router has no backend handles")]
    Empty,
}

/// An ordered, fixed sequence of backend handles for one `(vault, tenant)`.
/// The order established at construction *is* the shard order:
/// `shard_index` is stable for the life of the router.
#[derive(Clone)]
pub struct Router<B> {
    handles: Arc<Vec<B>>,
}

impl<B> Router<B> {
    pub fn new(handles: Vec<B>) -> Result<Self, ShardError> {
        if handles.is_empty() {
            return Err(ShardError::Empty);
        }
        Ok(Self {
            handles: Arc::new(handles),
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// `CRC32(key) mod N`. Depends only on `(key, N)`, never on call order
    /// or prior lookups.
    pub fn index(&self, shard_key: &[u8]) -> usize {
        (crc32fast::hash(shard_key) as usize) % self.handles.len()
    }

    /// The single backend handle addressed by `shard_key`.
    pub fn handle(&self, shard_key: &[u8]) -> &B {
        &self.handles[self.index(shard_key)]
    }

    /// All backend handles, in shard order, for fan-out operations that
    /// don't know a shard key up front.
    pub fn all(&self) -> &[B] {
        &self.handles
    }
}
