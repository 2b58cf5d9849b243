//! Versioned top-K memory packs.
//!
//! A pack is the bounded bundle of a user's memories injected into prompts,
//! split into user-made and generated sections and fingerprinted with an
//! order-independent 8-hex-character version hash.

use crate::error::Result;
use crate::kv::KvStore;
use crate::model::Memory;
use crate::ports::{MemoryStore, UserDirectory, VectorIndex};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default pack size.
pub const DEFAULT_K: usize = 50;

/// Default TTL of cached prompt data.
pub const PROMPT_DATA_CACHE_TTL: Duration = Duration::from_secs(300);

/// Name used when the user directory cannot supply one.
pub const DEFAULT_USER_NAME: &str = "The User";

/// A bounded, versioned memory bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPack {
    pub user_name: String,
    pub user_made: Vec<Memory>,
    pub generated: Vec<Memory>,
    pub version_hash: String,
}

impl MemoryPack {
    pub fn len(&self) -> usize {
        self.user_made.len() + self.generated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The two-section prompt rendering of this pack.
    pub fn formatted(&self) -> String {
        format_memories(&self.user_name, &self.user_made, &self.generated)
    }
}

/// Cached shape of a scoring-path fetch.
#[derive(Debug, Serialize, Deserialize)]
struct CachedPromptData {
    user_name: String,
    memories: Vec<Memory>,
}

/// Assembles memory packs from the memory store, the vector index, and the
/// prompt-data cache.
pub struct MemoryPackAssembler {
    memories: Arc<dyn MemoryStore>,
    vectors: Option<Arc<dyn VectorIndex>>,
    users: Arc<dyn UserDirectory>,
    cache: Arc<dyn KvStore>,
    cache_ttl: Duration,
}

impl MemoryPackAssembler {
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        vectors: Option<Arc<dyn VectorIndex>>,
        users: Arc<dyn UserDirectory>,
        cache: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            memories,
            vectors,
            users,
            cache,
            cache_ttl: PROMPT_DATA_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// `(user_name, user_made, generated)` for a user, bounded to `k`.
    ///
    /// With `context`, memories are retrieved semantically and the cache is
    /// neither read nor written. Without it, the cache is consulted first.
    pub async fn get_prompt_data(
        &self,
        uid: &str,
        k: usize,
        context: Option<&str>,
    ) -> Result<(String, Vec<Memory>, Vec<Memory>)> {
        let (user_name, memories) = match context {
            Some(context) => self.fetch_by_context(uid, k, context).await?,
            None => self.fetch_scored_cached(uid, k).await?,
        };
        let (user_made, generated) = partition(memories, k);
        Ok((user_name, user_made, generated))
    }

    /// `(user_name, formatted_memories, version_hash)` for a user.
    pub async fn get_prompt_memories(
        &self,
        uid: &str,
        k: usize,
        context: Option<&str>,
    ) -> Result<(String, String, String)> {
        let pack = self.get_pack(uid, k, context).await?;
        let formatted = pack.formatted();
        Ok((pack.user_name, formatted, pack.version_hash))
    }

    /// The full pack, including its version hash.
    pub async fn get_pack(&self, uid: &str, k: usize, context: Option<&str>) -> Result<MemoryPack> {
        let (user_name, user_made, generated) = self.get_prompt_data(uid, k, context).await?;
        let version_hash = compute_version_hash(&user_made, &generated);
        debug!(
            uid,
            k,
            user_made = user_made.len(),
            generated = generated.len(),
            version = %version_hash,
            "memory pack assembled"
        );
        Ok(MemoryPack {
            user_name,
            user_made,
            generated,
            version_hash,
        })
    }

    /// Scoring path with the application cache in front.
    async fn fetch_scored_cached(&self, uid: &str, k: usize) -> Result<(String, Vec<Memory>)> {
        let key = cache_key(uid, k);

        if let Some(cached) = self.read_cache(&key).await {
            record_cache("hit");
            record_path("scoring");
            return Ok((cached.user_name, cached.memories));
        }
        record_cache("miss");

        let (user_name, memories) = self.fetch_scored(uid, k).await?;
        self.write_cache(
            &key,
            &CachedPromptData {
                user_name: user_name.clone(),
                memories: memories.clone(),
            },
        )
        .await;
        record_path("scoring");
        Ok((user_name, memories))
    }

    /// Semantic path. Never touches the cache; degrades to an uncached
    /// scoring fetch when the index fails or finds nothing.
    async fn fetch_by_context(
        &self,
        uid: &str,
        k: usize,
        context: &str,
    ) -> Result<(String, Vec<Memory>)> {
        record_cache("bypass");

        if let Some(vectors) = &self.vectors {
            match vectors.search_memories_by_vector(uid, context, k).await {
                Ok(ids) if !ids.is_empty() => {
                    let memories = self.memories.get_memories_by_ids(uid, &ids).await?;
                    let user_name = self.user_name(uid).await;
                    record_path("semantic");
                    return Ok((user_name, memories));
                }
                Ok(_) => debug!(uid, "vector search returned no memories, using scoring path"),
                Err(e) => warn!(uid, error = %e, "vector search failed, using scoring path"),
            }
        }

        record_path("fallback");
        self.fetch_scored(uid, k).await
    }

    async fn fetch_scored(&self, uid: &str, k: usize) -> Result<(String, Vec<Memory>)> {
        let memories = self.memories.get_memories(uid, k).await?;
        let user_name = self.user_name(uid).await;
        Ok((user_name, memories))
    }

    async fn user_name(&self, uid: &str) -> String {
        match self.users.get_user_name(uid).await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => DEFAULT_USER_NAME.to_string(),
            Err(e) => {
                warn!(uid, error = %e, "user name lookup failed, using default");
                DEFAULT_USER_NAME.to_string()
            }
        }
    }

    async fn read_cache(&self, key: &str) -> Option<CachedPromptData> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "prompt data cache read failed");
                record_cache("error");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key, error = %e, "prompt data cache entry is corrupt");
                record_cache("error");
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, data: &CachedPromptData) {
        let payload = match serde_json::to_vec(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "prompt data serialization failed");
                return;
            }
        };
        if let Err(e) = self.cache.setex(key, self.cache_ttl, &payload).await {
            warn!(key, error = %e, "prompt data cache write failed");
            record_cache("error");
        }
    }
}

/// Cache key for a scoring-path fetch.
pub fn cache_key(uid: &str, k: usize) -> String {
    format!("prompt_data:{uid}:{k}")
}

/// Split into `(user_made, generated)`, keeping at most `k` memories overall
/// in store order.
fn partition(memories: Vec<Memory>, k: usize) -> (Vec<Memory>, Vec<Memory>) {
    memories
        .into_iter()
        .take(k)
        .partition(|m| m.manually_added)
}

/// Order-independent 8-hex-character digest of pack contents.
///
/// Both sections are sorted by content and length-prefixed before hashing,
/// so equal content multisets always agree and section boundaries cannot
/// be forged by concatenation.
pub fn compute_version_hash(user_made: &[Memory], generated: &[Memory]) -> String {
    let mut hasher = Sha256::new();
    for (tag, section) in [(b'u', user_made), (b'g', generated)] {
        let mut contents: Vec<&str> = section.iter().map(|m| m.content.as_str()).collect();
        contents.sort_unstable();
        hasher.update([tag]);
        hasher.update((contents.len() as u64).to_be_bytes());
        for content in contents {
            hasher.update((content.len() as u64).to_be_bytes());
            hasher.update(content.as_bytes());
        }
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(8);
    digest
}

/// Two-section prompt rendering: generated facts, then user-shared facts.
pub fn format_memories(user_name: &str, user_made: &[Memory], generated: &[Memory]) -> String {
    let mut out = format!(
        "you already know the following facts about {user_name}: \n{}.",
        bullets(generated)
    );
    if !user_made.is_empty() {
        out.push_str(&format!(
            "\n\n{user_name} also shared the following about self: \n{}",
            bullets(user_made)
        ));
    }
    out
}

fn bullets(memories: &[Memory]) -> String {
    memories
        .iter()
        .map(|m| format!("- {}", m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn record_cache(result: &'static str) {
    metrics::memory_pack_cache().add(1, &[KeyValue::new("result", result)]);
}

fn record_path(path: &'static str) {
    metrics::memory_pack_retrievals().add(1, &[KeyValue::new("path", path)]);
}
