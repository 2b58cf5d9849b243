//! Memory retrieval for prompts: versioned top-K packs.

pub mod pack;

pub use pack::{
    DEFAULT_K, MemoryPack, MemoryPackAssembler, PROMPT_DATA_CACHE_TTL, compute_version_hash,
    format_memories,
};
