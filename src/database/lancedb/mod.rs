// LanceDB vector database module
// Collection lifecycle, inserts and k-NN search over content embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::config::VectorStoreConfig;

pub use vector_store::VectorIndexManager;

/// A vector keyed by the id of the content record it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub id: i64,
    pub vector: Vec<f32>,
}

/// One k-NN match; lower distance means more similar (L2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
}

/// IVF_FLAT tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    /// Number of IVF partitions; also the minimum row count before the
    /// index is trained
    pub nlist: u32,
    /// Partitions probed per query
    pub nprobe: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            nlist: 1024,
            nprobe: 10,
        }
    }
}

impl From<&VectorStoreConfig> for IndexParams {
    fn from(config: &VectorStoreConfig) -> Self {
        Self {
            nlist: config.nlist,
            nprobe: config.nprobe,
        }
    }
}
