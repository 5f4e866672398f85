//! Cached stage outputs.
//!
//! One table holds the output of every cached stage together with the token
//! it was computed for. A token names the input versions, the generation of
//! the upstream entry and the parameters the stage reads, so a change
//! anywhere upstream gives a new generation and every stage below it misses.

use std::sync::Arc;

use hashbrown::HashMap;
use mesh_kernel::Mesh;
use nalgebra::Isometry3;
use tracing::debug;

use crate::error::ShellResult;

use super::Stage;

/// The parameters a cached stage depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum StageParams {
    Trim {
        flip: bool,
        transform: Isometry3<f64>,
    },
    InnerWall {
        inner_offset: f64,
        flare_offset: f64,
        flare_band_width: f64,
    },
    OuterWall {
        thickness: f64,
    },
}

/// What a cached output was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct StageToken {
    /// Mesh and curve source versions, zero where unused.
    pub inputs: [u64; 2],
    /// Generation of the upstream entry, zero for the first stage.
    pub upstream: u64,
    pub params: StageParams,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub token: StageToken,
    /// Unique per computation; downstream tokens refer to it.
    pub generation: u64,
    pub mesh: Arc<Mesh>,
}

/// Outcome of [`StageCache::get_or_compute`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub mesh: Arc<Mesh>,
    pub generation: u64,
    pub hit: bool,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Default)]
pub struct StageCache {
    entries: HashMap<Stage, CacheEntry>,
    next_generation: u64,
    stats: CacheStats,
}

impl StageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> Option<&CacheEntry> {
        self.entries.get(&stage)
    }

    /// Return the cached output of `stage` if it was computed for `token`,
    /// otherwise compute, store and return it.
    ///
    /// A failed computation drops the entry of `stage` and of every stage
    /// after it.
    pub fn get_or_compute(
        &mut self,
        stage: Stage,
        token: StageToken,
        compute: impl FnOnce() -> ShellResult<Mesh>,
    ) -> ShellResult<CacheLookup> {
        if let Some(entry) = self.entries.get(&stage) {
            if entry.token == token {
                self.stats.hits += 1;
                debug!(%stage, generation = entry.generation, "Stage cache hit");
                return Ok(CacheLookup {
                    mesh: entry.mesh.clone(),
                    generation: entry.generation,
                    hit: true,
                });
            }
        }

        self.stats.misses += 1;
        let mesh = match compute() {
            Ok(mesh) => Arc::new(mesh),
            Err(e) => {
                self.invalidate_from(stage);
                return Err(e);
            }
        };
        self.next_generation += 1;
        let generation = self.next_generation;
        debug!(%stage, generation, "Stage recomputed");
        self.entries.insert(
            stage,
            CacheEntry {
                token,
                generation,
                mesh: mesh.clone(),
            },
        );
        Ok(CacheLookup {
            mesh,
            generation,
            hit: false,
        })
    }

    /// Drop `stage` and everything after it.
    pub fn invalidate_from(&mut self, stage: Stage) {
        self.entries.retain(|&s, _| s < stage);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;

    fn token(thickness: f64, upstream: u64) -> StageToken {
        StageToken {
            inputs: [0, 0],
            upstream,
            params: StageParams::OuterWall { thickness },
        }
    }

    #[test]
    fn test_hit_on_same_token() {
        let mut cache = StageCache::new();
        let a = cache
            .get_or_compute(Stage::OuterWall, token(5.0, 1), || Ok(Mesh::new()))
            .unwrap();
        assert!(!a.hit);
        let b = cache
            .get_or_compute(Stage::OuterWall, token(5.0, 1), || {
                panic!("must not recompute")
            })
            .unwrap();
        assert!(b.hit);
        assert_eq!(a.generation, b.generation);
        assert!(Arc::ptr_eq(&a.mesh, &b.mesh));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_changed_token_recomputes() {
        let mut cache = StageCache::new();
        let a = cache
            .get_or_compute(Stage::OuterWall, token(5.0, 1), || Ok(Mesh::new()))
            .unwrap();
        let b = cache
            .get_or_compute(Stage::OuterWall, token(5.0, 2), || Ok(Mesh::new()))
            .unwrap();
        let c = cache
            .get_or_compute(Stage::OuterWall, token(6.0, 2), || Ok(Mesh::new()))
            .unwrap();
        assert!(!b.hit && !c.hit);
        assert!(a.generation < b.generation && b.generation < c.generation);
    }

    #[test]
    fn test_failure_drops_downstream() {
        let mut cache = StageCache::new();
        let trim = StageToken {
            inputs: [1, 1],
            upstream: 0,
            params: StageParams::Trim {
                flip: false,
                transform: Isometry3::identity(),
            },
        };
        cache
            .get_or_compute(Stage::Trim, trim.clone(), || Ok(Mesh::new()))
            .unwrap();
        cache
            .get_or_compute(Stage::OuterWall, token(5.0, 1), || Ok(Mesh::new()))
            .unwrap();
        assert_eq!(cache.len(), 2);

        let changed = StageToken {
            params: StageParams::Trim {
                flip: true,
                transform: Isometry3::identity(),
            },
            ..trim
        };
        let err = cache
            .get_or_compute(Stage::Trim, changed, || Err(ShellError::EmptyMesh))
            .unwrap_err();
        assert!(matches!(err, ShellError::EmptyMesh));
        assert!(cache.is_empty());
    }
}
