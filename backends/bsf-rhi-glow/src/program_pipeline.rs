//! Linked graphics pipelines keyed by their stage programs

use bsf_rhi::{GpuProgramType, ProgramId, RhiResult};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Program ids of the five graphics stages, indexed by [`GpuProgramType::index`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineKey(pub [Option<ProgramId>; 5]);

impl PipelineKey {
    pub fn program(&self, stage: GpuProgramType) -> Option<ProgramId> {
        self.0.get(stage.index()).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Cache of linked pipeline objects
///
/// Pipelines stay alive until the cache is cleared at shutdown.
pub struct ProgramPipelineCache<V> {
    pipelines: FxHashMap<PipelineKey, V>,
    log_misses: bool,
}

impl<V> ProgramPipelineCache<V> {
    pub fn new(log_misses: bool) -> Self {
        Self {
            pipelines: FxHashMap::default(),
            log_misses,
        }
    }

    /// Find or link the pipeline for `key`
    pub fn get_pipeline(
        &mut self,
        key: PipelineKey,
        create: impl FnOnce(&PipelineKey) -> RhiResult<V>,
    ) -> RhiResult<&V> {
        use std::collections::hash_map::Entry;

        match self.pipelines.entry(key) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                if self.log_misses {
                    debug!("Linking program pipeline {:?}", entry.key());
                }
                let value = create(entry.key())?;
                Ok(&*entry.insert(value))
            }
        }
    }

    pub fn clear(&mut self, mut destroy: impl FnMut(V)) {
        for (_, pipeline) in self.pipelines.drain() {
            destroy(pipeline);
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_programs_share_a_pipeline() {
        let vs = ProgramId::next();
        let fs = ProgramId::next();
        let mut cache = ProgramPipelineCache::new(false);
        let mut links = 0;

        let key = PipelineKey([Some(vs), Some(fs), None, None, None]);
        for _ in 0..3 {
            cache
                .get_pipeline(key, |_| {
                    links += 1;
                    Ok(links)
                })
                .unwrap();
        }
        assert_eq!(links, 1);

        let other = PipelineKey([Some(vs), None, None, None, None]);
        cache.get_pipeline(other, |_| Ok(99)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(other.program(GpuProgramType::Fragment), None);
    }
}
