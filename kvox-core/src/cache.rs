use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use tracing::info;

use crate::engine::{Pipeline, SpeechEngine};

/// Pipelines keyed by language code. A pipeline is built the first time its
/// code is requested and then kept for the life of the process. Failed
/// constructions are not cached, so the next request retries.
pub struct PipelineCache {
    engine: Box<dyn SpeechEngine>,
    pipelines: HashMap<String, Box<dyn Pipeline>>,
}

impl PipelineCache {
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            pipelines: HashMap::new(),
        }
    }

    pub fn get(&mut self, lang_code: &str) -> Result<&mut dyn Pipeline> {
        match self.pipelines.entry(lang_code.to_string()) {
            Entry::Occupied(entry) => Ok(&mut **entry.into_mut()),
            Entry::Vacant(entry) => {
                info!(lang_code, "Loading synthesis pipeline");
                let started = Instant::now();
                let pipeline = self.engine.init(lang_code)?;
                info!(
                    lang_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Synthesis pipeline ready"
                );
                Ok(&mut **entry.insert(pipeline))
            }
        }
    }

    pub fn contains(&self, lang_code: &str) -> bool {
        self.pipelines.contains_key(lang_code)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
