// registry.rs - Encoder registry for managing available feature sets

use std::collections::HashMap;
use std::sync::Arc;
use super::traits::SequenceEncoder;
use super::{BacteriocinEncoder, CompositionEncoder};

/// Registry for available encoders
pub struct EncoderRegistry {
    encoders: HashMap<String, Arc<dyn SequenceEncoder>>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            encoders: HashMap::new(),
        };

        // Register built-in encoders
        registry.register_encoder("bacpred", Arc::new(BacteriocinEncoder));
        registry.register_encoder("composition", Arc::new(CompositionEncoder));

        registry
    }

    /// Register a new encoder
    pub fn register_encoder(&mut self, name: &str, encoder: Arc<dyn SequenceEncoder>) {
        self.encoders.insert(name.to_string(), encoder);
    }

    /// Get a shareable handle to an encoder by name
    pub fn get_encoder(&self, name: &str) -> Option<Arc<dyn SequenceEncoder>> {
        self.encoders.get(name).cloned()
    }

    /// Check if an encoder exists
    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains_key(name)
    }

    /// List all available encoders as (name, description)
    pub fn list_encoders(&self) -> Vec<(&str, &str)> {
        let mut list: Vec<_> = self
            .encoders
            .values()
            .map(|e| (e.name(), e.description()))
            .collect();
        list.sort();
        list
    }

    /// Get all encoder names
    pub fn get_encoder_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.encoders.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
