use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::Annotator;

/// Registry of annotator backends, keyed by `Annotator::name`.
///
/// Annotators take `&self`, so entries are shared without a lock.
pub struct AnnotatorRegistry {
    annotators: HashMap<String, Arc<dyn Annotator>>,
    default_name: Option<String>,
}

impl AnnotatorRegistry {
    pub fn new() -> Self {
        Self {
            annotators: HashMap::new(),
            default_name: None,
        }
    }

    /// Register an annotator. The first registered annotator becomes the default.
    pub fn register<A: Annotator + 'static>(&mut self, annotator: A) {
        let name = annotator.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.annotators.insert(name, Arc::new(annotator));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.annotators.contains_key(name) {
            return Err(anyhow!("annotator '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Annotator>> {
        self.annotators.get(name).cloned()
    }

    pub fn default_annotator(&self) -> Option<Arc<dyn Annotator>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.annotators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Pick an annotator by name, or the default when `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn Annotator>> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                anyhow!(
                    "annotator '{}' not registered (available: {})",
                    name,
                    self.list().join(", ")
                )
            }),
            None => self
                .default_annotator()
                .ok_or_else(|| anyhow!("no annotator registered")),
        }
    }
}

impl Default for AnnotatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
