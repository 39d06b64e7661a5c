use crate::core::models::PathSet;
use crate::utils::{FlowError, Result};

/// Named PathSets, populated once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PathSetRegistry {
    // Declaration order is kept so fan-out and watch setup are deterministic.
    sets: Vec<PathSet>,
}

impl PathSetRegistry {
    pub fn new(sets: Vec<PathSet>) -> Result<Self> {
        for (i, set) in sets.iter().enumerate() {
            if set.name.is_empty() {
                return Err(FlowError::config("path set with an empty name"));
            }
            if sets[..i].iter().any(|other| other.name == set.name) {
                return Err(FlowError::config(format!(
                    "path set '{}' is declared twice",
                    set.name
                )));
            }
            if set.source_patterns.iter().all(|p| p.starts_with('!')) {
                return Err(FlowError::config(format!(
                    "path set '{}' has no positive source pattern",
                    set.name
                )));
            }
        }
        Ok(Self { sets })
    }

    pub fn resolve(&self, name: &str) -> Result<&PathSet> {
        self.sets
            .iter()
            .find(|set| set.name == name)
            .ok_or_else(|| FlowError::UnknownPathSet(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathSet> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
