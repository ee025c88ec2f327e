//! In-memory labeled descriptor registry and its JSON wire format.

use crate::types::{Embedding, LabeledDescriptors};
use serde::{Deserialize, Serialize};

/// Every label with at least one extracted descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: Vec<LabeledDescriptors>,
}

/// One registry entry as sent to clients: `{label, descriptors: number[][]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    pub label: String,
    pub descriptors: Vec<Vec<f32>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label's descriptors. Labels without descriptors are dropped.
    pub fn push(&mut self, label: impl Into<String>, descriptors: Vec<Embedding>) {
        if descriptors.is_empty() {
            return;
        }
        self.entries.push(LabeledDescriptors {
            label: label.into(),
            descriptors,
        });
    }

    pub fn entries(&self) -> &[LabeledDescriptors] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&LabeledDescriptors> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of descriptors across all labels.
    pub fn descriptor_count(&self) -> usize {
        self.entries.iter().map(|e| e.descriptors.len()).sum()
    }

    pub fn to_wire_format(&self) -> Vec<WireEntry> {
        self.entries
            .iter()
            .map(|e| WireEntry {
                label: e.label.clone(),
                descriptors: e.descriptors.iter().map(|d| d.values.clone()).collect(),
            })
            .collect()
    }

}
