use std::{
    collections::{BTreeSet, HashMap},
    sync::RwLock,
};

use serde::Serialize;

#[derive(Debug, Default)]
struct Inner {
    names: HashMap<String, String>,
    associations: HashMap<String, BTreeSet<String>>,
}

/// In-memory contact tag index, rebuilt from the messaging network's label
/// synchronization events.
#[derive(Debug, Default)]
pub struct LabelStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSummary {
    pub label_id: String,
    pub name: Option<String>,
    pub contacts: usize,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_label(&self, label_id: &str, name: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.names.insert(label_id.to_string(), name.to_string());
    }

    /// Drop a label and all of its associations.
    pub fn delete_label(&self, label_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.names.remove(label_id);
        inner.associations.remove(label_id);
    }

    pub fn add_association(&self, label_id: &str, jid: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .associations
            .entry(label_id.to_string())
            .or_default()
            .insert(jid.to_string());
    }

    pub fn remove_association(&self, label_id: &str, jid: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = inner.associations.get_mut(label_id) {
            set.remove(jid);
            if set.is_empty() {
                inner.associations.remove(label_id);
            }
        }
    }

    /// Contacts tagged with the label called `name` (case-insensitive).
    pub fn jids_for_label_name(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let Some(label_id) = inner
            .names
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| id.clone())
        else {
            return Vec::new();
        };
        inner
            .associations
            .get(&label_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every known label, including ids seen only through associations.
    pub fn summaries(&self) -> Vec<LabelSummary> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: BTreeSet<&String> = inner.names.keys().collect();
        ids.extend(inner.associations.keys());
        ids.into_iter()
            .map(|id| LabelSummary {
                label_id: id.clone(),
                name: inner.names.get(id).cloned(),
                contacts: inner.associations.get(id).map_or(0, BTreeSet::len),
            })
            .collect()
    }
}
