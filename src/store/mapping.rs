//! The id/label bijection.
//!
//! Both directions live in one struct and change only through [`IdentityMap::bind`]
//! and [`IdentityMap::clear`], so they cannot drift apart.

use std::collections::{BTreeMap, HashMap};

use crate::types::{ContentId, Label};

/// Reasons a pair of persisted maps is not a valid bijection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("content {id} is already bound to label {existing}")]
    IdAlreadyBound { id: ContentId, existing: Label },

    #[error("label {label} is already bound to content {existing}")]
    LabelAlreadyBound { label: Label, existing: ContentId },

    #[error("maps disagree: id {id} -> label {label}, but label {label} -> {back:?}")]
    NotInverse {
        id: ContentId,
        label: Label,
        back: Option<ContentId>,
    },

    #[error("maps have different sizes: {id_to_label} ids, {label_to_id} labels")]
    SizeMismatch {
        id_to_label: usize,
        label_to_id: usize,
    },
}

/// Injective maps `ContentId -> Label` and `Label -> ContentId`, always inverse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    id_to_label: HashMap<ContentId, Label>,
    label_to_id: HashMap<Label, ContentId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a map from its two persisted halves, checking they are inverse.
    pub fn from_parts(
        id_to_label: HashMap<ContentId, Label>,
        label_to_id: HashMap<Label, ContentId>,
    ) -> Result<Self, MappingError> {
        if id_to_label.len() != label_to_id.len() {
            return Err(MappingError::SizeMismatch {
                id_to_label: id_to_label.len(),
                label_to_id: label_to_id.len(),
            });
        }

        for (id, label) in &id_to_label {
            let back = label_to_id.get(label).copied();
            if back != Some(*id) {
                return Err(MappingError::NotInverse {
                    id: *id,
                    label: *label,
                    back,
                });
            }
        }

        Ok(Self {
            id_to_label,
            label_to_id,
        })
    }

    /// Records `id <-> label`. Fails without changing anything if either
    /// side is already bound.
    pub fn bind(&mut self, id: ContentId, label: Label) -> Result<(), MappingError> {
        if let Some(existing) = self.id_to_label.get(&id) {
            return Err(MappingError::IdAlreadyBound {
                id,
                existing: *existing,
            });
        }
        if let Some(existing) = self.label_to_id.get(&label) {
            return Err(MappingError::LabelAlreadyBound {
                label,
                existing: *existing,
            });
        }

        self.id_to_label.insert(id, label);
        self.label_to_id.insert(label, id);
        Ok(())
    }

    pub fn label_of(&self, id: ContentId) -> Option<Label> {
        self.id_to_label.get(&id).copied()
    }

    pub fn id_of(&self, label: Label) -> Option<ContentId> {
        self.label_to_id.get(&label).copied()
    }

    pub fn contains_id(&self, id: ContentId) -> bool {
        self.id_to_label.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.id_to_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_label.is_empty()
    }

    pub fn clear(&mut self) {
        self.id_to_label.clear();
        self.label_to_id.clear();
    }

    /// Highest bound label, if any.
    pub fn max_label(&self) -> Option<Label> {
        self.label_to_id.keys().max().copied()
    }

    /// `id -> label` ordered by id, for stable serialization.
    pub fn id_to_label_sorted(&self) -> BTreeMap<u64, usize> {
        self.id_to_label
            .iter()
            .map(|(id, label)| (id.value(), label.value()))
            .collect()
    }

    /// `label -> id` ordered by label, for stable serialization.
    pub fn label_to_id_sorted(&self) -> BTreeMap<usize, u64> {
        self.label_to_id
            .iter()
            .map(|(label, id)| (label.value(), id.value()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContentId, Label)> + '_ {
        self.id_to_label.iter().map(|(id, label)| (*id, *label))
    }

    /// Checks that both directions agree. Always true for maps built through
    /// this type; used by tests and load-time validation.
    pub fn is_bijective(&self) -> bool {
        self.id_to_label.len() == self.label_to_id.len()
            && self
                .id_to_label
                .iter()
                .all(|(id, label)| self.label_to_id.get(label) == Some(id))
    }
}
