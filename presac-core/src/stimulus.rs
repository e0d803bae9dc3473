use presac_cache::{Atom, intern};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stimulus image (its file stem).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StimulusId(Atom);

impl StimulusId {
    pub fn new(name: &str) -> Self {
        Self(Atom::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dense id used to index render caches.
    pub fn cache_id(&self) -> usize {
        intern(&self.0)
    }
}

impl From<String> for StimulusId {
    fn from(s: String) -> Self {
        Self(Atom::from(s))
    }
}

impl From<&str> for StimulusId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<StimulusId> for String {
    fn from(id: StimulusId) -> Self {
        id.0.to_string()
    }
}

impl fmt::Display for StimulusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the three fixed on-screen stimulus positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Left,
    Center,
    Right,
}

pub const SLOTS: [Slot; 3] = [Slot::Left, Slot::Center, Slot::Right];

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::Left => 0,
            Slot::Center => 1,
            Slot::Right => 2,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        SLOTS.get(i).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Slot::Left => "left",
            Slot::Center => "center",
            Slot::Right => "right",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stimulus_ids_compare_by_name() {
        assert_eq!(StimulusId::new("apple"), StimulusId::from("apple".to_string()));
        assert_ne!(StimulusId::new("apple"), StimulusId::new("pear"));
        assert_eq!(
            StimulusId::new("apple").cache_id(),
            StimulusId::new("apple").cache_id()
        );
    }

    #[test]
    fn stimulus_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&StimulusId::new("lamp")).unwrap();
        assert_eq!(json, "\"lamp\"");
        let back: StimulusId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "lamp");
    }

    #[test]
    fn slot_indices() {
        for (i, slot) in SLOTS.iter().enumerate() {
            assert_eq!(slot.index(), i);
            assert_eq!(Slot::from_index(i), Some(*slot));
        }
        assert_eq!(Slot::from_index(3), None);
    }
}
