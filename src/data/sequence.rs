// sequence.rs - Protein sequence records supplied by the storage layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a sequence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Curated reference bacteriocin
    Reference,
    /// Candidate under investigation
    Candidate,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Reference => "reference",
            Origin::Candidate => "candidate",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protein sequence
///
/// Residues are upper-cased and stripped of whitespace on construction and
/// never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    id: String,
    name: String,
    residues: String,
    origin: Origin,
}

impl Sequence {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        residues: &str,
        origin: Origin,
    ) -> Self {
        let residues = residues
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_uppercase())
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            residues,
            origin,
        }
    }

    /// Candidate sequence whose name equals its id
    pub fn candidate(id: impl Into<String>, residues: &str) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, residues, Origin::Candidate)
    }

    /// Reference sequence whose name equals its id
    pub fn reference(id: impl Into<String>, residues: &str) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, residues, Origin::Reference)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn residues(&self) -> &str {
        &self.residues
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Label used in trees and alignment output: `id` or `id_name`
    pub fn label(&self) -> String {
        if self.name.is_empty() || self.name == self.id {
            self.id.clone()
        } else {
            format!("{}_{}", self.id, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residues_are_normalised() {
        let seq = Sequence::new("s1", "nisin", " itsi slc\ntpg ", Origin::Reference);
        assert_eq!(seq.residues(), "ITSISLCTPG");
        assert_eq!(seq.len(), 10);
        assert_eq!(seq.origin(), Origin::Reference);
    }

    #[test]
    fn test_label() {
        assert_eq!(Sequence::candidate("A", "MK").label(), "A");
        let named = Sequence::new("7", "pediocin PA-1", "KYYGNGV", Origin::Reference);
        assert_eq!(named.label(), "7_pediocin PA-1");
    }

    #[test]
    fn test_origin_serializes_lowercase() {
        let json = serde_json::to_string(&Origin::Candidate).unwrap();
        assert_eq!(json, "\"candidate\"");
    }
}
