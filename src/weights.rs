use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::positions::CardPosition;

const EMBEDDED_WEIGHTS: &str = include_str!("../assets/position_weights.json");

/// Per card position, attribute code -> non-negative weight. Read-only once
/// loaded; the engine shares one instance across all renders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeWeightProfile {
    positions: BTreeMap<CardPosition, BTreeMap<String, f64>>,
}

impl AttributeWeightProfile {
    pub fn embedded_default() -> Result<Self> {
        Self::from_json(EMBEDDED_WEIGHTS).context("parse embedded position weights")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let profile = serde_json::from_str::<Self>(raw).context("parse position weights")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read position weights {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load {}", path.display()))
    }

    /// Load the embedded table and layer the optional file on top of it.
    pub fn load_with_override(path: Option<&Path>) -> Result<Self> {
        let base = Self::embedded_default()?;
        match path {
            Some(path) => Ok(base.with_override(Self::load(path)?)),
            None => Ok(base),
        }
    }

    /// The more specific table wins: every position present in `other`
    /// replaces this profile's weights for that position wholesale.
    pub fn with_override(mut self, other: Self) -> Self {
        for (pos, weights) in other.positions {
            self.positions.insert(pos, weights);
        }
        self
    }

    pub fn set_position(&mut self, pos: CardPosition, weights: BTreeMap<String, f64>) {
        self.positions.insert(pos, weights);
    }

    pub fn weights_for(&self, pos: CardPosition) -> Option<&BTreeMap<String, f64>> {
        self.positions.get(&pos)
    }

    fn validate(&self) -> Result<()> {
        for (pos, weights) in &self.positions {
            for (attr, w) in weights {
                if !w.is_finite() || *w < 0.0 {
                    return Err(anyhow!("weight for {pos}/{attr} must be non-negative, got {w}"));
                }
            }
        }
        Ok(())
    }
}

/// Which attribute bundle feeds the category stats on the card face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeMapping {
    #[default]
    Standard,
    Alternate,
}

pub type CategoryTable = &'static [(&'static str, &'static [(&'static str, f64)])];

const STANDARD_MAPPING: CategoryTable = &[
    ("PAC", &[("Acc", 1.0), ("Pac", 1.0)]),
    (
        "SHO",
        &[("Fin", 3.0), ("Lon", 1.5), ("Cmp", 1.0), ("Fre", 0.5), ("Pen", 0.5)],
    ),
    (
        "PAS",
        &[("Pas", 3.0), ("Vis", 2.0), ("Cro", 1.0), ("Cor", 0.5), ("Tec", 1.0)],
    ),
    (
        "DRI",
        &[("Dri", 3.0), ("Fir", 2.0), ("Agi", 1.0), ("Bal", 1.0), ("Fla", 1.0)],
    ),
    (
        "DEF",
        &[("Tck", 3.0), ("Mar", 3.0), ("Pos", 2.0), ("Hea", 1.0), ("Ant", 1.0)],
    ),
    (
        "PHY",
        &[
            ("Str", 3.0),
            ("Sta", 2.0),
            ("Jum", 1.0),
            ("Agg", 1.0),
            ("Bra", 0.5),
            ("L Th", 0.25),
        ],
    ),
];

// Leans on the mental attributes that the standard bundle ignores.
const ALTERNATE_MAPPING: CategoryTable = &[
    ("PAC", &[("Acc", 2.0), ("Pac", 2.0), ("Agi", 1.0)]),
    (
        "SHO",
        &[("Fin", 3.0), ("Lon", 2.0), ("Cmp", 2.0), ("OtB", 1.0), ("Fre", 1.0)],
    ),
    (
        "PAS",
        &[
            ("Pas", 3.0),
            ("Vis", 3.0),
            ("Tea", 1.0),
            ("Dec", 1.0),
            ("Cro", 1.0),
            ("Tec", 1.0),
        ],
    ),
    (
        "DRI",
        &[("Dri", 3.0), ("Fir", 2.0), ("Fla", 2.0), ("Agi", 1.0), ("Bal", 1.0)],
    ),
    (
        "DEF",
        &[
            ("Tck", 3.0),
            ("Mar", 3.0),
            ("Pos", 3.0),
            ("Ant", 2.0),
            ("Cnt", 1.0),
            ("Bra", 1.0),
        ],
    ),
    (
        "PHY",
        &[
            ("Str", 3.0),
            ("Sta", 2.0),
            ("Wor", 2.0),
            ("Jum", 1.0),
            ("Agg", 1.0),
            ("Det", 1.0),
        ],
    ),
];

impl AttributeMapping {
    pub fn from_flag(use_alt: bool) -> Self {
        if use_alt {
            AttributeMapping::Alternate
        } else {
            AttributeMapping::Standard
        }
    }

    pub fn categories(self) -> CategoryTable {
        match self {
            AttributeMapping::Standard => STANDARD_MAPPING,
            AttributeMapping::Alternate => ALTERNATE_MAPPING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_profile_covers_every_position() {
        let profile = AttributeWeightProfile::embedded_default().expect("embedded weights parse");
        for pos in crate::positions::ALL_CARD_POSITIONS {
            let weights = profile.weights_for(pos).expect("position present");
            assert!(weights.values().sum::<f64>() > 0.0, "{pos} has weight");
        }
    }

    #[test]
    fn override_replaces_whole_position() {
        let base = AttributeWeightProfile::embedded_default().unwrap();
        let over = AttributeWeightProfile::from_json(r#"{"ST": {"Fin": 1.0}}"#).unwrap();
        let merged = base.with_override(over);
        let st = merged.weights_for(CardPosition::ST).unwrap();
        assert_eq!(st.len(), 1);
        assert!(merged.weights_for(CardPosition::CB).unwrap().len() > 1);
    }

    #[test]
    fn negative_weights_rejected() {
        assert!(AttributeWeightProfile::from_json(r#"{"CB": {"Tck": -1}}"#).is_err());
    }
}
