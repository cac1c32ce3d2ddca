use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::positions::{PositionCode, expand_position_field, parse_position_list};

/// One scouting row: identity fields plus raw 0-20 attribute ratings keyed by
/// their short code ("Acc", "Fin", "L Th", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub club: String,
    #[serde(default)]
    pub nationality: String,
    /// Comma separated position codes, expanded ("DC, DM") or scouting style ("D (C), DM").
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub left_foot: String,
    #[serde(default)]
    pub right_foot: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl PlayerRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            club: String::new(),
            nationality: String::new(),
            position: String::new(),
            left_foot: String::new(),
            right_foot: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Missing attributes read as 0.
    pub fn attribute(&self, code: &str) -> f64 {
        self.attributes.get(code).copied().unwrap_or(0.0)
    }

    pub fn positions(&self) -> Vec<PositionCode> {
        if self.position.contains('(') || self.position.contains('/') {
            parse_position_list(&expand_position_field(&self.position))
        } else {
            parse_position_list(&self.position)
        }
    }

    pub fn is_goalkeeper_only(&self) -> bool {
        let positions = self.positions();
        !positions.is_empty() && positions.iter().all(|p| *p == PositionCode::GK)
    }

    /// Free agents come through as an empty club or the literal "0".
    pub fn has_club(&self) -> bool {
        let club = self.club.trim();
        !club.is_empty() && club != "0"
    }

    pub fn surname(&self) -> &str {
        self.name.split_whitespace().last().unwrap_or("Unknown")
    }
}

/// Load a roster from a `.json` array of records or a scouting `.csv` export.
pub fn load_roster(path: &Path) -> Result<Vec<PlayerRecord>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read roster {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => parse_roster_json(&raw),
        "csv" => parse_roster_csv(&raw),
        other => Err(anyhow!("unsupported roster format {other:?}")),
    }
}

pub fn parse_roster_json(raw: &str) -> Result<Vec<PlayerRecord>> {
    serde_json::from_str::<Vec<PlayerRecord>>(raw).context("parse roster json")
}

/// Parse a scouting CSV export.
///
/// The first `Nat` column is the nationality; a later `Nat` is the Natural
/// Fitness attribute. Columns that are not identity fields and hold numbers
/// (or `a-b` ranges) become attributes; rows named `"0"` are dropped.
pub fn parse_roster_csv(raw: &str) -> Result<Vec<PlayerRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let headers = reader.headers().context("read roster headers")?.clone();

    let mut nationality_col: Option<usize> = None;
    for (idx, header) in headers.iter().enumerate() {
        if header == "Nationality" || (header == "Nat" && nationality_col.is_none()) {
            nationality_col = Some(idx);
        }
    }

    let mut players = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read roster row {}", row_idx + 1))?;
        let mut player = PlayerRecord::new("");
        for (idx, header) in headers.iter().enumerate() {
            let value = record.get(idx).unwrap_or("").trim();
            if Some(idx) == nationality_col {
                player.nationality = value.to_string();
                continue;
            }
            match header {
                "Name" => player.name = value.to_string(),
                "Club" => player.club = value.to_string(),
                "Position" => player.position = value.to_string(),
                "Left Foot" => player.left_foot = value.to_string(),
                "Right Foot" => player.right_foot = value.to_string(),
                _ => {
                    if let Some(rating) = parse_rating(value) {
                        player.attributes.insert(header.to_string(), rating);
                    }
                }
            }
        }
        if player.name.is_empty() || player.name == "0" {
            continue;
        }
        players.push(player);
    }
    Ok(players)
}

/// Read a rating cell: plain numbers, `a-b` ranges as their midpoint, and
/// empty or `-` cells as 0. Text cells yield `None`.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Some(0.0);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Some(v);
    }
    let (lo, hi) = raw.split_once('-')?;
    let lo = lo.trim().parse::<f64>().ok()?;
    let hi = hi.trim().parse::<f64>().ok()?;
    Some((lo + hi) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_cells() {
        assert_eq!(parse_rating("14"), Some(14.0));
        assert_eq!(parse_rating("12-15"), Some(13.5));
        assert_eq!(parse_rating("-"), Some(0.0));
        assert_eq!(parse_rating("Model Citizen"), None);
    }

    #[test]
    fn csv_first_nat_is_nationality() {
        let raw = "Name,Nat,Club,Position,Left Foot,Right Foot,Acc,Nat,Personality\n\
                   Jan Novak,CZE,Sparta,\"D (RC), DM\",Weak,Very Strong,14,12-14,Balanced\n\
                   0,ENG,None,GK,,,1,1,\n";
        let players = parse_roster_csv(raw).expect("csv parses");
        assert_eq!(players.len(), 1);
        let p = &players[0];
        assert_eq!(p.nationality, "CZE");
        assert_eq!(p.attribute("Acc"), 14.0);
        assert_eq!(p.attribute("Nat"), 13.0);
        assert_eq!(p.attribute("Personality"), 0.0);
        assert_eq!(
            p.positions(),
            vec![PositionCode::DC, PositionCode::DM, PositionCode::DR]
        );
    }

    #[test]
    fn free_agent_and_goalkeeper_flags() {
        let mut p = PlayerRecord::new("Alex Keeper");
        p.position = "GK".into();
        p.club = "0".into();
        assert!(p.is_goalkeeper_only());
        assert!(!p.has_club());
        assert_eq!(p.surname(), "Keeper");
    }
}
