use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Position codes as they appear in scouting exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PositionCode {
    GK,
    DR,
    DC,
    DL,
    WBR,
    WBL,
    DM,
    MR,
    MC,
    ML,
    AMR,
    AMC,
    AML,
    STC,
}

/// Position labels printed on a card and used by formations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CardPosition {
    GK,
    RB,
    CB,
    LB,
    RWB,
    LWB,
    CDM,
    RM,
    CM,
    LM,
    RW,
    CAM,
    LW,
    ST,
}

pub const ALL_CARD_POSITIONS: [CardPosition; 14] = [
    CardPosition::GK,
    CardPosition::RB,
    CardPosition::CB,
    CardPosition::LB,
    CardPosition::RWB,
    CardPosition::LWB,
    CardPosition::CDM,
    CardPosition::RM,
    CardPosition::CM,
    CardPosition::LM,
    CardPosition::RW,
    CardPosition::CAM,
    CardPosition::LW,
    CardPosition::ST,
];

impl PositionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionCode::GK => "GK",
            PositionCode::DR => "DR",
            PositionCode::DC => "DC",
            PositionCode::DL => "DL",
            PositionCode::WBR => "WBR",
            PositionCode::WBL => "WBL",
            PositionCode::DM => "DM",
            PositionCode::MR => "MR",
            PositionCode::MC => "MC",
            PositionCode::ML => "ML",
            PositionCode::AMR => "AMR",
            PositionCode::AMC => "AMC",
            PositionCode::AML => "AML",
            PositionCode::STC => "STC",
        }
    }

    /// The fixed position map into the card vocabulary.
    pub fn card_position(self) -> CardPosition {
        match self {
            PositionCode::GK => CardPosition::GK,
            PositionCode::DR => CardPosition::RB,
            PositionCode::DC => CardPosition::CB,
            PositionCode::DL => CardPosition::LB,
            PositionCode::WBR => CardPosition::RWB,
            PositionCode::WBL => CardPosition::LWB,
            PositionCode::DM => CardPosition::CDM,
            PositionCode::MR => CardPosition::RM,
            PositionCode::MC => CardPosition::CM,
            PositionCode::ML => CardPosition::LM,
            PositionCode::AMR => CardPosition::RW,
            PositionCode::AMC => CardPosition::CAM,
            PositionCode::AML => CardPosition::LW,
            PositionCode::STC => CardPosition::ST,
        }
    }
}

impl FromStr for PositionCode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let code = match raw.trim().to_ascii_uppercase().as_str() {
            "GK" => PositionCode::GK,
            "DR" => PositionCode::DR,
            "DC" => PositionCode::DC,
            "DL" => PositionCode::DL,
            "WBR" => PositionCode::WBR,
            "WBL" => PositionCode::WBL,
            "DM" | "DMC" => PositionCode::DM,
            "MR" => PositionCode::MR,
            "MC" => PositionCode::MC,
            "ML" => PositionCode::ML,
            "AMR" => PositionCode::AMR,
            "AMC" => PositionCode::AMC,
            "AML" => PositionCode::AML,
            "STC" | "ST" => PositionCode::STC,
            other => return Err(anyhow!("unknown position code {other:?}")),
        };
        Ok(code)
    }
}

impl fmt::Display for PositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CardPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            CardPosition::GK => "GK",
            CardPosition::RB => "RB",
            CardPosition::CB => "CB",
            CardPosition::LB => "LB",
            CardPosition::RWB => "RWB",
            CardPosition::LWB => "LWB",
            CardPosition::CDM => "CDM",
            CardPosition::RM => "RM",
            CardPosition::CM => "CM",
            CardPosition::LM => "LM",
            CardPosition::RW => "RW",
            CardPosition::CAM => "CAM",
            CardPosition::LW => "LW",
            CardPosition::ST => "ST",
        }
    }
}

impl FromStr for CardPosition {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().to_ascii_uppercase();
        ALL_CARD_POSITIONS
            .iter()
            .copied()
            .find(|p| p.as_str() == trimmed)
            .ok_or_else(|| anyhow!("unknown card position {raw:?}"))
    }
}

impl fmt::Display for CardPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an already-expanded comma separated position list ("DC, DM, MC").
/// Unknown entries are skipped; order and duplicates are preserved.
pub fn parse_position_list(raw: &str) -> Vec<PositionCode> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<PositionCode>() {
            Ok(code) => Some(code),
            Err(err) => {
                tracing::debug!("skipping position entry: {err}");
                None
            }
        })
        .collect()
}

/// Expand a scouting-style position field into individual codes.
///
/// `"D/WB (RL), AM (C), ST (C)"` becomes `"AMC, DL, DR, STC, WBL, WBR"`:
/// every role before the bracket is combined with every side inside it.
/// The output is sorted and de-duplicated.
pub fn expand_position_field(raw: &str) -> String {
    let mut expanded: BTreeSet<String> = BTreeSet::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (roles, sides) = match entry.split_once('(') {
            Some((roles, rest)) => (roles, rest.replace(')', "")),
            None => (entry, String::new()),
        };
        for role in roles.split('/') {
            let role = role.trim();
            if role.is_empty() {
                continue;
            }
            if sides.trim().is_empty() {
                expanded.insert(role.to_string());
                continue;
            }
            for side in sides.trim().chars().filter(|c| !c.is_whitespace()) {
                expanded.insert(format!("{role}{side}"));
            }
        }
    }
    expanded.into_iter().collect::<Vec<_>>().join(", ")
}

/// Card positions a list of codes is eligible for, first occurrence wins.
pub fn distinct_card_positions(codes: &[PositionCode]) -> Vec<CardPosition> {
    let mut out: Vec<CardPosition> = Vec::with_capacity(codes.len());
    for code in codes {
        let pos = code.card_position();
        if !out.contains(&pos) {
            out.push(pos);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_roles_and_sides() {
        assert_eq!(
            expand_position_field("D/WB (RL), AM (C), ST (C)"),
            "AMC, DL, DR, STC, WBL, WBR"
        );
        assert_eq!(expand_position_field("GK"), "GK");
        assert_eq!(expand_position_field("DM, M (C)"), "DM, MC");
    }

    #[test]
    fn parses_aliases_and_skips_unknown() {
        let codes = parse_position_list("ST, DMC, XX, AMC");
        assert_eq!(
            codes,
            vec![PositionCode::STC, PositionCode::DM, PositionCode::AMC]
        );
    }

    #[test]
    fn position_map_is_many_to_one_safe() {
        let codes = parse_position_list("STC, ST, AMR");
        assert_eq!(
            distinct_card_positions(&codes),
            vec![CardPosition::ST, CardPosition::RW]
        );
    }
}
