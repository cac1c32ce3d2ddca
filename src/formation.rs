use std::collections::HashMap;
use std::fmt;

use anyhow::{Result, anyhow};

use crate::card_stats::ScoredPositions;
use crate::error::SquadError;
use crate::positions::CardPosition;

pub const MIN_STARTERS: usize = 10;
pub const MIN_WITH_BENCH: usize = 17;
pub const BENCH_SIZE: usize = 7;
pub const DEFAULT_FORMATION: &str = "4-3-3(2)";

/// Pixel nudge of a slot inside its row. Negative vertical moves the card up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotOffset {
    pub vertical: i32,
    pub horizontal: i32,
}

pub fn slot_offset(pos: CardPosition) -> SlotOffset {
    let (vertical, horizontal) = match pos {
        CardPosition::LW => (40, 15),
        CardPosition::RW => (40, -15),
        CardPosition::LM => (30, 15),
        CardPosition::RM => (30, -15),
        CardPosition::LB => (-40, 15),
        CardPosition::RB => (-40, -15),
        CardPosition::LWB => (-60, 15),
        CardPosition::RWB => (-60, -15),
        CardPosition::CAM => (-10, 0),
        CardPosition::CDM => (10, 0),
        CardPosition::GK
        | CardPosition::CB
        | CardPosition::CM
        | CardPosition::ST => (0, 0),
    };
    SlotOffset {
        vertical,
        horizontal,
    }
}

/// Rows of outfield slots, attack first. Goalkeepers never appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormationTemplate {
    pub name: String,
    pub rows: Vec<Vec<CardPosition>>,
}

const BUILTIN: &[(&str, &[&str])] = &[
    ("4-3-3(2)", &["LW,ST,RW", "CM,CDM,CM", "LB,CB,CB,RB"]),
    ("4-3-3", &["LW,ST,RW", "CM,CM,CM", "LB,CB,CB,RB"]),
    ("4-4-2", &["ST,ST", "LM,CM,CM,RM", "LB,CB,CB,RB"]),
    ("4-2-3-1", &["ST", "CAM,CAM,CAM", "CDM,CDM", "LB,CB,CB,RB"]),
    ("4-1-2-1-2", &["ST,ST", "CAM", "CM,CM", "CDM", "LB,CB,CB,RB"]),
    ("4-1-4-1", &["ST", "LM,CM,CM,RM", "CDM", "LB,CB,CB,RB"]),
    ("3-5-2", &["ST,ST", "LM,CDM,CAM,CDM,RM", "CB,CB,CB"]),
    ("3-4-3", &["LW,ST,RW", "LM,CM,CM,RM", "CB,CB,CB"]),
    ("5-3-2", &["ST,ST", "CM,CM,CM", "LWB,CB,CB,CB,RWB"]),
];

impl FormationTemplate {
    /// Parse rows written as comma separated card positions ("LW,ST,RW").
    pub fn parse(name: &str, rows: &[&str]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            let slots = row
                .split(',')
                .map(|s| s.trim().parse::<CardPosition>())
                .collect::<Result<Vec<_>>>()?;
            if slots.is_empty() {
                return Err(anyhow!("formation {name} has an empty row"));
            }
            if slots.contains(&CardPosition::GK) {
                return Err(anyhow!("formation {name} lists a goalkeeper slot"));
            }
            parsed.push(slots);
        }
        if parsed.is_empty() {
            return Err(anyhow!("formation {name} has no rows"));
        }
        Ok(Self {
            name: name.to_string(),
            rows: parsed,
        })
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let (name, rows) = BUILTIN.iter().find(|(n, _)| *n == name.trim())?;
        Self::parse(name, rows).ok()
    }

    pub fn by_name(name: &str) -> Result<Self, SquadError> {
        Self::builtin(name).ok_or_else(|| SquadError::UnknownFormation(name.to_string()))
    }

    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.iter().map(|(n, _)| *n).collect()
    }

    /// Row-major slots.
    pub fn slots(&self) -> Vec<CardPosition> {
        self.rows.iter().flatten().copied().collect()
    }

    pub fn slot_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn widest_row(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl fmt::Display for FormationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A roster row ready for slot matching.
#[derive(Debug, Clone, PartialEq)]
pub struct SquadCandidate {
    pub roster_index: usize,
    pub name: String,
    /// Overall at the primary position; orders the bench.
    pub overall: i32,
    /// Primary first, then the secondary tags, each with its own Overall.
    pub positions: Vec<(CardPosition, i32)>,
}

impl SquadCandidate {
    pub fn from_scored(roster_index: usize, name: &str, scored: &ScoredPositions) -> Self {
        let positions = scored
            .eligible()
            .into_iter()
            .map(|pos| (pos, scored.overall_at(pos).unwrap_or(scored.overall)))
            .collect();
        Self {
            roster_index,
            name: name.to_string(),
            overall: scored.overall,
            positions,
        }
    }

    pub fn overall_at(&self, pos: CardPosition) -> Option<i32> {
        self.positions
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, o)| *o)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    /// `"{position}_{occurrence}"`, counting occurrences of the position in row-major order.
    pub key: String,
    pub position: CardPosition,
    pub row: usize,
    pub column: usize,
    /// Index into the candidate slice, `None` when nobody fits.
    pub player: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquadAssignment {
    pub slots: Vec<SlotAssignment>,
    pub bench: Vec<usize>,
}

impl SquadAssignment {
    pub fn slot(&self, key: &str) -> Option<&SlotAssignment> {
        self.slots.iter().find(|s| s.key == key)
    }

    pub fn assigned(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(|s| s.player)
    }
}

pub fn required_players(include_bench: bool) -> usize {
    if include_bench { MIN_WITH_BENCH } else { MIN_STARTERS }
}

/// Greedy slot filling: each slot, in row-major order, takes the strongest
/// unused candidate for its position. Ties keep roster order.
pub fn assign(
    candidates: &[SquadCandidate],
    formation: &FormationTemplate,
    include_bench: bool,
) -> Result<SquadAssignment, SquadError> {
    let required = required_players(include_bench);
    if candidates.len() < required {
        return Err(SquadError::NotEnoughPlayers { required });
    }

    let mut rankings: HashMap<CardPosition, Vec<usize>> = HashMap::new();
    let mut occurrences: HashMap<CardPosition, usize> = HashMap::new();
    let mut used = vec![false; candidates.len()];
    let mut slots = Vec::with_capacity(formation.slot_count());

    for (row_idx, row) in formation.rows.iter().enumerate() {
        for (col_idx, pos) in row.iter().copied().enumerate() {
            let ranked = rankings
                .entry(pos)
                .or_insert_with(|| rank_for_position(candidates, pos));
            let pick = ranked.iter().copied().find(|idx| !used[*idx]);
            if let Some(idx) = pick {
                used[idx] = true;
            } else {
                tracing::debug!("no candidate left for {pos} in {formation}");
            }
            let occurrence = occurrences.entry(pos).or_insert(0);
            slots.push(SlotAssignment {
                key: format!("{pos}_{occurrence}"),
                position: pos,
                row: row_idx,
                column: col_idx,
                player: pick,
            });
            *occurrence += 1;
        }
    }

    let mut bench = Vec::new();
    if include_bench {
        let mut rest: Vec<usize> = (0..candidates.len()).filter(|idx| !used[*idx]).collect();
        rest.sort_by_key(|idx| std::cmp::Reverse(candidates[*idx].overall));
        rest.truncate(BENCH_SIZE);
        bench = rest;
    }

    Ok(SquadAssignment { slots, bench })
}

fn rank_for_position(candidates: &[SquadCandidate], pos: CardPosition) -> Vec<usize> {
    let mut ranked: Vec<(usize, i32)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| c.overall_at(pos).map(|o| (idx, o)))
        .collect();
    ranked.sort_by_key(|(_, o)| std::cmp::Reverse(*o));
    ranked.into_iter().map(|(idx, _)| idx).collect()
}
