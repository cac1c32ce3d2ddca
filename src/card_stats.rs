use std::collections::BTreeMap;

use serde::Serialize;

use crate::player::PlayerRecord;
use crate::positions::{CardPosition, PositionCode};
use crate::weights::{AttributeMapping, AttributeWeightProfile};

/// Raw ratings are 0-20; x5 puts them on 0-100 and the card curve adds 5%.
pub const OVERALL_SCALE: f64 = 5.0 * 1.05;
pub const CATEGORY_SCALE: f64 = 5.075;
pub const ATTRIBUTE_SCALE: f64 = 5.025;
pub const MAX_SECONDARY_POSITIONS: usize = 3;

/// Seven-point foot strength scale used by scouting exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FootRating {
    Unknown,
    VeryWeak,
    Weak,
    FairlyWeak,
    Reasonable,
    FairlyStrong,
    Strong,
    VeryStrong,
}

impl FootRating {
    /// Accepts the label form ("Fairly Strong") or a 1-5 star value.
    pub fn parse(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase();
        match key.as_str() {
            "very strong" | "5" => FootRating::VeryStrong,
            "strong" | "4" => FootRating::Strong,
            "fairly strong" => FootRating::FairlyStrong,
            "reasonable" | "3" => FootRating::Reasonable,
            "fairly weak" => FootRating::FairlyWeak,
            "weak" | "2" => FootRating::Weak,
            "very weak" | "1" => FootRating::VeryWeak,
            _ => FootRating::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FootRating::Unknown => "Unknown",
            FootRating::VeryWeak => "Very Weak",
            FootRating::Weak => "Weak",
            FootRating::FairlyWeak => "Fairly Weak",
            FootRating::Reasonable => "Reasonable",
            FootRating::FairlyStrong => "Fairly Strong",
            FootRating::Strong => "Strong",
            FootRating::VeryStrong => "Very Strong",
        }
    }

    /// Star value on the card. Unknown feet show a single star.
    pub fn stars(self) -> u8 {
        match self {
            FootRating::VeryStrong => 5,
            FootRating::Strong => 4,
            FootRating::FairlyStrong | FootRating::Reasonable => 3,
            FootRating::FairlyWeak | FootRating::Weak => 2,
            FootRating::VeryWeak | FootRating::Unknown => 1,
        }
    }
}

/// The weak foot is the weaker of the two feet; an unknown foot wins.
pub fn assign_weak_foot(left: FootRating, right: FootRating) -> FootRating {
    left.min(right)
}

/// Skill moves from the flair rating on the 0-100 scale.
pub fn assign_skill_moves(flair: f64) -> u8 {
    if flair >= 90.0 {
        5
    } else if flair >= 80.0 {
        4
    } else if flair >= 70.0 {
        3
    } else if flair >= 30.0 {
        2
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CardFlags {
    pub weak_foot: u8,
    pub skill_moves: u8,
    /// False when neither foot rating was recognised.
    pub weak_foot_known: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardStats {
    pub overall: i32,
    /// Face categories in display order.
    pub categories: Vec<(&'static str, i32)>,
    pub per_attribute: BTreeMap<String, i32>,
    pub flags: CardFlags,
}

impl CardStats {
    pub fn category(&self, name: &str) -> Option<i32> {
        self.categories
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn attribute(&self, code: &str) -> i32 {
        self.per_attribute.get(code).copied().unwrap_or(0)
    }
}

pub fn clamp_stat(value: f64) -> i32 {
    if !value.is_finite() {
        return 1;
    }
    (value.round() as i32).clamp(1, 99)
}

/// Weighted Overall for one position. A position without weights scores the
/// floor value instead of failing.
pub fn overall_score(player: &PlayerRecord, weights: Option<&BTreeMap<String, f64>>) -> i32 {
    let Some(weights) = weights else {
        return clamp_stat(0.0);
    };
    let total_weight: f64 = weights.values().sum();
    if total_weight <= 0.0 {
        return clamp_stat(0.0);
    }
    let weighted: f64 = weights
        .iter()
        .map(|(attr, w)| player.attribute(attr) * (w / total_weight))
        .sum();
    clamp_stat(weighted * OVERALL_SCALE)
}

pub fn compute_card_stats(
    player: &PlayerRecord,
    position: CardPosition,
    profile: &AttributeWeightProfile,
    mapping: AttributeMapping,
) -> CardStats {
    let mut categories = Vec::new();
    let mut per_attribute = BTreeMap::new();

    for (category, attrs) in mapping.categories() {
        let mut weighted = 0.0;
        for (attr, weight) in attrs.iter() {
            let value = player.attribute(attr);
            weighted += value * weight;
            per_attribute.insert(attr.to_string(), clamp_stat(value * ATTRIBUTE_SCALE));
        }
        let max_possible: f64 = attrs.iter().map(|(_, w)| w * 100.0).sum();
        let pct = if max_possible > 0.0 {
            weighted / max_possible * 100.0
        } else {
            0.0
        };
        categories.push((*category, clamp_stat(pct * CATEGORY_SCALE)));
    }

    let foot = assign_weak_foot(
        FootRating::parse(&player.left_foot),
        FootRating::parse(&player.right_foot),
    );

    CardStats {
        overall: overall_score(player, profile.weights_for(position)),
        categories,
        per_attribute,
        flags: CardFlags {
            weak_foot: foot.stars(),
            skill_moves: assign_skill_moves(player.attribute("Fla") * 5.0),
            weak_foot_known: foot != FootRating::Unknown,
        },
    }
}

/// The outcome of scoring a player at every position they can play.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPositions {
    pub primary: CardPosition,
    pub primary_code: PositionCode,
    pub overall: i32,
    /// Up to three other card positions, in roster order.
    pub secondary: Vec<CardPosition>,
    /// Overall at each distinct card position the player is eligible for.
    pub by_position: Vec<(CardPosition, i32)>,
}

impl ScoredPositions {
    pub fn overall_at(&self, pos: CardPosition) -> Option<i32> {
        self.by_position
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, o)| *o)
    }

    /// Primary first, then the capped secondary tags.
    pub fn eligible(&self) -> Vec<CardPosition> {
        let mut out = vec![self.primary];
        out.extend(self.secondary.iter().copied());
        out
    }
}

/// Score every listed position; the best Overall becomes primary (earlier
/// positions win ties). Returns `None` for a player with no usable position.
pub fn score_positions(
    player: &PlayerRecord,
    profile: &AttributeWeightProfile,
) -> Option<ScoredPositions> {
    let codes = player.positions();
    let mut best: Option<(PositionCode, i32)> = None;
    let mut by_position: Vec<(CardPosition, i32)> = Vec::new();

    for code in &codes {
        let pos = code.card_position();
        let overall = overall_score(player, profile.weights_for(pos));
        if !by_position.iter().any(|(p, _)| *p == pos) {
            by_position.push((pos, overall));
        }
        if best.is_none_or(|(_, o)| overall > o) {
            best = Some((*code, overall));
        }
    }

    let (primary_code, overall) = best?;
    let primary = primary_code.card_position();
    let mut secondary: Vec<CardPosition> = Vec::new();
    for code in &codes {
        let pos = code.card_position();
        if pos != primary && !secondary.contains(&pos) {
            secondary.push(pos);
        }
    }
    secondary.truncate(MAX_SECONDARY_POSITIONS);

    Some(ScoredPositions {
        primary,
        primary_code,
        overall,
        secondary,
        by_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player_with(value: f64) -> PlayerRecord {
        let mut p = PlayerRecord::new("Test Player");
        for code in [
            "Acc", "Pac", "Fin", "Lon", "Cmp", "Pas", "Vis", "Dri", "Fir", "Tck", "Mar", "Pos",
            "Str", "Sta", "Fla", "OtB", "Ant", "Hea", "Tec", "Dec",
        ] {
            p.attributes.insert(code.to_string(), value);
        }
        p
    }

    #[test]
    fn weak_foot_takes_the_weaker_side() {
        assert_eq!(
            assign_weak_foot(FootRating::VeryStrong, FootRating::Strong),
            FootRating::Strong
        );
        assert_eq!(
            assign_weak_foot(FootRating::Unknown, FootRating::Unknown),
            FootRating::Unknown
        );
        assert_eq!(FootRating::parse("Fairly Weak").stars(), 2);
        assert_eq!(FootRating::parse("4"), FootRating::Strong);
    }

    #[test]
    fn skill_move_thresholds() {
        assert_eq!(assign_skill_moves(95.0), 5);
        assert_eq!(assign_skill_moves(80.0), 4);
        assert_eq!(assign_skill_moves(70.0), 3);
        assert_eq!(assign_skill_moves(30.0), 2);
        assert_eq!(assign_skill_moves(29.9), 1);
    }

    #[test]
    fn overall_uses_weighted_average() {
        let p = player_with(16.0);
        let profile = AttributeWeightProfile::embedded_default().unwrap();
        // 16 everywhere -> 16 * 5.25 = 84
        assert_eq!(
            overall_score(&p, profile.weights_for(CardPosition::ST)),
            84
        );
    }

    #[test]
    fn stats_stay_in_card_range() {
        let profile = AttributeWeightProfile::embedded_default().unwrap();
        for value in [0.0, 1.0, 10.0, 20.0, 25.0] {
            let p = player_with(value);
            for mapping in [AttributeMapping::Standard, AttributeMapping::Alternate] {
                let stats = compute_card_stats(&p, CardPosition::CM, &profile, mapping);
                assert!((1..=99).contains(&stats.overall));
                assert!(stats.per_attribute.values().all(|v| (1..=99).contains(v)));
                assert!(stats.categories.iter().all(|(_, v)| (1..=99).contains(v)));
            }
        }
    }

    #[test]
    fn unweighted_position_degenerates_to_floor() {
        let p = player_with(18.0);
        let profile = AttributeWeightProfile::default();
        let stats = compute_card_stats(&p, CardPosition::ST, &profile, AttributeMapping::Standard);
        assert_eq!(stats.overall, 1);
    }

    #[test]
    fn primary_is_best_position_and_secondaries_capped() {
        let mut p = player_with(12.0);
        p.attributes.insert("Fin".into(), 20.0);
        p.attributes.insert("OtB".into(), 20.0);
        p.position = "DC, MC, AMC, AMR, STC".into();
        let profile = AttributeWeightProfile::embedded_default().unwrap();
        let scored = score_positions(&p, &profile).expect("has positions");
        assert_eq!(scored.primary, CardPosition::ST);
        assert_eq!(
            scored.secondary,
            vec![CardPosition::CB, CardPosition::CM, CardPosition::CAM]
        );
        assert_eq!(scored.by_position.len(), 5);
        assert_eq!(scored.overall_at(CardPosition::ST), Some(scored.overall));
    }
}
