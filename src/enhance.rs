use rand::Rng;

use crate::card_stats::CardStats;
use crate::tiers::{CardTier, TierFamily};

pub const STAT_CAP: i32 = 99;
pub const FLAG_CAP: u8 = 5;
pub const PLAYSTYLE_THRESHOLD: i32 = 90;
pub const PLAYSTYLE_MIN_OVERALL: i32 = 75;

/// `(exclusive upper bound, min %, max %)`; the last row catches the rest.
type PercentTable = &'static [(i32, f64, f64)];
/// `(inclusive upper bound, min, max)`; the last row catches the rest.
type AdditiveTable = &'static [(i32, i32, i32)];

const ICON_OVERALL_PCT: PercentTable = &[
    (25, 80.0, 120.0),
    (40, 55.0, 77.0),
    (50, 45.0, 60.0),
    (60, 30.0, 50.0),
    (70, 13.0, 20.0),
    (75, 12.0, 24.0),
    (85, 7.0, 12.0),
    (90, 6.0, 10.0),
    (95, 5.0, 8.0),
    (i32::MAX, 4.0, 7.0),
];

const ICON_STAT_PCT: PercentTable = &[
    (25, 80.0, 120.0),
    (40, 50.0, 70.0),
    (50, 35.0, 50.0),
    (60, 28.0, 48.0),
    (70, 12.0, 23.0),
    (75, 14.0, 18.0),
    (85, 11.0, 16.0),
    (90, 7.0, 11.0),
    (95, 5.0, 7.0),
    (i32::MAX, 2.0, 5.0),
];

const HERO_STAT_PCT: PercentTable = &[
    (25, 70.0, 110.0),
    (40, 50.0, 67.0),
    (50, 40.0, 55.0),
    (60, 25.0, 46.0),
    (70, 6.0, 13.0),
    (75, 6.0, 11.0),
    (85, 5.0, 8.0),
    (90, 4.0, 7.0),
    (95, 3.0, 5.0),
    (i32::MAX, 2.0, 4.0),
];

const TOTY_STAT_PCT: PercentTable = &[
    (25, 90.0, 150.0),
    (40, 65.0, 120.0),
    (50, 55.0, 85.0),
    (60, 40.0, 60.0),
    (70, 35.0, 44.0),
    (75, 24.0, 38.0),
    (85, 18.0, 35.0),
    (90, 13.0, 25.0),
    (95, 7.0, 13.0),
    (i32::MAX, 6.0, 10.0),
];

const POTM_STAT_PCT: PercentTable = &[
    (50, 20.0, 35.0),
    (70, 10.0, 19.0),
    (85, 6.0, 13.0),
    (i32::MAX, 3.0, 10.0),
];

const HERO_OVERALL: AdditiveTable = &[
    (45, 30, 40),
    (50, 25, 35),
    (55, 19, 25),
    (60, 17, 24),
    (65, 16, 22),
    (70, 11, 16),
    (75, 7, 11),
    (80, 4, 9),
    (85, 3, 7),
    (90, 2, 5),
    (95, 1, 3),
    (i32::MAX, 1, 2),
];

// Also the per-stat table for the special family.
const POTM_OVERALL: AdditiveTable = &[
    (45, 20, 30),
    (50, 18, 24),
    (55, 17, 22),
    (60, 15, 21),
    (65, 13, 19),
    (70, 12, 17),
    (75, 7, 12),
    (80, 5, 8),
    (85, 3, 4),
    (90, 2, 3),
    (i32::MAX, 1, 1),
];

const SPECIAL_OVERALL: AdditiveTable = &[
    (45, 20, 30),
    (50, 18, 24),
    (55, 17, 22),
    (60, 15, 21),
    (65, 13, 19),
    (70, 12, 17),
    (75, 11, 12),
    (80, 5, 8),
    (85, 2, 4),
    (90, 1, 3),
    (i32::MAX, 1, 1),
];

/// TOTY Overall lands in a band picked by the current rating.
const TOTY_TARGET: AdditiveTable = &[
    (70, 88, 93),
    (80, 90, 94),
    (85, 92, 96),
    (90, 94, 99),
    (95, 95, 99),
    (i32::MAX, 99, 99),
];

#[derive(Debug, Clone, Copy)]
enum Boost {
    Percent(PercentTable),
    Additive(AdditiveTable),
    /// Additive draw `e`, then a uniform pick in `e..=e+3`.
    AdditiveJitter(AdditiveTable),
    Target(AdditiveTable),
}

impl Boost {
    fn increase<R: Rng>(self, value: i32, rng: &mut R) -> i32 {
        let inc = match self {
            Boost::Percent(table) => {
                let (_, lo, hi) = percent_bucket(table, value);
                let pct = rng.gen_range(lo..=hi);
                (f64::from(value) * pct / 100.0).ceil() as i32
            }
            Boost::Additive(table) => draw_additive(table, value, rng),
            Boost::AdditiveJitter(table) => {
                let e = draw_additive(table, value, rng);
                rng.gen_range(e..=e + 3)
            }
            Boost::Target(table) => draw_additive(table, value, rng) - value,
        };
        inc.max(0)
    }
}

fn percent_bucket(table: PercentTable, value: i32) -> (i32, f64, f64) {
    table
        .iter()
        .copied()
        .find(|(below, _, _)| value < *below)
        .unwrap_or((i32::MAX, 0.0, 0.0))
}

fn draw_additive<R: Rng>(table: AdditiveTable, value: i32, rng: &mut R) -> i32 {
    let (_, lo, hi) = table
        .iter()
        .copied()
        .find(|(upto, _, _)| value <= *upto)
        .unwrap_or((i32::MAX, 0, 0));
    rng.gen_range(lo..=hi)
}

#[derive(Debug, Clone, Copy)]
struct Pass {
    overall: Boost,
    attributes: Boost,
    categories: Boost,
}

fn family_pass(family: TierFamily) -> Option<Pass> {
    let pass = match family {
        TierFamily::Normal => return None,
        TierFamily::Icon => Pass {
            overall: Boost::Percent(ICON_OVERALL_PCT),
            attributes: Boost::Percent(ICON_STAT_PCT),
            categories: Boost::Percent(ICON_STAT_PCT),
        },
        TierFamily::Hero => Pass {
            overall: Boost::Additive(HERO_OVERALL),
            attributes: Boost::Percent(HERO_STAT_PCT),
            categories: Boost::Percent(HERO_STAT_PCT),
        },
        TierFamily::Toty => Pass {
            overall: Boost::Target(TOTY_TARGET),
            attributes: Boost::Percent(TOTY_STAT_PCT),
            categories: Boost::Percent(TOTY_STAT_PCT),
        },
        TierFamily::Potm => Pass {
            overall: Boost::Additive(POTM_OVERALL),
            attributes: Boost::Percent(POTM_STAT_PCT),
            categories: Boost::Percent(POTM_STAT_PCT),
        },
        TierFamily::Special => Pass {
            overall: Boost::Additive(SPECIAL_OVERALL),
            attributes: Boost::AdditiveJitter(POTM_OVERALL),
            categories: Boost::Additive(POTM_OVERALL),
        },
    };
    Some(pass)
}

/// How many times a family's pass runs for a given upgrade count.
pub fn pass_count(family: TierFamily, upgrades: u32) -> u32 {
    match family {
        TierFamily::Normal => 0,
        TierFamily::Icon | TierFamily::Hero | TierFamily::Toty => 1,
        TierFamily::Potm | TierFamily::Special => upgrades,
    }
}

fn apply_pass<R: Rng>(stats: &mut CardStats, pass: Pass, rng: &mut R) {
    stats.overall = (stats.overall + pass.overall.increase(stats.overall, rng)).min(STAT_CAP);
    for value in stats.per_attribute.values_mut() {
        *value = (*value + pass.attributes.increase(*value, rng)).min(STAT_CAP);
    }
    for (_, value) in stats.categories.iter_mut() {
        *value = (*value + pass.categories.increase(*value, rng)).min(STAT_CAP);
    }
    let flags = &mut stats.flags;
    flags.weak_foot = (flags.weak_foot + rng.gen_range(0..=1)).min(FLAG_CAP);
    flags.skill_moves = (flags.skill_moves + rng.gen_range(0..=1)).min(FLAG_CAP);
}

/// Overlay icon awarded when every attribute of the set reaches 90.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playstyle {
    pub name: &'static str,
    pub attributes: &'static [&'static str],
}

impl Playstyle {
    pub fn icon_path(&self, tier: CardTier) -> String {
        format!("playstyles/{}_playstyles/{}.png", tier.key(), self.name)
    }
}

pub const PLAYSTYLES: &[Playstyle] = &[
    Playstyle { name: "rapid", attributes: &["Acc", "Pac"] },
    Playstyle { name: "quick_step", attributes: &["Acc", "Agi"] },
    Playstyle { name: "technical", attributes: &["Dri", "Tec", "Fir"] },
    Playstyle { name: "first_touch", attributes: &["Fir", "Cmp"] },
    Playstyle { name: "flair", attributes: &["Fla", "Tec"] },
    Playstyle { name: "trickster", attributes: &["Fla", "Dri", "Agi"] },
    Playstyle { name: "press_proven", attributes: &["Cmp", "Fir", "Bal"] },
    Playstyle { name: "anticipate", attributes: &["Ant", "Pos"] },
    Playstyle { name: "block", attributes: &["Pos", "Bra"] },
    Playstyle { name: "bruiser", attributes: &["Str", "Agg"] },
    Playstyle { name: "jockey", attributes: &["Mar", "Pos"] },
    Playstyle { name: "slide_tackle", attributes: &["Tck", "Bra"] },
    Playstyle { name: "pinged_pass", attributes: &["Pas", "Tec"] },
    Playstyle { name: "incisive_pass", attributes: &["Vis", "Pas"] },
    Playstyle { name: "whipped_pass", attributes: &["Cro", "Tec"] },
    Playstyle { name: "aerial", attributes: &["Hea", "Jum"] },
    Playstyle { name: "power_header", attributes: &["Hea", "Jum", "Str"] },
    Playstyle { name: "dead_ball", attributes: &["Fre", "Cor"] },
    Playstyle { name: "finesse", attributes: &["Fin", "Tec"] },
    Playstyle { name: "power_shot", attributes: &["Lon", "Str"] },
    Playstyle { name: "giant_throw", attributes: &["L Th", "Str"] },
    Playstyle { name: "acrobatic", attributes: &["Agi", "Fla", "Fin"] },
];

/// Largest fully-met attribute set; earlier entries win ties.
pub fn best_playstyle(stats: &CardStats) -> Option<&'static Playstyle> {
    let mut best: Option<&'static Playstyle> = None;
    for style in PLAYSTYLES {
        let met = style
            .attributes
            .iter()
            .all(|attr| stats.attribute(attr) >= PLAYSTYLE_THRESHOLD);
        if met && best.is_none_or(|b| style.attributes.len() > b.attributes.len()) {
            best = Some(style);
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enhanced {
    pub stats: CardStats,
    pub playstyle: Option<&'static Playstyle>,
}

/// Overall adjustments from the foot and skill flags of the base card.
/// Runs before [`enhance`]; this is the only step that can lower Overall.
pub fn apply_flag_modifiers(stats: &mut CardStats) {
    let flags = stats.flags;
    if flags.weak_foot == 5 {
        stats.overall = (stats.overall + 1).min(STAT_CAP);
    } else if flags.weak_foot == 1 && flags.weak_foot_known {
        stats.overall = (stats.overall - 1).max(1);
    }
    if flags.skill_moves == 5 {
        stats.overall = (stats.overall + 1).min(STAT_CAP);
    }
}

/// Apply the tier's boosts and pick a playstyle. Never lowers a stat.
pub fn enhance<R: Rng>(
    stats: &CardStats,
    tier: CardTier,
    upgrades: u32,
    rng: &mut R,
) -> Enhanced {
    let mut stats = stats.clone();
    let family = tier.family();
    if let Some(pass) = family_pass(family) {
        for _ in 0..pass_count(family, upgrades) {
            apply_pass(&mut stats, pass, rng);
        }
    }

    let mut playstyle = None;
    if tier != CardTier::InForm
        && stats.overall >= PLAYSTYLE_MIN_OVERALL
        && let Some(style) = best_playstyle(&stats)
    {
        stats.overall = (stats.overall + 1).min(STAT_CAP);
        playstyle = Some(style);
    }

    Enhanced { stats, playstyle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card_stats::CardFlags;
    use crate::tiers::{ALL_TIERS, Band, IN_FORM_GOLD, resolve_artwork};
    use crate::weights::AttributeMapping;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    fn stats_at(overall: i32, value: i32) -> CardStats {
        let mut per_attribute = BTreeMap::new();
        let mut categories = Vec::new();
        for (category, attrs) in AttributeMapping::Standard.categories() {
            categories.push((*category, value));
            for (attr, _) in attrs.iter() {
                per_attribute.insert(attr.to_string(), value);
            }
        }
        CardStats {
            overall,
            categories,
            per_attribute,
            flags: CardFlags {
                weak_foot: 3,
                skill_moves: 3,
                weak_foot_known: true,
            },
        }
    }

    #[test]
    fn enhancement_never_lowers_and_stays_capped() {
        let mut rng = StdRng::seed_from_u64(7);
        for tier in ALL_TIERS {
            for upgrades in 0..=5 {
                for (overall, value) in [(1, 1), (45, 30), (70, 72), (88, 91), (99, 99)] {
                    let base = stats_at(overall, value);
                    let out = enhance(&base, tier, upgrades, &mut rng).stats;
                    assert!(out.overall >= base.overall, "{tier} x{upgrades}");
                    assert!(out.overall <= 99);
                    for (code, v) in &out.per_attribute {
                        assert!(*v >= base.attribute(code) && *v <= 99);
                    }
                    for ((_, before), (_, after)) in base.categories.iter().zip(&out.categories) {
                        assert!(after >= before && *after <= 99);
                    }
                    assert!(out.flags.weak_foot <= 5 && out.flags.skill_moves <= 5);
                }
            }
        }
    }

    #[test]
    fn toty_overall_lands_in_target_band() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let out = enhance(&stats_at(60, 40), CardTier::Toty, 0, &mut rng);
            assert!((88..=93).contains(&out.stats.overall));
        }
    }

    #[test]
    fn normal_cards_are_untouched_below_playstyle_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = stats_at(70, 95);
        let out = enhance(&base, CardTier::Normal, 5, &mut rng);
        assert_eq!(out.stats, base);
        assert!(out.playstyle.is_none());
    }

    #[test]
    fn repeated_upgrades_compound() {
        let base = stats_at(50, 50);
        let one = enhance(&base, CardTier::Motm, 1, &mut StdRng::seed_from_u64(5));
        let five = enhance(&base, CardTier::Motm, 5, &mut StdRng::seed_from_u64(5));
        assert!(five.stats.overall > one.stats.overall);
        let none = enhance(&base, CardTier::Motm, 0, &mut StdRng::seed_from_u64(5));
        assert_eq!(none.stats, base);
    }

    #[test]
    fn silver_in_form_crosses_to_gold_artwork() {
        let base = stats_at(72, 60);
        assert_eq!(resolve_artwork(CardTier::InForm, &base).band, Band::Silver);
        let mut rng = StdRng::seed_from_u64(1);
        let out = enhance(&base, CardTier::InForm, 1, &mut rng);
        let art = resolve_artwork(CardTier::InForm, &out.stats);
        assert_eq!(art.file, "if_gold.png");
        assert_eq!(art.palette, IN_FORM_GOLD);
    }

    #[test]
    fn playstyle_prefers_larger_sets() {
        let mut stats = stats_at(80, 50);
        for attr in ["Fla", "Dri", "Agi"] {
            stats.per_attribute.insert(attr.to_string(), 95);
        }
        assert_eq!(best_playstyle(&stats).map(|p| p.name), Some("trickster"));

        let out = enhance(&stats, CardTier::Normal, 0, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.stats.overall, 81);
        assert_eq!(out.playstyle.map(|p| p.name), Some("trickster"));

        let in_form = enhance(&stats, CardTier::InForm, 0, &mut StdRng::seed_from_u64(0));
        assert_eq!(in_form.stats.overall, 80);
        assert!(in_form.playstyle.is_none());
    }

    #[test]
    fn flag_modifiers() {
        let mut stats = stats_at(80, 50);
        stats.flags.weak_foot = 5;
        stats.flags.skill_moves = 5;
        apply_flag_modifiers(&mut stats);
        assert_eq!(stats.overall, 82);

        let mut weak = stats_at(80, 50);
        weak.flags.weak_foot = 1;
        apply_flag_modifiers(&mut weak);
        assert_eq!(weak.overall, 79);

        let mut unknown = stats_at(80, 50);
        unknown.flags.weak_foot = 1;
        unknown.flags.weak_foot_known = false;
        apply_flag_modifiers(&mut unknown);
        assert_eq!(unknown.overall, 80);
    }
}
