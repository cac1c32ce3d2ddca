use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use image::Rgba;

use crate::card_stats::CardStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Competition {
    Ucl,
    Uel,
    Uecl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum League {
    Epl,
    Bundesliga,
    LaLiga,
    Ligue1,
    SerieA,
    Mls,
    Eredivisie,
}

/// Card variants. `InForm` is the team-of-the-week card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardTier {
    Normal,
    InForm,
    Icon,
    Hero,
    UclHero,
    Toty,
    Motm,
    FutChamps,
    Totgs(Competition),
    Rttk(Competition),
    Potm(League),
}

/// Enhancement families; every tier belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFamily {
    Normal,
    Icon,
    Hero,
    Toty,
    Potm,
    Special,
}

pub const ALL_TIERS: [CardTier; 21] = [
    CardTier::Normal,
    CardTier::InForm,
    CardTier::Icon,
    CardTier::Hero,
    CardTier::UclHero,
    CardTier::Toty,
    CardTier::Motm,
    CardTier::FutChamps,
    CardTier::Totgs(Competition::Ucl),
    CardTier::Totgs(Competition::Uel),
    CardTier::Totgs(Competition::Uecl),
    CardTier::Rttk(Competition::Ucl),
    CardTier::Rttk(Competition::Uel),
    CardTier::Rttk(Competition::Uecl),
    CardTier::Potm(League::Epl),
    CardTier::Potm(League::Bundesliga),
    CardTier::Potm(League::LaLiga),
    CardTier::Potm(League::Ligue1),
    CardTier::Potm(League::SerieA),
    CardTier::Potm(League::Mls),
    CardTier::Potm(League::Eredivisie),
];

impl CardTier {
    pub fn key(self) -> &'static str {
        match self {
            CardTier::Normal => "normal",
            CardTier::InForm => "totw",
            CardTier::Icon => "icon",
            CardTier::Hero => "hero",
            CardTier::UclHero => "ucl_hero",
            CardTier::Toty => "toty",
            CardTier::Motm => "motm",
            CardTier::FutChamps => "fut_champs",
            CardTier::Totgs(Competition::Ucl) => "totgs_ucl",
            CardTier::Totgs(Competition::Uel) => "totgs_uel",
            CardTier::Totgs(Competition::Uecl) => "totgs_uecl",
            CardTier::Rttk(Competition::Ucl) => "rttk_ucl",
            CardTier::Rttk(Competition::Uel) => "rttk_uel",
            CardTier::Rttk(Competition::Uecl) => "rttk_uecl",
            CardTier::Potm(League::Epl) => "potm_epl",
            CardTier::Potm(League::Bundesliga) => "potm_bundesliga",
            CardTier::Potm(League::LaLiga) => "potm_laliga",
            CardTier::Potm(League::Ligue1) => "potm_ligue1",
            CardTier::Potm(League::SerieA) => "potm_serie_a",
            CardTier::Potm(League::Mls) => "potm_mls",
            CardTier::Potm(League::Eredivisie) => "potm_eredivisie",
        }
    }

    pub fn family(self) -> TierFamily {
        match self {
            CardTier::Normal => TierFamily::Normal,
            CardTier::Icon => TierFamily::Icon,
            CardTier::Hero | CardTier::UclHero => TierFamily::Hero,
            CardTier::Toty => TierFamily::Toty,
            CardTier::Potm(_) => TierFamily::Potm,
            CardTier::InForm
            | CardTier::Motm
            | CardTier::FutChamps
            | CardTier::Totgs(_)
            | CardTier::Rttk(_) => TierFamily::Special,
        }
    }

    fn own_palette(self) -> Palette {
        match self {
            CardTier::Normal => NORMAL_GOLD,
            CardTier::InForm => IN_FORM_GOLD,
            CardTier::Icon => Palette::pair([89, 76, 43], [219, 219, 219]),
            CardTier::Hero => Palette::pair([255, 255, 255], [216, 100, 0]),
            CardTier::UclHero => Palette::pair([255, 255, 255], [5, 94, 162]),
            CardTier::Toty => Palette::pair([255, 222, 128], [19, 35, 85]),
            CardTier::Motm => Palette::pair([242, 242, 242], [10, 28, 62]),
            CardTier::FutChamps => Palette::pair([246, 219, 122], [103, 23, 16]),
            CardTier::Totgs(Competition::Ucl) | CardTier::Rttk(Competition::Ucl) => {
                Palette::pair([255, 255, 255], [4, 18, 90])
            }
            CardTier::Totgs(_) | CardTier::Rttk(_) => Palette::pair([255, 255, 255], [0, 0, 0]),
            CardTier::Potm(League::Epl) => Palette::pair([250, 250, 250], [77, 29, 209]),
            CardTier::Potm(League::Bundesliga) => Palette::pair([245, 245, 245], [25, 25, 25]),
            CardTier::Potm(League::SerieA) => Palette::pair([0, 232, 217], [28, 18, 89]),
            CardTier::Potm(League::Eredivisie) => Palette::pair([242, 242, 242], [54, 96, 58]),
            CardTier::Potm(League::LaLiga | League::Ligue1 | League::Mls) => {
                Palette::pair([242, 242, 242], [10, 28, 62])
            }
        }
    }
}

impl FromStr for CardTier {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_ascii_lowercase();
        ALL_TIERS
            .iter()
            .copied()
            .find(|t| t.key() == key)
            .ok_or_else(|| anyhow!("unknown card type {raw:?}"))
    }
}

impl fmt::Display for CardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Bronze,
    Silver,
    Gold,
}

impl Band {
    /// Rare and in-form artwork: gold from 75, silver from 65.
    pub fn from_overall(overall: i32) -> Self {
        if overall >= 75 {
            Band::Gold
        } else if overall >= 65 {
            Band::Silver
        } else {
            Band::Bronze
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Band::Bronze => "bronze",
            Band::Silver => "silver",
            Band::Gold => "gold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Rgba<u8>,
    pub circle_fill: Rgba<u8>,
    pub circle_outline: Rgba<u8>,
    pub rect_fill: Rgba<u8>,
    pub rect_outline: Rgba<u8>,
    pub rect_text: Rgba<u8>,
}

impl Palette {
    /// Text/outline color on a fill color, the layout every card family uses.
    pub const fn pair(text: [u8; 3], fill: [u8; 3]) -> Self {
        let text = Rgba([text[0], text[1], text[2], 255]);
        let fill = Rgba([fill[0], fill[1], fill[2], 255]);
        Self {
            text,
            circle_fill: fill,
            circle_outline: text,
            rect_fill: fill,
            rect_outline: text,
            rect_text: text,
        }
    }
}

pub const NORMAL_GOLD: Palette = Palette::pair([64, 52, 29], [226, 192, 117]);
pub const NORMAL_SILVER: Palette = Palette::pair([38, 45, 52], [200, 208, 214]);
pub const NORMAL_BRONZE: Palette = Palette::pair([58, 35, 20], [214, 160, 120]);
pub const IN_FORM_GOLD: Palette = Palette::pair([255, 226, 139], [22, 22, 21]);
pub const IN_FORM_SILVER: Palette = Palette::pair([175, 188, 200], [24, 24, 24]);
pub const IN_FORM_BRONZE: Palette = Palette::pair([226, 164, 135], [20, 20, 19]);

/// Base artwork plus the palette used for every draw on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub file: String,
    pub band: Band,
    pub palette: Palette,
}

/// Pick artwork and palette from final card stats.
///
/// Call this only with enhanced stats: the band and palette follow the
/// Overall that ends up printed on the card.
pub fn resolve_artwork(tier: CardTier, stats: &CardStats) -> Artwork {
    let overall = stats.overall;
    match tier {
        CardTier::Normal => {
            let all_below = |ceiling: i32| stats.categories.iter().all(|(_, v)| *v < ceiling);
            let plain = if overall >= 75 && all_below(80) {
                Some(Band::Gold)
            } else if overall > 64 && overall <= 75 && all_below(70) {
                Some(Band::Silver)
            } else if overall <= 64 && all_below(60) {
                Some(Band::Bronze)
            } else {
                None
            };
            let (prefix, band) = match plain {
                Some(band) => ("0", band),
                None => ("1", Band::from_overall(overall)),
            };
            Artwork {
                file: format!("{prefix}_{}.png", band.key()),
                band,
                palette: normal_palette(overall),
            }
        }
        CardTier::InForm => {
            let band = Band::from_overall(overall);
            Artwork {
                file: format!("if_{}.png", band.key()),
                band,
                palette: special_palette(tier, overall),
            }
        }
        _ => Artwork {
            file: format!("{}.png", tier.key()),
            band: Band::from_overall(overall),
            palette: special_palette(tier, overall),
        },
    }
}

fn normal_palette(overall: i32) -> Palette {
    if overall >= 75 {
        NORMAL_GOLD
    } else if overall > 64 {
        NORMAL_SILVER
    } else {
        NORMAL_BRONZE
    }
}

// Low-rated special cards borrow the in-form silver/bronze colors.
fn special_palette(tier: CardTier, overall: i32) -> Palette {
    if overall <= 64 {
        IN_FORM_BRONZE
    } else if overall < 75 {
        IN_FORM_SILVER
    } else {
        tier.own_palette()
    }
}
