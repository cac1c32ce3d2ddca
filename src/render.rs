use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result, anyhow};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rand::{Rng, RngCore};
use uuid::Uuid;

use crate::asset_cache::TtlCache;
use crate::assets::AssetResolver;
use crate::card_stats::{CardStats, ScoredPositions, compute_card_stats};
use crate::config::EngineConfig;
use crate::enhance::{Playstyle, apply_flag_modifiers, enhance};
use crate::player::PlayerRecord;
use crate::tiers::{CardTier, Palette, resolve_artwork};
use crate::weights::{AttributeMapping, AttributeWeightProfile};

pub const MAX_UPGRADES: u32 = 5;

const OVERALL_POS: (i32, i32) = (110, 110);
const PORTRAIT_HEIGHT: u32 = 384;
const CIRCLE_RADIUS: u32 = 30;
const CIRCLE_X: i64 = 62;
const OUTLINE: u32 = 2;
const SUPERSAMPLE: u32 = 4;
const STAT_SPACING: i32 = 20;
const BOX_SIZE: (u32, u32) = (100, 30);
const FLAG_WIDTH: u32 = 56;
const BADGE_HEIGHT: u32 = 48;
const LEAGUE_MAX: (u32, u32) = (64, 48);

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub render_portrait: bool,
    pub render_club_badge: bool,
    pub upgrade_count: u32,
    pub use_alt_mapping: bool,
    /// Encoded image supplied by the caller; wins over every lookup.
    pub uploaded_portrait: Option<Vec<u8>>,
    pub seed: Option<u64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            render_portrait: true,
            render_club_badge: true,
            upgrade_count: 0,
            use_alt_mapping: false,
            uploaded_portrait: None,
            seed: None,
        }
    }
}

impl RenderOptions {
    pub fn upgrades(&self) -> u32 {
        self.upgrade_count.min(MAX_UPGRADES)
    }

    pub fn mapping(&self) -> AttributeMapping {
        AttributeMapping::from_flag(self.use_alt_mapping)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCard {
    pub path: PathBuf,
    pub filename: String,
    pub overall: i32,
    pub playstyle: Option<&'static str>,
}

pub struct FontSet {
    bold: FontVec,
    medium: FontVec,
}

impl FontSet {
    /// `fonts/bold.otf` and `fonts/medium.otf` under the asset directory.
    pub fn load(asset_dir: &Path) -> Result<Self> {
        let dir = asset_dir.join("fonts");
        Self::from_files(&dir.join("bold.otf"), &dir.join("medium.otf"))
    }

    pub fn from_files(bold: &Path, medium: &Path) -> Result<Self> {
        let bold = fs::read(bold).with_context(|| format!("read font {}", bold.display()))?;
        let medium =
            fs::read(medium).with_context(|| format!("read font {}", medium.display()))?;
        Self::from_bytes(bold, medium)
    }

    /// Any TrueType or OpenType data.
    pub fn from_bytes(bold: Vec<u8>, medium: Vec<u8>) -> Result<Self> {
        Ok(Self {
            bold: FontVec::try_from_vec(bold).map_err(|_| anyhow!("invalid bold font"))?,
            medium: FontVec::try_from_vec(medium).map_err(|_| anyhow!("invalid medium font"))?,
        })
    }
}

/// Decoded base artwork, loaded once per file.
#[derive(Default)]
pub struct ArtworkCache {
    images: Mutex<HashMap<PathBuf, Arc<RgbaImage>>>,
}

impl ArtworkCache {
    pub fn get(&self, path: &Path) -> Result<Arc<RgbaImage>> {
        let mut images = self
            .images
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(img) = images.get(path) {
            return Ok(Arc::clone(img));
        }
        let img = image::open(path)
            .with_context(|| format!("open artwork {}", path.display()))?
            .to_rgba8();
        let img = Arc::new(img);
        images.insert(path.to_path_buf(), Arc::clone(&img));
        Ok(img)
    }
}

pub struct CardRenderer {
    asset_dir: PathBuf,
    output_dir: PathBuf,
    fonts: FontSet,
    artwork: ArtworkCache,
    portraits: TtlCache<Arc<RgbaImage>>,
    resolver: Arc<dyn AssetResolver>,
    weights: Arc<AttributeWeightProfile>,
}

impl CardRenderer {
    pub fn new(
        config: &EngineConfig,
        resolver: Arc<dyn AssetResolver>,
        weights: Arc<AttributeWeightProfile>,
    ) -> Result<Self> {
        let fonts = FontSet::load(&config.asset_dir)?;
        Ok(Self::with_fonts(config, fonts, resolver, weights))
    }

    pub fn with_fonts(
        config: &EngineConfig,
        fonts: FontSet,
        resolver: Arc<dyn AssetResolver>,
        weights: Arc<AttributeWeightProfile>,
    ) -> Self {
        Self {
            asset_dir: config.asset_dir.clone(),
            output_dir: config.output_dir.clone(),
            fonts,
            artwork: ArtworkCache::default(),
            portraits: TtlCache::new(config.portrait_cache_capacity, config.asset_cache_ttl),
            resolver,
            weights,
        }
    }

    /// Pixel size of the card artwork. Every base image shares it.
    pub fn card_size(&self, tier: CardTier) -> Result<(u32, u32)> {
        let probe = CardStats {
            overall: 80,
            categories: Vec::new(),
            per_attribute: Default::default(),
            flags: crate::card_stats::CardFlags {
                weak_foot: 3,
                skill_moves: 3,
                weak_foot_known: true,
            },
        };
        let art = resolve_artwork(tier, &probe);
        let img = self.artwork.get(&self.card_path(&art.file))?;
        Ok(img.dimensions())
    }

    pub fn render<R: Rng>(
        &self,
        player: &PlayerRecord,
        scored: &ScoredPositions,
        tier: CardTier,
        options: &RenderOptions,
        rng: &mut R,
    ) -> Result<(RgbaImage, CardStats, Option<&'static Playstyle>)> {
        let mut base = compute_card_stats(player, scored.primary, &self.weights, options.mapping());
        apply_flag_modifiers(&mut base);
        let enhanced = enhance(&base, tier, options.upgrades(), rng);
        let stats = enhanced.stats;
        let art = resolve_artwork(tier, &stats);
        let palette = art.palette;

        let mut canvas = self.artwork.get(&self.card_path(&art.file))?.as_ref().clone();

        self.draw_header(&mut canvas, &stats, scored, player, &palette);
        if let Some(style) = enhanced.playstyle {
            self.draw_playstyle(&mut canvas, style, tier);
        }
        draw_secondary_positions(&mut canvas, &self.fonts, scored, &palette);
        draw_stat_row(&mut canvas, &self.fonts, &stats, &palette);
        if options.render_portrait || options.uploaded_portrait.is_some() {
            match self.portrait(player, options, rng) {
                Some(portrait) => paste_portrait(&mut canvas, &portrait),
                None => tracing::info!("no portrait available for {}", player.name),
            }
        }
        if options.render_club_badge {
            self.draw_flag_and_badges(&mut canvas, player);
        }
        draw_flag_boxes(&mut canvas, &self.fonts, &stats, &palette);

        Ok((canvas, stats, enhanced.playstyle))
    }

    /// Render and write `card_{name}_{position}_{uuid}.png`. The caller owns
    /// the file afterwards.
    pub fn render_to_file<R: Rng>(
        &self,
        player: &PlayerRecord,
        scored: &ScoredPositions,
        tier: CardTier,
        options: &RenderOptions,
        rng: &mut R,
    ) -> Result<RenderedCard> {
        let (canvas, stats, playstyle) = self.render(player, scored, tier, options, rng)?;
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create output dir {}", self.output_dir.display()))?;
        let filename = card_filename(&player.name, scored.primary.as_str());
        let path = self.output_dir.join(&filename);
        canvas
            .save(&path)
            .with_context(|| format!("write card {}", path.display()))?;
        Ok(RenderedCard {
            path,
            filename,
            overall: stats.overall,
            playstyle: playstyle.map(|p| p.name),
        })
    }

    fn card_path(&self, file: &str) -> PathBuf {
        self.asset_dir.join("cards").join(file)
    }

    fn draw_header(
        &self,
        canvas: &mut RgbaImage,
        stats: &CardStats,
        scored: &ScoredPositions,
        player: &PlayerRecord,
        palette: &Palette,
    ) {
        let (ox, oy) = OVERALL_POS;
        let overall = stats.overall.to_string();
        let overall_scale = PxScale::from(72.0);
        draw_text_mut(canvas, palette.text, ox, oy, overall_scale, &self.fonts.bold, &overall);

        let position = scored.primary.as_str();
        let position_scale = PxScale::from(48.0);
        let (ow, _) = text_size(overall_scale, &self.fonts.bold, &overall);
        let (pw, _) = text_size(position_scale, &self.fonts.bold, position);
        let px = ox + (ow as i32 - pw as i32) / 2;
        draw_text_mut(canvas, palette.text, px, oy + 75, position_scale, &self.fonts.bold, position);

        let surname = player.surname();
        let name_scale = PxScale::from(60.0);
        let (nw, _) = text_size(name_scale, &self.fonts.bold, surname);
        let nx = (canvas.width() as i32 - nw as i32) / 2;
        let ny = (f64::from(canvas.height()) * 2.0 / 2.95) as i32 - 50;
        draw_text_mut(canvas, palette.text, nx, ny, name_scale, &self.fonts.bold, surname);
    }

    fn draw_playstyle(&self, canvas: &mut RgbaImage, style: &Playstyle, tier: CardTier) {
        let path = self.asset_dir.join(style.icon_path(tier));
        let icon = match image::open(&path) {
            Ok(img) => img.to_rgba8(),
            Err(err) => {
                tracing::debug!("playstyle icon {} unavailable: {err}", path.display());
                return;
            }
        };
        let w = (icon.width() * 2 / 3).max(1);
        let h = (icon.height() * 2 / 3).max(1);
        let icon = imageops::resize(&icon, w, h, FilterType::Lanczos3);
        let x = (f64::from(canvas.width()) * 0.035) as i64;
        let y = (f64::from(canvas.height()) * 0.4) as i64;
        imageops::overlay(canvas, &icon, x, y);
    }

    /// Uploaded image, then the decoded cache, then the resolver chain.
    fn portrait(
        &self,
        player: &PlayerRecord,
        options: &RenderOptions,
        rng: &mut dyn RngCore,
    ) -> Option<Arc<RgbaImage>> {
        if let Some(bytes) = &options.uploaded_portrait {
            match image::load_from_memory(bytes) {
                Ok(img) => return Some(Arc::new(img.to_rgba8())),
                Err(err) => tracing::warn!("uploaded portrait undecodable: {err}"),
            }
        }
        self.portraits.get_or_fetch(&player.name, || {
            let from_lookup = self
                .resolver
                .resolve_portrait(&player.name)
                .and_then(|path| match image::open(&path) {
                    Ok(img) => Some(img),
                    Err(err) => {
                        tracing::warn!("portrait {} unreadable: {err}", path.display());
                        None
                    }
                });
            let img = from_lookup.or_else(|| {
                tracing::debug!("using regional portrait for {}", player.name);
                self.resolver.regional_fallback(&player.nationality, rng)
            })?;
            Some(Arc::new(img.to_rgba8()))
        })
    }

    fn draw_flag_and_badges(&self, canvas: &mut RgbaImage, player: &PlayerRecord) {
        let (w, h) = (i64::from(canvas.width()), i64::from(canvas.height()));

        let flag_path = self
            .asset_dir
            .join("nation_images")
            .join(format!("{}.png", player.nationality));
        match image::open(&flag_path) {
            Ok(flag) => {
                let flag = scale_to_width(&flag.to_rgba8(), FLAG_WIDTH);
                let x = w - i64::from(FLAG_WIDTH) - 360;
                let y = h - i64::from(flag.height()) - 120;
                imageops::overlay(canvas, &flag, x, y);
            }
            Err(_) => tracing::warn!("flag for {:?} not found", player.nationality),
        }

        if !player.has_club() {
            let placeholder = self.asset_dir.join("free_agent.png");
            match image::open(&placeholder) {
                Ok(img) => paste_club_badge(canvas, &img.to_rgba8()),
                Err(err) => tracing::warn!("free agent badge unavailable: {err}"),
            }
            return;
        }

        let club = player.club.trim();
        let Some(page) = self.resolver.resolve_team_page(club) else {
            tracing::warn!("no team page for {club}");
            return;
        };
        let badges = self.resolver.resolve_badge_and_league(&page);

        if let (Some(url), Some(league)) = (&badges.league_badge, &badges.league_name) {
            let dest = self
                .asset_dir
                .join("league_data")
                .join("league_img")
                .join(format!("{}.png", league.replace(' ', "_")));
            if let Some(img) = self.resolver.download_image(url, &dest).and_then(open_rgba) {
                let (nw, nh) = fit_within(img.dimensions(), LEAGUE_MAX);
                let img = imageops::resize(&img, nw, nh, FilterType::Lanczos3);
                let x = (w - i64::from(nw)) / 2;
                let y = h - i64::from(nh) - 110;
                imageops::overlay(canvas, &img, x, y);
            }
        }

        if let Some(url) = &badges.club_badge {
            let dest = self
                .asset_dir
                .join("league_data")
                .join("team_img")
                .join(format!("{}.png", club.replace(' ', "")));
            match self.resolver.download_image(url, &dest).and_then(open_rgba) {
                Some(img) => paste_club_badge(canvas, &img),
                None => tracing::warn!("club badge for {club} unavailable"),
            }
        }
    }
}

fn open_rgba(path: PathBuf) -> Option<RgbaImage> {
    match image::open(&path) {
        Ok(img) => Some(img.to_rgba8()),
        Err(err) => {
            tracing::warn!("image {} unreadable: {err}", path.display());
            None
        }
    }
}

fn paste_club_badge(canvas: &mut RgbaImage, badge: &RgbaImage) {
    let badge = scale_to_height(badge, BADGE_HEIGHT);
    let x = (i64::from(canvas.width()) - i64::from(badge.width())) / 2 + 60;
    let y = i64::from(canvas.height()) - i64::from(BADGE_HEIGHT) - 110;
    imageops::overlay(canvas, &badge, x, y);
}

fn paste_portrait(canvas: &mut RgbaImage, portrait: &RgbaImage) {
    let portrait = scale_to_height(portrait, PORTRAIT_HEIGHT);
    let x = (i64::from(canvas.width()) - i64::from(portrait.width())) / 2 + 15;
    let y = (i64::from(canvas.height()) - i64::from(PORTRAIT_HEIGHT)) / 2 - 70;
    imageops::overlay(canvas, &portrait, x, y);
}

fn draw_secondary_positions(
    canvas: &mut RgbaImage,
    fonts: &FontSet,
    scored: &ScoredPositions,
    palette: &Palette,
) {
    let scale = PxScale::from(24.0);
    let badge = supersampled_circle(palette);
    let mut cy = i64::from(OVERALL_POS.1) + 75 + 110;
    for pos in &scored.secondary {
        let r = i64::from(CIRCLE_RADIUS);
        imageops::overlay(canvas, &badge, CIRCLE_X - r, cy - r);
        let label = pos.as_str();
        let (tw, th) = text_size(scale, &fonts.medium, label);
        let tx = CIRCLE_X as i32 - tw as i32 / 2;
        let ty = cy as i32 - th as i32 / 2 - 3;
        draw_text_mut(canvas, palette.text, tx, ty, scale, &fonts.medium, label);
        cy -= 2 * r + 10;
    }
}

/// Outlined disc drawn at 4x and scaled down for smooth edges.
fn supersampled_circle(palette: &Palette) -> RgbaImage {
    let diameter = CIRCLE_RADIUS * 2;
    let big = diameter * SUPERSAMPLE;
    let mut img = RgbaImage::from_pixel(big, big, Rgba([0, 0, 0, 0]));
    let center = (big as i32 / 2, big as i32 / 2);
    let outer = (CIRCLE_RADIUS * SUPERSAMPLE) as i32 - (OUTLINE * SUPERSAMPLE) as i32 / 2;
    draw_filled_circle_mut(&mut img, center, outer, palette.circle_outline);
    draw_filled_circle_mut(
        &mut img,
        center,
        outer - (OUTLINE * SUPERSAMPLE) as i32,
        palette.circle_fill,
    );
    imageops::resize(&img, diameter, diameter, FilterType::Lanczos3)
}

fn supersampled_box(palette: &Palette) -> RgbaImage {
    let (w, h) = BOX_SIZE;
    let (bw, bh) = (w * SUPERSAMPLE, h * SUPERSAMPLE);
    let border = OUTLINE * SUPERSAMPLE;
    let mut img = RgbaImage::from_pixel(bw, bh, palette.rect_outline);
    draw_filled_rect_mut(
        &mut img,
        Rect::at(border as i32, border as i32).of_size(bw - 2 * border, bh - 2 * border),
        palette.rect_fill,
    );
    imageops::resize(&img, w, h, FilterType::Lanczos3)
}

fn draw_stat_row(canvas: &mut RgbaImage, fonts: &FontSet, stats: &CardStats, palette: &Palette) {
    let name_scale = PxScale::from(34.0);
    let value_scale = PxScale::from(48.0);
    let cells: Vec<(String, String, u32, u32)> = stats
        .categories
        .iter()
        .map(|(name, value)| {
            let value = value.to_string();
            let (nw, _) = text_size(name_scale, &fonts.medium, name);
            let (vw, _) = text_size(value_scale, &fonts.bold, &value);
            (name.to_string(), value, nw, vw)
        })
        .collect();
    let widths: Vec<(u32, u32)> = cells.iter().map(|(_, _, nw, vw)| (*nw, *vw)).collect();
    let name_y = (f64::from(canvas.height()) * 2.0 / 2.8) as i32;
    let value_y = name_y + 30;
    for ((name, value, _, _), (nx, vx)) in cells.iter().zip(stat_row_layout(&widths, canvas.width()))
    {
        draw_text_mut(canvas, palette.text, nx, name_y, name_scale, &fonts.medium, name);
        draw_text_mut(canvas, palette.text, vx, value_y, value_scale, &fonts.bold, value);
    }
}

/// X positions of each category's name and value. Every cell is as wide as
/// its wider text, both texts are centered in the cell, and the whole row
/// is centered on the card.
pub fn stat_row_layout(widths: &[(u32, u32)], canvas_width: u32) -> Vec<(i32, i32)> {
    let cell = |(nw, vw): (u32, u32)| nw.max(vw) as i32;
    let total: i32 = widths.iter().map(|w| cell(*w) + STAT_SPACING).sum::<i32>()
        - if widths.is_empty() { 0 } else { STAT_SPACING };
    let mut x = (canvas_width as i32 - total) / 2;
    let mut out = Vec::with_capacity(widths.len());
    for &(nw, vw) in widths {
        let width = cell((nw, vw));
        out.push((x + (width - nw as i32) / 2, x + (width - vw as i32) / 2));
        x += width + STAT_SPACING;
    }
    out
}

fn draw_flag_boxes(canvas: &mut RgbaImage, fonts: &FontSet, stats: &CardStats, palette: &Palette) {
    let (bw, bh) = BOX_SIZE;
    let rect = supersampled_box(palette);
    let x = canvas.width() as i32 - bw as i32 - 20;
    let mid = canvas.height() as i32 / 2;
    let rows = [
        (mid - bh as i32 - 10, format!("WF - {}", stats.flags.weak_foot)),
        (mid + 10, format!("SM - {}", stats.flags.skill_moves)),
    ];
    let scale = PxScale::from(30.0);
    for (y, label) in rows {
        imageops::overlay(canvas, &rect, i64::from(x), i64::from(y));
        let (tw, th) = text_size(scale, &fonts.medium, &label);
        let tx = x + (bw as i32 - tw as i32) / 2;
        let ty = y + (bh as i32 - th as i32) / 2;
        draw_text_mut(canvas, palette.rect_text, tx, ty, scale, &fonts.medium, &label);
    }
}

pub fn scale_to_height(img: &RgbaImage, height: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let width = ((f64::from(w) * f64::from(height) / f64::from(h.max(1))) as u32).max(1);
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

pub fn scale_to_width(img: &RgbaImage, width: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let height = ((f64::from(h) * f64::from(width) / f64::from(w.max(1))) as u32).max(1);
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Shrink a landscape image to the max width, a portrait one to the max
/// height, keeping the aspect ratio. Never upscales.
pub fn fit_within((w, h): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    let (w, h) = (w.max(1), h.max(1));
    let aspect = f64::from(w) / f64::from(h);
    if w > h {
        let nw = w.min(max_w);
        (nw, ((f64::from(nw) / aspect) as u32).max(1))
    } else {
        let nh = h.min(max_h);
        (((f64::from(nh) * aspect) as u32).max(1), nh)
    }
}

/// `card_{name}_{position}_{uuid}.png` with the name made path-safe.
pub fn card_filename(name: &str, position: &str) -> String {
    let safe: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("card_{safe}_{position}_{}.png", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_row_is_centered() {
        let layout = stat_row_layout(&[(40, 60), (50, 30)], 600);
        // cells 60 + 20 + 50 = 130 wide, starting at (600 - 130) / 2
        assert_eq!(layout, vec![(235 + 10, 235), (235 + 80, 235 + 80 + 10)]);
        assert!(stat_row_layout(&[], 600).is_empty());
    }

    #[test]
    fn league_badges_shrink_without_upscaling() {
        assert_eq!(fit_within((128, 64), LEAGUE_MAX), (64, 32));
        assert_eq!(fit_within((40, 96), LEAGUE_MAX), (20, 48));
        assert_eq!(fit_within((30, 20), LEAGUE_MAX), (30, 20));
    }

    #[test]
    fn filenames_are_unique_and_path_safe() {
        let a = card_filename("Jan / Novák", "ST");
        let b = card_filename("Jan / Novák", "ST");
        assert_ne!(a, b);
        assert!(a.starts_with("card_Jan___Novák_ST_"));
        assert!(a.ends_with(".png"));
        assert!(!a.contains('/'));
    }

    #[test]
    fn upgrades_are_clamped() {
        let opts = RenderOptions {
            upgrade_count: 9,
            ..RenderOptions::default()
        };
        assert_eq!(opts.upgrades(), 5);
    }

    #[test]
    fn resize_keeps_aspect() {
        let img = RgbaImage::new(200, 100);
        assert_eq!(scale_to_height(&img, 50).dimensions(), (100, 50));
        assert_eq!(scale_to_width(&img, 56).dimensions(), (56, 28));
    }
}
