use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::formation::{BENCH_SIZE, FormationTemplate, SquadAssignment, slot_offset};

pub const CARD_GAP: u32 = 20;
pub const BENCH_SCALE: f64 = 0.6;
/// Bench cards overlap their neighbour by this much.
pub const BENCH_OVERLAP: u32 = 20;

/// Where one card lands on the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Slot key for starters, `None` on the bench.
    pub slot: Option<String>,
    /// Index into the candidate list the assignment was built from.
    pub player: usize,
    pub x: i64,
    pub y: i64,
    pub bench: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    pub width: u32,
    pub height: u32,
    pub card_size: (u32, u32),
    pub bench_card_size: (u32, u32),
    pub placements: Vec<Placement>,
}

/// Produces one card image file per placement. Called from pool threads.
pub trait CardSource: Sync {
    fn render_card(&self, placement: &Placement) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeStats {
    pub pasted: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedGrid {
    pub path: PathBuf,
    pub stats: ComposeStats,
}

/// Pixel layout for the assigned starters plus the bench row.
///
/// Each row is as tall as a card plus the largest upward and downward slot
/// offsets in it; rows are centered horizontally. The bench row is scaled
/// down and centered under the starters, and widens the canvas if needed.
pub fn plan_layout(
    assignment: &SquadAssignment,
    formation: &FormationTemplate,
    (card_w, card_h): (u32, u32),
) -> GridLayout {
    let pitch = i64::from(card_w + CARD_GAP);
    let starters_width = formation.widest_row() as i64 * pitch;

    let bench_w = (f64::from(card_w) * BENCH_SCALE) as u32;
    let bench_h = (f64::from(card_h) * BENCH_SCALE) as u32;
    let bench_pitch = i64::from(bench_w.saturating_sub(BENCH_OVERLAP).max(1));
    let bench_row_width = if assignment.bench.is_empty() {
        0
    } else {
        (BENCH_SIZE as i64 - 1) * bench_pitch + i64::from(bench_w)
    };
    let width = starters_width.max(bench_row_width);

    let mut placements = Vec::new();
    let mut row_top: i64 = 0;
    let mut slots = assignment.slots.iter();
    for row in &formation.rows {
        let offsets: Vec<_> = row.iter().map(|pos| slot_offset(*pos)).collect();
        let max_up = offsets.iter().map(|o| -o.vertical).max().unwrap_or(0).max(0);
        let max_down = offsets.iter().map(|o| o.vertical).max().unwrap_or(0).max(0);
        let row_height = i64::from(card_h) + i64::from(max_up) + i64::from(max_down);
        let row_start = (width - row.len() as i64 * pitch) / 2;

        for (i, offset) in offsets.iter().enumerate() {
            let Some(slot) = slots.next() else {
                break;
            };
            if let Some(player) = slot.player {
                placements.push(Placement {
                    slot: Some(slot.key.clone()),
                    player,
                    x: row_start + i as i64 * pitch + i64::from(offset.horizontal),
                    y: row_top + i64::from(max_up) + i64::from(offset.vertical),
                    bench: false,
                });
            }
        }
        row_top += row_height;
    }

    let mut height = row_top;
    if !assignment.bench.is_empty() {
        let bench_start = (width - bench_row_width) / 2;
        for (i, player) in assignment.bench.iter().enumerate() {
            placements.push(Placement {
                slot: None,
                player: *player,
                x: bench_start + i as i64 * bench_pitch,
                y: row_top,
                bench: true,
            });
        }
        height += i64::from(bench_h);
    }

    GridLayout {
        width: u32::try_from(width).unwrap_or(0),
        height: u32::try_from(height).unwrap_or(0),
        card_size: (card_w, card_h),
        bench_card_size: (bench_w, bench_h),
        placements,
    }
}

/// Render every placement on a pool of `parallelism` threads, then paste the
/// results in placement order.
pub fn compose_canvas(
    layout: &GridLayout,
    source: &impl CardSource,
    parallelism: usize,
) -> (RgbaImage, ComposeStats) {
    let rendered: Vec<Result<PathBuf>> = with_render_pool(parallelism, || {
        layout
            .placements
            .par_iter()
            .map(|placement| source.render_card(placement))
            .collect()
    });

    let mut canvas = RgbaImage::new(layout.width.max(1), layout.height.max(1));
    let mut stats = ComposeStats::default();
    for (placement, result) in layout.placements.iter().zip(rendered) {
        let path = match result {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!("card for player {} failed: {err:#}", placement.player);
                stats.failed += 1;
                continue;
            }
        };
        match paste_card(&mut canvas, layout, placement, &path) {
            Ok(true) => stats.pasted += 1,
            Ok(false) => stats.skipped += 1,
            Err(err) => {
                tracing::warn!("card {} unreadable: {err:#}", path.display());
                stats.failed += 1;
            }
        }
        if let Err(err) = fs::remove_file(&path) {
            tracing::debug!("removing {} failed: {err}", path.display());
        }
    }
    (canvas, stats)
}

/// Compose and save the grid as `club_{uuid}.webp` under `output_dir`.
pub fn compose(
    layout: &GridLayout,
    source: &impl CardSource,
    output_dir: &Path,
    parallelism: usize,
) -> Result<ComposedGrid> {
    let (canvas, stats) = compose_canvas(layout, source, parallelism);
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;
    let path = output_dir.join(format!("club_{}.webp", Uuid::new_v4()));
    canvas
        .save_with_format(&path, ImageFormat::WebP)
        .with_context(|| format!("write grid {}", path.display()))?;
    tracing::info!(
        "grid saved to {} ({} cards, {} failed, {} skipped)",
        path.display(),
        stats.pasted,
        stats.failed,
        stats.skipped
    );
    Ok(ComposedGrid { path, stats })
}

fn paste_card(
    canvas: &mut RgbaImage,
    layout: &GridLayout,
    placement: &Placement,
    path: &Path,
) -> Result<bool> {
    let mut card = image::open(path)
        .with_context(|| format!("open card {}", path.display()))?
        .to_rgba8();
    if placement.bench {
        let (w, h) = layout.bench_card_size;
        card = imageops::resize(&card, w.max(1), h.max(1), FilterType::CatmullRom);
    }
    let max_x = i64::from(canvas.width()) - i64::from(card.width());
    let max_y = i64::from(canvas.height()) - i64::from(card.height());
    if !(0..=max_x).contains(&placement.x) || !(0..=max_y).contains(&placement.y) {
        tracing::warn!(
            "skipping card at ({}, {}), outside the {}x{} grid",
            placement.x,
            placement.y,
            canvas.width(),
            canvas.height()
        );
        return Ok(false);
    }
    imageops::overlay(canvas, &card, placement.x, placement.y);
    Ok(true)
}

fn with_render_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.clamp(1, 64))
        .build()
    {
        Ok(pool) => pool.install(action),
        Err(err) => {
            tracing::warn!("render pool unavailable, using the global pool: {err}");
            action()
        }
    }
}
