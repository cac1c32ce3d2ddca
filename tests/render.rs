use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tempfile::TempDir;

use card_forge::assets::{AssetResolver, TeamBadges};
use card_forge::card_stats::score_positions;
use card_forge::config::EngineConfig;
use card_forge::engine::{CardEngine, SquadRequest};
use card_forge::error::SquadError;
use card_forge::player::PlayerRecord;
use card_forge::positions::ALL_CARD_POSITIONS;
use card_forge::render::{CardRenderer, FontSet, RenderOptions};
use card_forge::tiers::{ALL_TIERS, CardTier};
use card_forge::weights::{AttributeMapping, AttributeWeightProfile};

const ARTWORK: (u32, u32) = (320, 480);
const EVERY_POSITION: &str = "D/WB (RLC), DM, M/AM (RLC), ST (C)";

fn fixture_font(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("fonts");
    path.push(name);
    path
}

fn fixture_fonts() -> FontSet {
    FontSet::from_files(
        &fixture_font("DejaVuSans-Bold.ttf"),
        &fixture_font("DejaVuSans.ttf"),
    )
    .expect("fixture fonts should load")
}

/// Solid-colour artwork for every card file, fonts under `fonts/`, and a
/// free agent badge. Bronze artwork is left out when `with_bronze` is false.
fn asset_dir(with_bronze: bool) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let cards = dir.path().join("cards");
    fs::create_dir_all(&cards).unwrap();

    let bands: &[&str] = if with_bronze {
        &["bronze", "silver", "gold"]
    } else {
        &["silver", "gold"]
    };
    let mut files = Vec::new();
    for band in bands {
        files.push(format!("0_{band}.png"));
        files.push(format!("1_{band}.png"));
        files.push(format!("if_{band}.png"));
    }
    for tier in ALL_TIERS {
        files.push(format!("{}.png", tier.key()));
    }
    for (i, file) in files.iter().enumerate() {
        let shade = (i * 23 % 200) as u8;
        RgbaImage::from_pixel(ARTWORK.0, ARTWORK.1, Rgba([shade, 40, 255 - shade, 255]))
            .save(cards.join(file))
            .unwrap();
    }

    let fonts = dir.path().join("fonts");
    fs::create_dir_all(&fonts).unwrap();
    fs::copy(fixture_font("DejaVuSans-Bold.ttf"), fonts.join("bold.otf")).unwrap();
    fs::copy(fixture_font("DejaVuSans.ttf"), fonts.join("medium.otf")).unwrap();

    RgbaImage::from_pixel(30, 30, Rgba([9, 9, 9, 255]))
        .save(dir.path().join("free_agent.png"))
        .unwrap();
    dir
}

fn regional_pool(asset_dir: &Path, nationality: &str) {
    let pool = asset_dir.join("player_img").join("regen").join(nationality);
    fs::create_dir_all(&pool).unwrap();
    for (i, colour) in [[200, 10, 10], [10, 200, 10], [10, 10, 200]].iter().enumerate() {
        let [r, g, b] = *colour;
        RgbaImage::from_pixel(256, 384, Rgba([r, g, b, 255]))
            .save(pool.join(format!("face_{i}.png")))
            .unwrap();
    }
}

/// Every attribute the weights and both category tables read, set to `value`.
fn uniform_player(name: &str, club: &str, value: f64) -> PlayerRecord {
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let mut player = PlayerRecord::new(name);
    player.club = club.into();
    player.nationality = "NED".into();
    player.position = "MC".into();
    player.left_foot = "Very Strong".into();
    player.right_foot = "Very Strong".into();
    for pos in ALL_CARD_POSITIONS {
        for code in weights.weights_for(pos).into_iter().flat_map(|w| w.keys()) {
            player.attributes.insert(code.clone(), value);
        }
    }
    for mapping in [AttributeMapping::Standard, AttributeMapping::Alternate] {
        for (_, attrs) in mapping.categories() {
            for (code, _) in attrs.iter() {
                player.attributes.insert(code.to_string(), value);
            }
        }
    }
    player
}

/// Resolver that never finds anything online and serves regional faces
/// from memory. Every call is recorded.
#[derive(Default)]
struct RecordingResolver {
    calls: Mutex<Vec<String>>,
    faces: Vec<RgbaImage>,
}

impl RecordingResolver {
    fn with_faces() -> Self {
        let faces = (0..4u8)
            .map(|i| RgbaImage::from_pixel(200, 300, Rgba([60 * i, 255 - 60 * i, 128, 255])))
            .collect();
        Self {
            calls: Mutex::new(Vec::new()),
            faces,
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl AssetResolver for RecordingResolver {
    fn resolve_team_page(&self, team: &str) -> Option<String> {
        self.record(format!("team:{team}"));
        None
    }

    fn resolve_badge_and_league(&self, team_page_url: &str) -> TeamBadges {
        self.record(format!("badges:{team_page_url}"));
        TeamBadges::default()
    }

    fn resolve_portrait(&self, player_name: &str) -> Option<PathBuf> {
        self.record(format!("portrait:{player_name}"));
        None
    }

    fn regional_fallback(
        &self,
        nationality: &str,
        rng: &mut dyn RngCore,
    ) -> Option<DynamicImage> {
        self.record(format!("regional:{nationality}"));
        self.faces
            .choose(rng)
            .map(|face| DynamicImage::ImageRgba8(face.clone()))
    }

    fn download_image(&self, url: &str, _dest: &Path) -> Option<PathBuf> {
        self.record(format!("download:{url}"));
        None
    }
}

fn renderer(assets: &TempDir, resolver: Arc<RecordingResolver>) -> CardRenderer {
    let config = EngineConfig {
        asset_dir: assets.path().to_path_buf(),
        output_dir: assets.path().join("out"),
        cache_dir: None,
        ..EngineConfig::default()
    };
    let weights = Arc::new(AttributeWeightProfile::embedded_default().unwrap());
    CardRenderer::with_fonts(&config, fixture_fonts(), resolver, weights)
}

fn offline_engine(assets: &TempDir, output: &TempDir) -> CardEngine {
    let config = EngineConfig {
        asset_dir: assets.path().to_path_buf(),
        output_dir: output.path().to_path_buf(),
        cache_dir: None,
        render_parallelism: 2,
        offline: true,
        ..EngineConfig::default()
    };
    CardEngine::new(config).expect("offline engine")
}

#[test]
fn seeded_renders_are_identical() {
    let assets = asset_dir(true);
    let player = uniform_player("Tom de Wit", "Ajax", 15.0);
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let scored = score_positions(&player, &weights).unwrap();
    let options = RenderOptions::default();

    let render = || {
        let resolver = Arc::new(RecordingResolver::with_faces());
        let cards = renderer(&assets, Arc::clone(&resolver));
        let mut rng = StdRng::seed_from_u64(77);
        let (img, stats, _) = cards
            .render(&player, &scored, CardTier::Icon, &options, &mut rng)
            .expect("card renders");
        assert_eq!(resolver.count("regional:NED"), 1);
        (img, stats)
    };
    let (first, first_stats) = render();
    let (second, second_stats) = render();

    assert_eq!(first_stats, second_stats);
    assert_eq!(first.dimensions(), ARTWORK);
    assert!(first.as_raw() == second.as_raw(), "same seed drew a different card");
}

#[test]
fn failed_lookups_still_render_a_card() {
    let assets = asset_dir(true);
    let resolver = Arc::new(RecordingResolver::default());
    let cards = renderer(&assets, Arc::clone(&resolver));
    let player = uniform_player("Ali Kaya", "Ajax", 12.0);
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let scored = score_positions(&player, &weights).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let card = cards
        .render_to_file(&player, &scored, CardTier::Normal, &RenderOptions::default(), &mut rng)
        .expect("missing assets are not fatal");

    assert!(card.path.exists());
    assert!(card.filename.starts_with("card_Ali_Kaya_CM_"));
    assert_eq!(image::open(&card.path).unwrap().width(), ARTWORK.0);
    assert_eq!(resolver.count("portrait:Ali Kaya"), 1);
    assert_eq!(resolver.count("regional:NED"), 1);
    assert_eq!(resolver.count("team:Ajax"), 1);
    // No team page means no badge lookup.
    assert_eq!(resolver.count("badges:"), 0);
}

#[test]
fn free_agents_skip_the_team_lookup() {
    let assets = asset_dir(true);
    let resolver = Arc::new(RecordingResolver::default());
    let cards = renderer(&assets, Arc::clone(&resolver));
    let player = uniform_player("Free Agent", "0", 12.0);
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let scored = score_positions(&player, &weights).unwrap();

    let mut rng = StdRng::seed_from_u64(4);
    cards
        .render(&player, &scored, CardTier::Normal, &RenderOptions::default(), &mut rng)
        .expect("card renders");
    assert_eq!(resolver.count("team:"), 0);
}

#[test]
fn portrait_sources_are_tried_in_order() {
    let assets = asset_dir(true);
    let resolver = Arc::new(RecordingResolver::with_faces());
    let cards = renderer(&assets, Arc::clone(&resolver));
    let player = uniform_player("Sem Mulder", "Ajax", 14.0);
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let scored = score_positions(&player, &weights).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let mut upload = Vec::new();
    RgbaImage::from_pixel(100, 150, Rgba([1, 2, 3, 255]))
        .write_to(&mut Cursor::new(&mut upload), ImageFormat::Png)
        .unwrap();
    let uploaded = RenderOptions {
        uploaded_portrait: Some(upload),
        ..RenderOptions::default()
    };
    cards
        .render(&player, &scored, CardTier::Normal, &uploaded, &mut rng)
        .unwrap();
    assert_eq!(resolver.count("portrait:"), 0);
    assert_eq!(resolver.count("regional:"), 0);

    for _ in 0..2 {
        cards
            .render(&player, &scored, CardTier::Normal, &RenderOptions::default(), &mut rng)
            .unwrap();
    }
    // The second render is served from the portrait cache.
    assert_eq!(resolver.count("portrait:Sem Mulder"), 1);
    assert_eq!(resolver.count("regional:NED"), 1);
}

#[test]
fn enhanced_overall_picks_the_artwork() {
    let assets = asset_dir(true);
    let cards = renderer(&assets, Arc::new(RecordingResolver::default()));
    // 13 across the board is a silver card before the upgrade.
    let player = uniform_player("Jonas Berg", "Ajax", 13.0);
    let weights = AttributeWeightProfile::embedded_default().unwrap();
    let scored = score_positions(&player, &weights).unwrap();
    let options = RenderOptions {
        render_portrait: false,
        render_club_badge: false,
        upgrade_count: 1,
        ..RenderOptions::default()
    };

    let mut rng = StdRng::seed_from_u64(6);
    let (img, stats, playstyle) = cards
        .render(&player, &scored, CardTier::InForm, &options, &mut rng)
        .unwrap();
    assert!(stats.overall >= 75, "overall {}", stats.overall);
    assert!(playstyle.is_none());

    let gold = image::open(assets.path().join("cards").join("if_gold.png"))
        .unwrap()
        .to_rgba8();
    let silver = image::open(assets.path().join("cards").join("if_silver.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(img.get_pixel(0, 0), gold.get_pixel(0, 0));
    assert_ne!(img.get_pixel(0, 0), silver.get_pixel(0, 0));
}

#[test]
fn engine_cards_repeat_for_a_seed() {
    let assets = asset_dir(true);
    regional_pool(assets.path(), "NED");
    let output = TempDir::new().unwrap();
    let player = uniform_player("Finn Dekker", "Ajax", 15.0);
    let options = RenderOptions {
        seed: Some(2024),
        ..RenderOptions::default()
    };

    let first = offline_engine(&assets, &output)
        .render_card(&player, CardTier::Hero, &options)
        .unwrap();
    let second = offline_engine(&assets, &output)
        .render_card(&player, CardTier::Hero, &options)
        .unwrap();

    assert_ne!(first.filename, second.filename);
    assert_eq!(first.overall, second.overall);
    let a = image::open(&first.path).unwrap().to_rgba8();
    let b = image::open(&second.path).unwrap().to_rgba8();
    assert!(a.as_raw() == b.as_raw(), "same seed drew a different card");
}

#[test]
fn squad_failures_are_counted_and_left_out() {
    // No bronze artwork: the one weak player cannot be drawn.
    let assets = asset_dir(false);
    let output = TempDir::new().unwrap();
    let engine = offline_engine(&assets, &output);

    let mut roster: Vec<PlayerRecord> = (0..9)
        .map(|i| uniform_player(&format!("Starter {i}"), "Ajax", 16.0))
        .collect();
    roster.push(uniform_player("Weak Link", "Ajax", 2.0));
    for player in &mut roster {
        player.position = EVERY_POSITION.into();
    }

    let request = SquadRequest {
        club: Some("Ajax".into()),
        formation: "4-4-2".into(),
        tier: CardTier::Normal,
        include_bench: false,
        options: RenderOptions {
            render_portrait: false,
            render_club_badge: false,
            seed: Some(1),
            ..RenderOptions::default()
        },
    };
    let grid = engine.render_squad(&roster, &request).unwrap();

    assert_eq!(grid.stats.failed, 1);
    assert_eq!(grid.stats.pasted, 9);
    assert_eq!(engine.render_failures(), 1);
    assert!(grid.path.exists());
    let left: Vec<_> = fs::read_dir(output.path()).unwrap().collect();
    assert_eq!(left.len(), 1, "temporary cards should be removed");
}

#[test]
fn squad_preconditions_fail_before_rendering() {
    let assets = asset_dir(true);
    let output = TempDir::new().unwrap();
    let engine = offline_engine(&assets, &output);
    let roster = vec![uniform_player("Lone Player", "Ajax", 12.0)];

    let request = SquadRequest {
        club: Some("PSV".into()),
        formation: "4-4-2".into(),
        tier: CardTier::Normal,
        include_bench: false,
        options: RenderOptions::default(),
    };
    let err = engine.render_squad(&roster, &request).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SquadError>(),
        Some(&SquadError::NoPlayersForClub("PSV".into()))
    );
    assert_eq!(engine.render_failures(), 0);
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
}
