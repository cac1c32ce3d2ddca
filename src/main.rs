use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use card_forge::config::EngineConfig;
use card_forge::engine::{CardEngine, SquadRequest};
use card_forge::formation::{DEFAULT_FORMATION, FormationTemplate};
use card_forge::player::{PlayerRecord, load_roster};
use card_forge::render::RenderOptions;
use card_forge::tiers::CardTier;

const USAGE: &str = "\
usage:
  card_forge card  --roster <file> --player <name> [--tier <tier>] [--upgrades <n>]
                   [--alt] [--no-portrait] [--no-badges] [--portrait <image>] [--seed <n>]
  card_forge squad --roster <file> [--club <name>] [--formation <name>] [--tier <tier>]
                   [--bench] [--upgrades <n>] [--alt] [--no-portrait] [--no-badges] [--seed <n>]
  card_forge formations";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_default();
    match command.as_str() {
        "card" => run_card(),
        "squad" => run_squad(),
        "formations" => {
            for name in FormationTemplate::builtin_names() {
                println!("{name}");
            }
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            Err(anyhow!("unknown command {command:?}"))
        }
    }
}

fn run_card() -> Result<()> {
    let roster = load_roster(&required_path_arg("--roster")?)?;
    let name = parse_string_arg("--player").ok_or_else(|| anyhow!("--player is required"))?;
    let player = find_player(&roster, &name)?;
    let tier = parse_tier_arg()?;
    let mut options = parse_render_options();
    if let Some(path) = parse_string_arg("--portrait") {
        let bytes = std::fs::read(&path).with_context(|| format!("read portrait {path}"))?;
        options.uploaded_portrait = Some(bytes);
    }

    let engine = CardEngine::new(EngineConfig::from_env())?;
    let card = engine.render_card(player, tier, &options);
    engine.persist_caches();
    let card = card?;

    println!("Card: {}", card.path.display());
    println!("Overall: {}", card.overall);
    if let Some(playstyle) = card.playstyle {
        println!("Playstyle: {playstyle}");
    }
    Ok(())
}

fn run_squad() -> Result<()> {
    let roster = load_roster(&required_path_arg("--roster")?)?;
    let request = SquadRequest {
        club: parse_string_arg("--club"),
        formation: parse_string_arg("--formation").unwrap_or_else(|| DEFAULT_FORMATION.into()),
        tier: parse_tier_arg()?,
        include_bench: has_flag("--bench"),
        options: parse_render_options(),
    };

    let engine = CardEngine::new(EngineConfig::from_env())?;
    let grid = engine.render_squad(&roster, &request);
    engine.persist_caches();
    let grid = grid?;

    println!("Grid: {}", grid.path.display());
    println!(
        "Cards: {} pasted, {} failed, {} skipped",
        grid.stats.pasted, grid.stats.failed, grid.stats.skipped
    );
    Ok(())
}

fn find_player<'a>(roster: &'a [PlayerRecord], name: &str) -> Result<&'a PlayerRecord> {
    let needle = name.trim().to_lowercase();
    roster
        .iter()
        .find(|p| p.name.to_lowercase() == needle)
        .or_else(|| roster.iter().find(|p| p.name.to_lowercase().contains(&needle)))
        .ok_or_else(|| anyhow!("no player named {name:?} in the roster"))
}

fn parse_render_options() -> RenderOptions {
    RenderOptions {
        render_portrait: !has_flag("--no-portrait"),
        render_club_badge: !has_flag("--no-badges"),
        upgrade_count: parse_u32_arg("--upgrades").unwrap_or(0),
        use_alt_mapping: has_flag("--alt"),
        uploaded_portrait: None,
        seed: parse_u64_arg("--seed"),
    }
}

fn parse_tier_arg() -> Result<CardTier> {
    match parse_string_arg("--tier") {
        Some(raw) => raw.parse::<CardTier>(),
        None => Ok(CardTier::Normal),
    }
}

fn required_path_arg(name: &str) -> Result<PathBuf> {
    parse_string_arg(name)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("{name} is required\n{USAGE}"))
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

fn parse_u32_arg(name: &str) -> Option<u32> {
    parse_string_arg(name).and_then(|raw| raw.parse::<u32>().ok())
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_string_arg(name).and_then(|raw| raw.parse::<u64>().ok())
}
