use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::DynamicImage;
use once_cell::sync::Lazy;
use rand::RngCore;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::asset_cache::TtlCache;
use crate::config::EngineConfig;
use crate::http_client::asset_client;
use crate::rate_limit::RateLimiter;

const TEAM_SEARCH_URL: &str = "https://sortitoutsi.net/search/database";
const PLAYER_SUGGEST_URL: &str = "https://sofifa.com/api/player/suggestion";
const PLAYER_PAGE_URL: &str = "https://sofifa.com/player/";
/// Suggestion authors from these editions carry outdated photos.
const EXCLUDED_AUTHORS: [&str; 6] = ["07", "08", "09", "10", "11", "12"];

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\s([^>]*)>(.*?)</a>"#).expect("valid anchor regex"));
static IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\s([^>]*)>"#).expect("valid img regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)([\w][\w-]*)\s*=\s*["']([^"']*)["']"#).expect("valid attribute regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBadges {
    pub club_badge: Option<String>,
    pub league_badge: Option<String>,
    pub league_name: Option<String>,
}

/// Lookup of third-party card assets. Every method is best-effort: a failed
/// or empty lookup is `None`, never an error.
pub trait AssetResolver: Send + Sync {
    fn resolve_team_page(&self, team: &str) -> Option<String>;
    fn resolve_badge_and_league(&self, team_page_url: &str) -> TeamBadges;
    fn resolve_portrait(&self, player_name: &str) -> Option<PathBuf>;
    /// Random generic portrait for a nationality, picked with `rng` so a
    /// seeded render always gets the same face.
    fn regional_fallback(&self, nationality: &str, rng: &mut dyn RngCore)
    -> Option<DynamicImage>;
    /// Fetch a remote image into `dest`, reusing an earlier download of the same URL.
    fn download_image(&self, url: &str, dest: &Path) -> Option<PathBuf>;
}

/// Offline resolver. Only the local regional portrait pool is consulted.
#[derive(Debug, Clone, Default)]
pub struct NoopAssetResolver {
    asset_dir: Option<PathBuf>,
}

impl NoopAssetResolver {
    pub fn with_local_pool(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: Some(asset_dir.into()),
        }
    }
}

impl AssetResolver for NoopAssetResolver {
    fn resolve_team_page(&self, _team: &str) -> Option<String> {
        None
    }

    fn resolve_badge_and_league(&self, _team_page_url: &str) -> TeamBadges {
        TeamBadges::default()
    }

    fn resolve_portrait(&self, _player_name: &str) -> Option<PathBuf> {
        None
    }

    fn regional_fallback(
        &self,
        nationality: &str,
        rng: &mut dyn RngCore,
    ) -> Option<DynamicImage> {
        local_regional_portrait(self.asset_dir.as_deref()?, nationality, rng)
    }

    fn download_image(&self, _url: &str, _dest: &Path) -> Option<PathBuf> {
        None
    }
}

/// Resolver backed by the public team database and player photo sites.
pub struct HttpAssetResolver {
    client: Client,
    limiter: RateLimiter,
    lookups: TtlCache<String>,
    badges: TtlCache<TeamBadges>,
    asset_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    fallback_url: Option<String>,
}

impl HttpAssetResolver {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let resolver = Self {
            client: asset_client(config.asset_timeout)?,
            limiter: RateLimiter::per_second(config.asset_calls_per_sec),
            lookups: TtlCache::new(config.asset_cache_capacity, config.asset_cache_ttl),
            badges: TtlCache::new(config.asset_cache_capacity, config.asset_cache_ttl),
            asset_dir: config.asset_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            fallback_url: config.fallback_image_url.clone(),
        };
        if let Some(dir) = &resolver.cache_dir {
            resolver.lookups.load(&dir.join("asset_lookups.json"));
            resolver.badges.load(&dir.join("team_badges.json"));
        }
        Ok(resolver)
    }

    /// Write resolved lookups to the cache directory for the next run.
    pub fn persist(&self) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        if let Err(err) = self.lookups.save(&dir.join("asset_lookups.json")) {
            tracing::warn!("saving asset lookups failed: {err:#}");
        }
        if let Err(err) = self.badges.save(&dir.join("team_badges.json")) {
            tracing::warn!("saving team badges failed: {err:#}");
        }
    }

    fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Option<String> {
        self.limiter.acquire();
        let resp = match self.client.get(url).query(query).send() {
            Ok(resp) => resp,
            Err(err) => {
                tracing::debug!("asset request {url} failed: {err}");
                return None;
            }
        };
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("asset request {url} returned http {status}");
            return None;
        }
        resp.text().ok()
    }

    fn get_bytes(&self, url: &str) -> Option<Vec<u8>> {
        self.limiter.acquire();
        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(err) => {
                tracing::debug!("image request {url} failed: {err}");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!("image request {url} returned http {}", resp.status());
            return None;
        }
        resp.bytes().ok().map(|b| b.to_vec())
    }

    fn player_page_url(&self, player_name: &str) -> Option<String> {
        let body = self.get_text(
            PLAYER_SUGGEST_URL,
            &[("gender", "0"), ("hl", "en-US"), ("term", player_name)],
        )?;
        let suggestions: Vec<PlayerSuggestion> = match serde_json::from_str(&body) {
            Ok(list) => list,
            Err(err) => {
                tracing::debug!("player suggestions for {player_name} unreadable: {err}");
                return None;
            }
        };
        let id = first_current_suggestion(&suggestions)?;
        Some(format!("{PLAYER_PAGE_URL}{id}"))
    }
}

impl AssetResolver for HttpAssetResolver {
    fn resolve_team_page(&self, team: &str) -> Option<String> {
        let team = team.trim();
        if team.is_empty() {
            return None;
        }
        self.lookups.get_or_fetch(&format!("team:{team}"), || {
            let html = self.get_text(TEAM_SEARCH_URL, &[("search", team), ("type", "team")])?;
            let url = best_team_link(&html, team);
            if url.is_none() {
                tracing::info!("no team page found for {team}");
            }
            url
        })
    }

    fn resolve_badge_and_league(&self, team_page_url: &str) -> TeamBadges {
        self.badges
            .get_or_fetch(team_page_url, || {
                let html = self.get_text(team_page_url, &[])?;
                Some(parse_team_page(&html))
            })
            .unwrap_or_default()
    }

    fn resolve_portrait(&self, player_name: &str) -> Option<PathBuf> {
        let path = self
            .asset_dir
            .join("player_img")
            .join(format!("{}.png", camel_case(player_name)));
        if path.exists() {
            return Some(path);
        }
        let page_url = self.player_page_url(player_name)?;
        let html = self.get_text(&page_url, &[])?;
        let Some(image_url) = parse_portrait_url(&html) else {
            tracing::info!("no portrait on player page for {player_name}");
            return None;
        };
        self.download_image(&image_url, &path)
    }

    fn regional_fallback(
        &self,
        nationality: &str,
        rng: &mut dyn RngCore,
    ) -> Option<DynamicImage> {
        if let Some(img) = local_regional_portrait(&self.asset_dir, nationality, rng) {
            return Some(img);
        }
        let base = self.fallback_url.as_deref()?;
        let dir_url = format!("{base}{nationality}/");
        let listing = self.get_text(&dir_url, &[])?;
        let links = parse_directory_listing(&listing);
        let Some(pick) = links.choose(rng) else {
            tracing::info!("no fallback portraits listed at {dir_url}");
            return None;
        };
        let bytes = self.get_bytes(&format!("{dir_url}{pick}"))?;
        match image::load_from_memory(&bytes) {
            Ok(img) => Some(img),
            Err(err) => {
                tracing::warn!("fallback portrait {pick} undecodable: {err}");
                None
            }
        }
    }

    fn download_image(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        let cached = self.lookups.get(&format!("img:{url}")).map(PathBuf::from);
        if let Some(path) = cached
            && path.exists()
        {
            return Some(path);
        }
        let bytes = self.get_bytes(url)?;
        let img = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(err) => {
                tracing::warn!("image at {url} undecodable: {err}");
                return None;
            }
        };
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir).ok();
        }
        if let Err(err) = img.save(dest) {
            tracing::warn!("saving {} failed: {err}", dest.display());
            return None;
        }
        self.lookups
            .insert(format!("img:{url}"), dest.to_string_lossy().into_owned());
        Some(dest.to_path_buf())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSuggestion {
    pub id: u64,
    #[serde(default)]
    pub author: Option<String>,
}

/// First suggestion that names an author outside the excluded editions.
pub fn first_current_suggestion(suggestions: &[PlayerSuggestion]) -> Option<u64> {
    suggestions
        .iter()
        .find(|s| {
            s.author
                .as_deref()
                .is_some_and(|author| !EXCLUDED_AUTHORS.iter().any(|ex| author.contains(ex)))
        })
        .map(|s| s.id)
}

/// Best matching `item-title` link on a team search page. An exact name
/// match stops the scan.
pub fn best_team_link(html: &str, term: &str) -> Option<String> {
    let term = term.to_lowercase();
    let mut best: Option<(f64, String)> = None;
    for cap in ANCHOR_RE.captures_iter(html) {
        let attrs = &cap[1];
        if !attr_value(attrs, "class").is_some_and(|class| class.contains("item-title")) {
            continue;
        }
        let Some(href) = attr_value(attrs, "href") else {
            continue;
        };
        let text = inner_text(&cap[2]).to_lowercase();
        let ratio = strsim::normalized_levenshtein(&term, &text);
        if best.as_ref().is_none_or(|(r, _)| ratio > *r) {
            best = Some((
                ratio,
                href.replace("football-manager", "football-manager-2024"),
            ));
        }
        if ratio >= 1.0 {
            break;
        }
    }
    best.filter(|(r, _)| *r > 0.0).map(|(_, href)| href)
}

/// Club badge, league badge and league name from a team page.
pub fn parse_team_page(html: &str) -> TeamBadges {
    let mut badges = TeamBadges::default();
    for cap in IMG_RE.captures_iter(html) {
        let Some(src) = attr_value(&cap[1], "src") else {
            continue;
        };
        if badges.league_badge.is_none() && src.contains("comp") {
            badges.league_badge = Some(src.clone());
        }
        if badges.club_badge.is_none() && src.contains("team/") && !src.contains("team_sm/") {
            badges.club_badge = Some(src);
        }
    }
    badges.league_name = ANCHOR_RE.captures_iter(html).find_map(|cap| {
        let href = attr_value(&cap[1], "href")?;
        if !href.contains("competition") {
            return None;
        }
        let text = inner_text(&cap[2]);
        if text.is_empty() { None } else { Some(text) }
    });
    badges
}

/// Largest image from the `data-srcset` of the player photo.
pub fn parse_portrait_url(html: &str) -> Option<String> {
    IMG_RE.captures_iter(html).find_map(|cap| {
        let attrs = &cap[1];
        if attr_value(attrs, "data-type").as_deref() != Some("player") {
            return None;
        }
        let srcset = attr_value(attrs, "data-srcset")?;
        srcset
            .split(", ")
            .last()
            .and_then(|entry| entry.split_whitespace().next())
            .map(str::to_string)
    })
}

/// `.png` links of a plain directory listing.
pub fn parse_directory_listing(html: &str) -> Vec<String> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|cap| attr_value(&cap[1], "href"))
        .filter(|href| href.ends_with(".png"))
        .collect()
}

/// Random `.png` from `{asset_dir}/player_img/regen/{nationality}`. The pool
/// is sorted first so the pick depends only on `rng`.
pub fn local_regional_portrait(
    asset_dir: &Path,
    nationality: &str,
    rng: &mut dyn RngCore,
) -> Option<DynamicImage> {
    let dir = asset_dir.join("player_img").join("regen").join(nationality);
    let entries = fs::read_dir(&dir).ok()?;
    let mut pool: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    pool.sort();
    let pick = pool.choose(rng)?;
    match image::open(pick) {
        Ok(img) => Some(img),
        Err(err) => {
            tracing::warn!("regional portrait {} unreadable: {err}", pick.display());
            None
        }
    }
}

/// "lionel andrés messi" -> "LionelAndrésMessi", the local portrait file stem.
pub fn camel_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn attr_value(attrs: &str, name: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(attrs)
        .find(|cap| cap[1].eq_ignore_ascii_case(name))
        .map(|cap| cap[2].to_string())
}

fn inner_text(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}
