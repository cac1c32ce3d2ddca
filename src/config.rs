use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::asset_cache::default_cache_dir;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the card artwork, fonts, flags and local portraits.
    pub asset_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where resolved asset lookups persist between runs; `None` keeps them in memory.
    pub cache_dir: Option<PathBuf>,
    /// Directory listing of generic portraits, one sub-directory per nationality.
    pub fallback_image_url: Option<String>,
    pub weights_path: Option<PathBuf>,
    pub render_parallelism: usize,
    pub asset_timeout: Duration,
    pub asset_calls_per_sec: usize,
    pub asset_cache_capacity: usize,
    pub portrait_cache_capacity: usize,
    pub asset_cache_ttl: Duration,
    pub offline: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("card_assets"),
            output_dir: PathBuf::from("output"),
            cache_dir: default_cache_dir(),
            fallback_image_url: None,
            weights_path: None,
            render_parallelism: default_parallelism(),
            asset_timeout: Duration::from_millis(1000),
            asset_calls_per_sec: 40,
            asset_cache_capacity: 500,
            portrait_cache_capacity: 1000,
            asset_cache_ttl: Duration::from_secs(6000),
            offline: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing or unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key).and_then(|val| {
                let val = val.trim().to_string();
                if val.is_empty() { None } else { Some(val) }
            })
        };
        let num = |key: &str| text(key).and_then(|val| val.parse::<u64>().ok());

        Self {
            asset_dir: text("CARD_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_dir),
            output_dir: text("CARD_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            cache_dir: text("CARD_CACHE_DIR")
                .map(PathBuf::from)
                .or(defaults.cache_dir),
            fallback_image_url: text("CARD_FALLBACK_IMAGE_URL").map(|url| {
                if url.ends_with('/') { url } else { format!("{url}/") }
            }),
            weights_path: text("CARD_WEIGHTS_PATH").map(PathBuf::from),
            render_parallelism: parse_or(text("RENDER_PARALLELISM"), defaults.render_parallelism)
                .clamp(1, 64),
            asset_timeout: Duration::from_millis(num("ASSET_TIMEOUT_MS").unwrap_or(1000).max(50)),
            asset_calls_per_sec: parse_or(text("ASSET_CALLS_PER_SEC"), defaults.asset_calls_per_sec)
                .max(1),
            asset_cache_capacity: parse_or(text("ASSET_CACHE_CAPACITY"), defaults.asset_cache_capacity)
                .max(1),
            portrait_cache_capacity: parse_or(
                text("PORTRAIT_CACHE_CAPACITY"),
                defaults.portrait_cache_capacity,
            )
            .max(1),
            asset_cache_ttl: Duration::from_secs(num("ASSET_CACHE_TTL_SECS").unwrap_or(6000)),
            offline: text("CARD_OFFLINE").is_some_and(|val| truthy(&val)),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|val| val.parse::<T>().ok()).unwrap_or(default)
}

fn truthy(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 64)
}
