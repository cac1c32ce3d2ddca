pub mod asset_cache;
pub mod assets;
pub mod card_stats;
pub mod config;
pub mod engine;
pub mod enhance;
pub mod error;
pub mod formation;
pub mod grid;
pub mod http_client;
pub mod player;
pub mod positions;
pub mod rate_limit;
pub mod render;
pub mod tiers;
pub mod weights;
