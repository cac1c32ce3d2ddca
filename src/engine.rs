use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::assets::{AssetResolver, HttpAssetResolver, NoopAssetResolver};
use crate::card_stats::{ScoredPositions, score_positions};
use crate::config::EngineConfig;
use crate::error::SquadError;
use crate::formation::{FormationTemplate, SquadAssignment, SquadCandidate, assign};
use crate::grid::{CardSource, ComposedGrid, Placement, compose, plan_layout};
use crate::player::PlayerRecord;
use crate::render::{CardRenderer, RenderOptions, RenderedCard};
use crate::tiers::CardTier;
use crate::weights::AttributeWeightProfile;

#[derive(Debug, Clone)]
pub struct SquadRequest {
    /// Restrict the roster to one club; `None` uses every row.
    pub club: Option<String>,
    pub formation: String,
    pub tier: CardTier,
    pub include_bench: bool,
    pub options: RenderOptions,
}

/// Scored and assigned squad, before any rendering.
#[derive(Debug, Clone)]
pub struct SquadPlan {
    pub formation: FormationTemplate,
    pub candidates: Vec<SquadCandidate>,
    /// Parallel to `candidates`.
    pub scored: Vec<ScoredPositions>,
    pub assignment: SquadAssignment,
}

/// Filter, score and assign a roster for one squad image.
pub fn plan_squad(
    roster: &[PlayerRecord],
    club: Option<&str>,
    formation: &FormationTemplate,
    include_bench: bool,
    weights: &AttributeWeightProfile,
) -> Result<SquadPlan, SquadError> {
    let in_club: Vec<(usize, &PlayerRecord)> = roster
        .iter()
        .enumerate()
        .filter(|(_, p)| club.is_none_or(|c| p.club.trim().eq_ignore_ascii_case(c.trim())))
        .collect();
    if in_club.is_empty() {
        return Err(match club {
            Some(c) => SquadError::NoPlayersForClub(c.to_string()),
            None => SquadError::NotEnoughPlayers {
                required: crate::formation::required_players(include_bench),
            },
        });
    }

    let mut candidates = Vec::new();
    let mut scored = Vec::new();
    for (idx, player) in in_club {
        if player.is_goalkeeper_only() {
            continue;
        }
        match score_positions(player, weights) {
            Some(s) => {
                candidates.push(SquadCandidate::from_scored(idx, &player.name, &s));
                scored.push(s);
            }
            None => tracing::debug!("{} has no usable position", player.name),
        }
    }

    let assignment = assign(&candidates, formation, include_bench)?;
    Ok(SquadPlan {
        formation: formation.clone(),
        candidates,
        scored,
        assignment,
    })
}

/// Deterministic per-card stream: same request seed and index, same draws.
pub fn card_rng(seed: u64, index: usize) -> StdRng {
    let mix = (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    StdRng::seed_from_u64(seed ^ mix)
}

pub struct CardEngine {
    config: EngineConfig,
    weights: Arc<AttributeWeightProfile>,
    http: Option<Arc<HttpAssetResolver>>,
    renderer: CardRenderer,
    failures: AtomicUsize,
}

impl CardEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.offline {
            let resolver = Arc::new(NoopAssetResolver::with_local_pool(&config.asset_dir));
            return Self::with_resolver(config, resolver);
        }
        let http = Arc::new(HttpAssetResolver::new(&config)?);
        let mut engine = Self::with_resolver(config, http.clone())?;
        engine.http = Some(http);
        Ok(engine)
    }

    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn AssetResolver>) -> Result<Self> {
        let weights = Arc::new(AttributeWeightProfile::load_with_override(
            config.weights_path.as_deref(),
        )?);
        let renderer = CardRenderer::new(&config, resolver, Arc::clone(&weights))?;
        Ok(Self {
            config,
            weights,
            http: None,
            renderer,
            failures: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn weights(&self) -> &AttributeWeightProfile {
        &self.weights
    }

    /// Cards that failed to render since the engine was built.
    pub fn render_failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn render_card(
        &self,
        player: &PlayerRecord,
        tier: CardTier,
        options: &RenderOptions,
    ) -> Result<RenderedCard> {
        let scored = score_positions(player, &self.weights)
            .ok_or_else(|| anyhow!("{} has no usable position", player.name))?;
        let mut rng = card_rng(options.seed.unwrap_or_else(rand::random), 0);
        let card = self
            .renderer
            .render_to_file(player, &scored, tier, options, &mut rng);
        if card.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        card
    }

    pub fn render_squad(
        &self,
        roster: &[PlayerRecord],
        request: &SquadRequest,
    ) -> Result<ComposedGrid> {
        let formation = FormationTemplate::by_name(&request.formation)?;
        let plan = plan_squad(
            roster,
            request.club.as_deref(),
            &formation,
            request.include_bench,
            &self.weights,
        )?;
        let card_size = self.renderer.card_size(request.tier)?;
        let layout = plan_layout(&plan.assignment, &plan.formation, card_size);
        tracing::info!(
            "rendering {} cards for {} ({})",
            layout.placements.len(),
            request.club.as_deref().unwrap_or("roster"),
            formation
        );
        let source = SquadCards {
            engine: self,
            roster,
            plan: &plan,
            tier: request.tier,
            options: &request.options,
            seed: request.options.seed.unwrap_or_else(rand::random),
        };
        compose(
            &layout,
            &source,
            &self.config.output_dir,
            self.config.render_parallelism,
        )
    }

    /// Save resolved asset lookups for the next run.
    pub fn persist_caches(&self) {
        if let Some(http) = &self.http {
            http.persist();
        }
    }
}

struct SquadCards<'a> {
    engine: &'a CardEngine,
    roster: &'a [PlayerRecord],
    plan: &'a SquadPlan,
    tier: CardTier,
    options: &'a RenderOptions,
    seed: u64,
}

impl CardSource for SquadCards<'_> {
    fn render_card(&self, placement: &Placement) -> Result<PathBuf> {
        let candidate = &self.plan.candidates[placement.player];
        let player = &self.roster[candidate.roster_index];
        let scored = &self.plan.scored[placement.player];
        let mut rng = card_rng(self.seed, placement.player);
        match self
            .engine
            .renderer
            .render_to_file(player, scored, self.tier, self.options, &mut rng)
        {
            Ok(card) => Ok(card.path),
            Err(err) => {
                self.engine.failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn outfielder(name: &str, club: &str, position: &str) -> PlayerRecord {
        let mut p = PlayerRecord::new(name);
        p.club = club.into();
        p.position = position.into();
        for code in ["Acc", "Pac", "Fin", "Tck", "Mar", "Pas", "Str"] {
            p.attributes.insert(code.into(), 12.0);
        }
        p
    }

    #[test]
    fn unknown_club_is_reported() {
        let roster = vec![outfielder("A B", "Ajax", "STC")];
        let weights = AttributeWeightProfile::embedded_default().unwrap();
        let formation = FormationTemplate::by_name("4-4-2").unwrap();
        let err = plan_squad(&roster, Some("Feyenoord"), &formation, false, &weights).unwrap_err();
        assert_eq!(err.to_string(), "No players found for the club: Feyenoord");
    }

    #[test]
    fn goalkeepers_are_dropped_before_counting() {
        let mut roster: Vec<_> = (0..10)
            .map(|i| outfielder(&format!("Out {i}"), "Ajax", "DC"))
            .collect();
        roster[0].position = "GK".into();
        let weights = AttributeWeightProfile::embedded_default().unwrap();
        let formation = FormationTemplate::by_name("4-4-2").unwrap();
        let err = plan_squad(&roster, Some("ajax"), &formation, false, &weights).unwrap_err();
        assert_eq!(err, SquadError::NotEnoughPlayers { required: 10 });
    }

    #[test]
    fn card_streams_repeat_per_index() {
        let a: u32 = card_rng(42, 3).r#gen();
        let b: u32 = card_rng(42, 3).r#gen();
        let c: u32 = card_rng(42, 4).r#gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
