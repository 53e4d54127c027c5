//! Builds the pipeline from agent settings

use std::sync::Arc;

use domain_verification::{
    ClaimStore, DailyCallBudget, HistoryPort, JoinStrategy, Tier, VerificationPipeline,
};
use infra_ocr::{
    CommandOcrConfig, CommandOcrProvider, FsEvidenceSource, ImageNormalizer, NormalizerSettings,
};

use crate::config::AgentConfig;

pub const PRIMARY_ENGINE: &str = "tesseract";
pub const SECONDARY_ENGINE: &str = "paddle";
pub const CLOUD_ENGINE: &str = "cloud";

/// Splits a command line into the engine settings
///
/// The first word is the program, the rest are leading arguments; the image
/// path is always appended last.
pub fn engine_config(name: &str, command: &str, config: &AgentConfig) -> Option<CommandOcrConfig> {
    let mut words = command.split_whitespace();
    let program = words.next()?;
    let engine = words.fold(CommandOcrConfig::new(name, program), |engine, arg| engine.arg(arg));
    Some(engine.timeout(config.verification.provider_timeout()))
}

/// Provider tiers in escalation order
///
/// The local engine keeps the best single image, the neural engine reads
/// all images together, and the cloud engine spends the shared budget.
pub fn build_tiers(config: &AgentConfig, budget: Arc<DailyCallBudget>) -> Vec<Tier> {
    let thresholds = &config.verification;
    let mut tiers = Vec::new();

    if let Some(engine) = engine_config(PRIMARY_ENGINE, &config.primary_engine, config) {
        tiers.push(Tier::new(
            Arc::new(CommandOcrProvider::new(engine)),
            thresholds.primary_threshold,
            JoinStrategy::BestOf,
        ));
    }
    if let Some(engine) = config
        .secondary_engine
        .as_deref()
        .and_then(|cmd| engine_config(SECONDARY_ENGINE, cmd, config))
    {
        tiers.push(Tier::new(
            Arc::new(CommandOcrProvider::new(engine)),
            thresholds.secondary_threshold,
            JoinStrategy::Concatenate,
        ));
    }
    if let Some(engine) = config
        .cloud_engine
        .as_deref()
        .and_then(|cmd| engine_config(CLOUD_ENGINE, cmd, config))
    {
        tiers.push(
            Tier::new(
                Arc::new(CommandOcrProvider::new(engine)),
                thresholds.cloud_threshold,
                JoinStrategy::Concatenate,
            )
            .with_budget(budget),
        );
    }
    tiers
}

/// Wires the pipeline over one store serving both claims and history
pub fn build_pipeline<S>(config: &AgentConfig, store: Arc<S>) -> VerificationPipeline
where
    S: ClaimStore + HistoryPort,
{
    let budget = Arc::new(DailyCallBudget::new(
        config.verification.cloud_daily_budget,
        config.verification.budget_timezone,
    ));
    VerificationPipeline::new(
        &config.verification,
        build_tiers(config, budget),
        store.clone(),
        store,
        Arc::new(FsEvidenceSource::new(config.evidence_root.clone())),
        Arc::new(ImageNormalizer::new(NormalizerSettings::default())),
    )
}
