//! Ordered tier chain.
//!
//! Tiers run strictly forward: remote, then local, then silent. A tier
//! that is unavailable is skipped proactively; a tier that fails logs a
//! warning and hands off to the next. There are no retries and no
//! backward transitions, so a degraded run degrades exactly once per
//! segment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use trialreel_models::SpeechSource;

use crate::elevenlabs::ElevenLabsTier;
use crate::error::{TtsError, TtsResult};
use crate::local::{EspeakTier, SilentTier};
use crate::traits::{SpeechTier, Synthesizer};

/// The standard three-tier synthesizer.
pub struct TieredSynthesizer {
    tiers: Vec<Box<dyn SpeechTier>>,
}

impl TieredSynthesizer {
    /// Remote, local, and silent tiers configured from the environment.
    pub fn from_env() -> TtsResult<Self> {
        Ok(Self {
            tiers: vec![
                Box::new(ElevenLabsTier::from_env()?),
                Box::new(EspeakTier::discover()),
                Box::new(SilentTier),
            ],
        })
    }

    /// Build a chain from explicit tiers (tests).
    pub fn with_tiers(tiers: Vec<Box<dyn SpeechTier>>) -> Self {
        Self { tiers }
    }
}

#[async_trait]
impl Synthesizer for TieredSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        estimated_duration: f64,
        out_stem: &Path,
    ) -> TtsResult<(PathBuf, SpeechSource)> {
        for tier in &self.tiers {
            if !tier.available() {
                debug!("Skipping unavailable synthesis tier {}", tier.name());
                continue;
            }

            let out = out_stem.with_extension(tier.extension());
            match tier.run(text, estimated_duration, &out).await {
                Ok(()) => {
                    info!(
                        "Narration synthesized by {} tier -> {}",
                        tier.name(),
                        out.display()
                    );
                    return Ok((out, tier.source()));
                }
                Err(e) => {
                    warn!("Synthesis tier {} failed: {}", tier.name(), e);
                }
            }
        }

        Err(TtsError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTier {
        name: &'static str,
        source: SpeechSource,
        available: bool,
        fails: bool,
    }

    #[async_trait]
    impl SpeechTier for StubTier {
        fn name(&self) -> &'static str {
            self.name
        }

        fn source(&self) -> SpeechSource {
            self.source
        }

        fn extension(&self) -> &'static str {
            "wav"
        }

        fn available(&self) -> bool {
            self.available
        }

        async fn run(&self, _text: &str, _est: f64, out: &Path) -> TtsResult<()> {
            if self.fails {
                Err(TtsError::engine_failed("stub failure"))
            } else {
                std::fs::write(out, b"audio")?;
                Ok(())
            }
        }
    }

    fn stub(name: &'static str, source: SpeechSource, available: bool, fails: bool) -> Box<dyn SpeechTier> {
        Box::new(StubTier {
            name,
            source,
            available,
            fails,
        })
    }

    #[tokio::test]
    async fn test_first_available_tier_wins() {
        let chain = TieredSynthesizer::with_tiers(vec![
            stub("remote", SpeechSource::Remote, true, false),
            stub("local", SpeechSource::Local, true, false),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let (path, source) = chain
            .synthesize("text", 5.0, &dir.path().join("segment_0"))
            .await
            .unwrap();

        assert_eq!(source, SpeechSource::Remote);
        assert!(path.ends_with("segment_0.wav"));
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_next_tier() {
        let chain = TieredSynthesizer::with_tiers(vec![
            stub("remote", SpeechSource::Remote, true, true),
            stub("local", SpeechSource::Local, true, false),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let (_, source) = chain
            .synthesize("text", 5.0, &dir.path().join("segment_0"))
            .await
            .unwrap();

        assert_eq!(source, SpeechSource::Local);
    }

    #[tokio::test]
    async fn test_unavailable_tier_is_skipped_silently() {
        let chain = TieredSynthesizer::with_tiers(vec![
            stub("remote", SpeechSource::Remote, false, false),
            stub("silent", SpeechSource::Silent, true, false),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let (_, source) = chain
            .synthesize("text", 5.0, &dir.path().join("segment_0"))
            .await
            .unwrap();

        assert_eq!(source, SpeechSource::Silent);
    }

    #[tokio::test]
    async fn test_exhausted_chain_errors() {
        let chain = TieredSynthesizer::with_tiers(vec![
            stub("remote", SpeechSource::Remote, true, true),
            stub("local", SpeechSource::Local, false, false),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let err = chain
            .synthesize("text", 5.0, &dir.path().join("segment_0"))
            .await
            .unwrap_err();

        assert!(matches!(err, TtsError::Exhausted));
    }
}
