//! Tiered narration synthesis.
//!
//! Narration is synthesized through three tiers of decreasing quality:
//! the ElevenLabs API, a local espeak binary, and finally generated
//! silence of the narration's estimated length. The chain guarantees
//! the assembler always receives a track for every segment.

pub mod chain;
pub mod elevenlabs;
pub mod error;
pub mod local;
pub mod traits;

pub use chain::TieredSynthesizer;
pub use elevenlabs::{ElevenLabsTier, DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_VOICE_ID};
pub use error::{TtsError, TtsResult};
pub use local::{write_silent_wav, EspeakTier, SilentTier, SILENT_SAMPLE_RATE};
pub use traits::{SpeechTier, Synthesizer};
