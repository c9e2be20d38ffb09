use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{AppError, Result};

/// Symbols used for the random suffix. 32 entries, so a byte masked to five
/// bits maps onto it without bias. Ambiguous glyphs (I, O, 0, 1) are left out.
const SUFFIX_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Configuration for ticket code generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCodeConfig {
    /// Leading segment of every code.
    pub prefix: String,
    /// Number of random suffix characters.
    pub suffix_len: usize,
    /// Number of hex characters taken from the reference digest.
    pub digest_len: usize,
}

impl Default for TicketCodeConfig {
    fn default() -> Self {
        Self {
            prefix: "TIX".to_string(),
            suffix_len: 6,
            digest_len: 8,
        }
    }
}

/// Source of random bytes for the code suffix.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), String>;
}

/// The operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), String> {
        OsRng.try_fill_bytes(buf).map_err(|e| e.to_string())
    }
}

/// Generates ticket codes of the form `PREFIX-HHHHHHHH-NNNN-SSSSSS`.
///
/// The `PREFIX-HHHHHHHH-NNNN` part is a pure function of the reference and
/// the 1-based sequence index; regenerating tickets for the same order always
/// lands in the same index space. The suffix adds collision resistance and is
/// allowed to differ between attempts.
#[derive(Clone)]
pub struct TicketCodeGenerator {
    config: TicketCodeConfig,
    entropy: Arc<dyn EntropySource>,
}

impl TicketCodeGenerator {
    pub fn new(config: TicketCodeConfig) -> Self {
        Self::with_entropy(config, Arc::new(OsEntropy))
    }

    pub fn with_default_config() -> Self {
        Self::new(TicketCodeConfig::default())
    }

    pub fn with_entropy(config: TicketCodeConfig, entropy: Arc<dyn EntropySource>) -> Self {
        Self { config, entropy }
    }

    /// Generates a code for ticket `index` (1-based) of `reference`.
    ///
    /// Fails with [`AppError::Entropy`] if the random source is unavailable;
    /// there is no degraded fallback.
    pub fn generate(&self, reference: &str, index: u32) -> Result<String> {
        if index == 0 {
            return Err(AppError::Validation(
                "ticket sequence index is 1-based".to_string(),
            ));
        }
        let suffix = self.random_suffix()?;
        Ok(format!("{}-{}", self.deterministic_prefix(reference, index), suffix))
    }

    /// The retry-stable part of a code.
    pub fn deterministic_prefix(&self, reference: &str, index: u32) -> String {
        let digest = hex::encode_upper(Sha256::digest(reference.as_bytes()));
        let len = self.config.digest_len.min(digest.len());
        format!("{}-{}-{:04}", self.config.prefix, &digest[..len], index)
    }

    fn random_suffix(&self) -> Result<String> {
        let mut bytes = vec![0u8; self.config.suffix_len];
        self.entropy
            .fill(&mut bytes)
            .map_err(AppError::Entropy)?;

        Ok(bytes
            .iter()
            .map(|b| SUFFIX_ALPHABET[(b & 0x1f) as usize] as char)
            .collect())
    }
}

impl std::fmt::Debug for TicketCodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketCodeGenerator")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for TicketCodeGenerator {
    fn default() -> Self {
        Self::with_default_config()
    }
}
