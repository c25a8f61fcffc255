//! Execution options for tokenization.
//!
//! The error mode decides what happens when a rule fails to apply during
//! tokenization: strict mode aborts the call, lenient mode reports the
//! failure through `tracing` and continues with the remaining rules.
//! Lenient is the default posture, suited to best-effort highlighting of
//! arbitrary text.

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{SyntaxError, SyntaxResult};

/// Policy applied when a rule's guard or extractor fails, or when an
/// embedded grammar cannot be resolved mid-tokenization.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Failing rules contribute no match for the failing occurrence;
    /// tokenization continues. Failures are reported via `tracing::warn!`.
    #[default]
    Lenient,
    /// The first rule failure aborts the tokenization call. No partial
    /// tree is returned.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub mode: ErrorMode,

    /// Upper bound on alias-chain and derivation-chain length. Exceeding
    /// it indicates a registration cycle, which is a programming error.
    #[serde(default = "default_chain_depth_limit")]
    pub chain_depth_limit: usize,
}

fn default_chain_depth_limit() -> usize {
    32
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: ErrorMode::default(),
            chain_depth_limit: default_chain_depth_limit(),
        }
    }
}

impl Options {
    pub fn strict() -> Self {
        Self {
            mode: ErrorMode::Strict,
            ..Default::default()
        }
    }

    pub fn is_strict(&self) -> bool {
        self.mode == ErrorMode::Strict
    }

    /// Loads options from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SyntaxResult<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| SyntaxError::internal(format!("failed to open options file: {}", e)))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| SyntaxError::internal(format!("failed to parse options file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_mode_is_lenient() {
        let options = Options::default();
        assert_eq!(options.mode, ErrorMode::Lenient);
        assert!(!options.is_strict());
    }

    #[test]
    fn test_mode_round_trips_through_strings() {
        assert_eq!(ErrorMode::from_str("strict").unwrap(), ErrorMode::Strict);
        assert_eq!(ErrorMode::Strict.to_string(), "strict");
        assert_eq!(ErrorMode::Lenient.to_string(), "lenient");
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(options.mode, ErrorMode::Lenient);
        assert_eq!(options.chain_depth_limit, 32);

        let options: Options = serde_json::from_str(r#"{"mode": "strict"}"#).unwrap();
        assert!(options.is_strict());
    }

    #[test]
    fn test_options_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mode": "strict", "chain_depth_limit": 8}}"#).unwrap();

        let options = Options::from_file(file.path()).unwrap();
        assert!(options.is_strict());
        assert_eq!(options.chain_depth_limit, 8);
    }
}
