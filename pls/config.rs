use crate::crosscov::CrossBlockMode;
use crate::types::PlsError;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_PERMUTATIONS: usize = 5000;
pub const DEFAULT_BOOTSTRAPS: usize = 5000;
pub const DEFAULT_CI: f64 = 95.0;
pub const DEFAULT_SPLITS: usize = 0;
pub const DEFAULT_MAX_FAILURE_FRACTION: f64 = 0.05;

/// Errors reading or writing TOML documents (configuration files and result bundles).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read or write file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// User-facing analysis options. Every field is optional in the TOML form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlsConfig {
    /// Number of permutations for the significance test.
    pub n_perm: usize,
    /// Number of bootstrap resamples for loading reliability.
    pub n_boot: usize,
    /// Master seed. Chosen from OS entropy when absent.
    pub seed: Option<u64>,
    /// Decompose the covariance instead of the correlation between blocks.
    pub covariance: bool,
    /// Compare Procrustes-rescaled permuted singular values instead of raw ones.
    pub rotate: bool,
    /// Width of the percentile intervals, in percent.
    pub ci: f64,
    /// Split-half resamples per decomposition. Zero skips split-half reliability.
    pub n_split: usize,
    /// Worker threads. Defaults to the number of logical CPUs.
    pub threads: Option<usize>,
    /// Largest fraction of draws a procedure may exclude before it fails.
    pub max_failure_fraction: f64,
}

impl Default for PlsConfig {
    fn default() -> Self {
        Self {
            n_perm: DEFAULT_PERMUTATIONS,
            n_boot: DEFAULT_BOOTSTRAPS,
            seed: None,
            covariance: false,
            rotate: false,
            ci: DEFAULT_CI,
            n_split: DEFAULT_SPLITS,
            threads: None,
            max_failure_fraction: DEFAULT_MAX_FAILURE_FRACTION,
        }
    }
}

/// Configuration with every default fixed, recorded in the result bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub n_perm: usize,
    pub n_boot: usize,
    pub seed: u64,
    pub mode: CrossBlockMode,
    pub rotate: bool,
    pub ci: f64,
    pub n_split: usize,
    pub threads: usize,
    pub max_failure_fraction: f64,
}

impl PlsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Validates the options and fixes the seed and the worker count.
    pub fn resolve(&self) -> Result<ResolvedConfig, PlsError> {
        if self.n_perm == 0 {
            return Err(PlsError::InvalidConfig(
                "n_perm must be at least 1".to_string(),
            ));
        }
        if self.n_boot < 2 {
            return Err(PlsError::InvalidConfig(format!(
                "n_boot must be at least 2 to estimate a standard error, got {}",
                self.n_boot
            )));
        }
        if !(self.ci > 0.0 && self.ci < 100.0) {
            return Err(PlsError::InvalidConfig(format!(
                "ci must lie strictly between 0 and 100, got {}",
                self.ci
            )));
        }
        if !(0.0..=1.0).contains(&self.max_failure_fraction) {
            return Err(PlsError::InvalidConfig(format!(
                "max_failure_fraction must lie in [0, 1], got {}",
                self.max_failure_fraction
            )));
        }
        if self.threads == Some(0) {
            return Err(PlsError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        // Result bundles are written as TOML, whose integers are signed 64-bit.
        if let Some(seed) = self.seed.filter(|&seed| seed > i64::MAX as u64) {
            return Err(PlsError::InvalidConfig(format!(
                "seed must not exceed {}, got {seed}",
                i64::MAX
            )));
        }

        let seed = match self.seed {
            Some(seed) => seed,
            None => {
                let seed = OsRng.next_u64() >> 1;
                log::info!("No seed given; using {seed}");
                seed
            }
        };
        let threads = self.threads.unwrap_or_else(num_cpus::get).max(1);

        Ok(ResolvedConfig {
            n_perm: self.n_perm,
            n_boot: self.n_boot,
            seed,
            mode: if self.covariance {
                CrossBlockMode::Covariance
            } else {
                CrossBlockMode::Correlation
            },
            rotate: self.rotate,
            ci: self.ci,
            n_split: self.n_split,
            threads,
            max_failure_fraction: self.max_failure_fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_resolve_with_a_fresh_seed() {
        let resolved = PlsConfig::default().resolve().unwrap();
        assert_eq!(resolved.n_perm, 5000);
        assert_eq!(resolved.n_boot, 5000);
        assert_eq!(resolved.mode, CrossBlockMode::Correlation);
        assert!(!resolved.rotate);
        assert!(resolved.threads >= 1);
        assert!(resolved.seed <= i64::MAX as u64);
    }

    #[test]
    fn explicit_seed_is_kept() {
        let config = PlsConfig {
            seed: Some(42),
            threads: Some(3),
            covariance: true,
            ..PlsConfig::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.seed, 42);
        assert_eq!(resolved.threads, 3);
        assert_eq!(resolved.mode, CrossBlockMode::Covariance);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let cases = [
            PlsConfig {
                n_perm: 0,
                ..PlsConfig::default()
            },
            PlsConfig {
                n_boot: 1,
                ..PlsConfig::default()
            },
            PlsConfig {
                ci: 100.0,
                ..PlsConfig::default()
            },
            PlsConfig {
                max_failure_fraction: 1.5,
                ..PlsConfig::default()
            },
            PlsConfig {
                threads: Some(0),
                ..PlsConfig::default()
            },
            PlsConfig {
                seed: Some(u64::MAX),
                ..PlsConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.resolve(), Err(PlsError::InvalidConfig(_))));
        }
    }

    #[test]
    fn partial_toml_files_fill_in_defaults() {
        let config: PlsConfig = toml::from_str("n_perm = 100\nrotate = true\n").unwrap();
        assert_eq!(config.n_perm, 100);
        assert!(config.rotate);
        assert_eq!(config.n_boot, DEFAULT_BOOTSTRAPS);
        assert_eq!(config.n_split, 0);
        assert!(toml::from_str::<PlsConfig>("n_permutations = 3\n").is_err());
    }

    #[test]
    fn config_survives_a_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = PlsConfig {
            n_perm: 250,
            seed: Some(7),
            ci: 90.0,
            n_split: 50,
            ..PlsConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PlsConfig::load(&path).unwrap(), config);
    }
}
