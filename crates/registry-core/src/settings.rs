use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Category;

/// Directory name of the tool's per-user state under `$HOME`.
pub const STATE_DIR_NAME: &str = ".registry-analytics";

/// Fallback data root when nothing was configured.
pub const DEFAULT_DATA_DIR: &str = "data";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Aggregate civil-registry enrolment, demographic and biometric extracts
#[derive(Parser, Debug, Clone)]
#[command(
    name = "registry-analytics",
    about = "Aggregate civil-registry enrolment, demographic and biometric extracts",
    version
)]
pub struct Settings {
    /// Base directory holding one export folder per category
    #[arg(long, global = true, env = "REGISTRY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the enrolment source directory
    #[arg(long, global = true)]
    pub enrolment_dir: Option<PathBuf>,

    /// Override the demographic source directory
    #[arg(long, global = true)]
    pub demographic_dir: Option<PathBuf>,

    /// Override the biometric source directory
    #[arg(long, global = true)]
    pub biometric_dir: Option<PathBuf>,

    /// Abandon a load after this many seconds and keep the last good data
    #[arg(long, global = true, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    pub load_timeout_secs: u64,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Named analytical queries exposed on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Record counts and cohort totals per category
    Stats,
    /// Headline numbers across all categories
    Overview,
    /// Cohort sums per state for one category
    StateSummary {
        #[arg(long, default_value = "enrolment", value_parser = ["enrolment", "demographic", "biometric"])]
        category: String,
    },
    /// States ranked by total enrolment
    StateLeaderboard {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Cohort sums per date
    Trends {
        #[arg(long, default_value = "enrolment", value_parser = ["enrolment", "demographic", "biometric"])]
        category: String,
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Top districts by total enrolment
    DistrictRankings {
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Every district of one state with its enrolment totals
    DistrictBreakdown {
        #[arg(long)]
        state: String,
    },
    /// Enrolment totals and shares per age cohort
    AgeDistribution,
    /// Infant vs adult enrolments per district
    DistrictCohorts {
        #[arg(long)]
        state: Option<String>,
    },
    /// Enrolments not yet matched by biometric captures, per state
    CoverageGap {
        /// Denominator for coverage: all enrolments or only the 5+ cohorts
        #[arg(long, default_value = "total", value_parser = ["total", "eligible"])]
        basis: String,
    },
    /// Pearson correlation between enrolment and biometric cohorts by state
    Correlation,
    /// Per-category load report (files loaded, files skipped)
    Report,
    /// Keep the data loaded and reload it on an interval
    Watch {
        #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
    },
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.registry-analytics/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_timeout_secs: Option<u64>,
}

impl LastUsedParams {
    /// Default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(STATE_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params; `Default` when the file is absent or unreadable.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at `path` if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit args and config path.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "could not clear saved configuration");
            }
            return settings.apply_debug();
        }

        let last = LastUsedParams::load_from(config_path);

        // Explicit CLI / env values always win.
        if !is_arg_explicitly_set(&matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if !is_arg_explicitly_set(&matches, "log_level") {
            if let Some(v) = last.log_level {
                settings.log_level = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "load_timeout_secs") {
            if let Some(v) = last.load_timeout_secs {
                settings.load_timeout_secs = v;
            }
        }

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::debug!(error = %e, "could not persist last-used settings");
        }

        settings.apply_debug()
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut self) -> Self {
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Base data directory, falling back to `./data`.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Source directory for `category`: the explicit override, or the
    /// registry's export folder under the data root.
    pub fn category_dir(&self, category: Category) -> PathBuf {
        let explicit = match category {
            Category::Enrolment => self.enrolment_dir.as_ref(),
            Category::Demographic => self.demographic_dir.as_ref(),
            Category::Biometric => self.biometric_dir.as_ref(),
        };
        explicit
            .cloned()
            .unwrap_or_else(|| self.data_root().join(category.default_folder()))
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_dir: s.data_dir.clone(),
            log_level: Some(s.log_level.clone()),
            load_timeout_secs: Some(s.load_timeout_secs),
        }
    }
}

/// `true` when `name` came from the command line or the environment rather
/// than a default.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            data_dir: Some(PathBuf::from("/srv/registry")),
            log_level: Some("WARNING".to_string()),
            load_timeout_secs: Some(60),
        };
        params.save_to(&path).expect("save");

        assert_eq!(LastUsedParams::load_from(&path), params);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_last_used_params_default_when_missing_or_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
        // Clearing twice is fine.
        LastUsedParams::clear_at(&path).expect("clear again");
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["registry-analytics"]);
        assert!(settings.data_dir.is_none());
        assert_eq!(settings.load_timeout_secs, 300);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
        assert!(!settings.pretty);
        assert!(settings.command.is_none());
        assert_eq!(settings.data_root(), PathBuf::from("data"));
    }

    #[test]
    fn test_settings_subcommand_parsing() {
        let settings = Settings::parse_from([
            "registry-analytics",
            "district-rankings",
            "--state",
            "Goa",
            "--limit",
            "5",
        ]);
        assert_eq!(
            settings.command,
            Some(Command::DistrictRankings {
                state: Some("Goa".to_string()),
                limit: 5
            })
        );

        let settings = Settings::parse_from(["registry-analytics", "coverage-gap"]);
        assert_eq!(
            settings.command,
            Some(Command::CoverageGap {
                basis: "total".to_string()
            })
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let settings =
            Settings::parse_from(["registry-analytics", "stats", "--data-dir", "/drops", "--pretty"]);
        assert_eq!(settings.data_dir, Some(PathBuf::from("/drops")));
        assert!(settings.pretty);
        assert_eq!(settings.command, Some(Command::Stats));
    }

    #[test]
    fn test_category_dir_defaults_and_overrides() {
        let settings = Settings::parse_from([
            "registry-analytics",
            "--data-dir",
            "/drops",
            "--biometric-dir",
            "/elsewhere/bio",
        ]);
        assert_eq!(
            settings.category_dir(Category::Enrolment),
            PathBuf::from("/drops/api_data_aadhar_enrolment")
        );
        assert_eq!(
            settings.category_dir(Category::Biometric),
            PathBuf::from("/elsewhere/bio")
        );
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_data_dir() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            data_dir: Some(PathBuf::from("/persisted")),
            log_level: Some("ERROR".to_string()),
            load_timeout_secs: None,
        }
        .save_to(&config_path)
        .expect("save");

        let settings =
            Settings::load_with_last_used_impl(vec!["registry-analytics".into()], &config_path);
        assert_eq!(settings.data_dir, Some(PathBuf::from("/persisted")));
        assert_eq!(settings.log_level, "ERROR");
        assert_eq!(settings.load_timeout_secs, 300);
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            log_level: Some("ERROR".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec!["registry-analytics".into(), "--log-level".into(), "WARNING".into()],
            &config_path,
        );
        assert_eq!(settings.log_level, "WARNING");
        assert_eq!(
            LastUsedParams::load_from(&config_path).log_level,
            Some("WARNING".to_string())
        );
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&config_path).expect("save");

        Settings::load_with_last_used_impl(
            vec!["registry-analytics".into(), "--clear".into()],
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        let settings = Settings::load_with_last_used_impl(
            vec!["registry-analytics".into(), "--debug".into()],
            &config_path,
        );
        assert_eq!(settings.log_level, "DEBUG");
    }
}
