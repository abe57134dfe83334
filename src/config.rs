//! Session configuration and logging setup.
//!
//! Configuration is a YAML file; every key is optional:
//!
//! ```yaml
//! dataset_root: storage/datasets/default
//! confidence: 0.25
//! manual_split: train
//! auto_split: val
//! stream_interval_ms: 33
//! snapshot_dir: snapshots
//! record_stream: false
//! extract_every: 5
//! history_limit: 100
//! log_file: framelabel.log
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::dataset::Split;
use crate::error::FramelabelError;
use crate::pipeline::PipelineOptions;
use crate::store::DEFAULT_HISTORY_LIMIT;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FRAMELABEL_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dataset_root: PathBuf,
    /// Minimum detector confidence.
    pub confidence: f32,
    /// Split for frames saved by hand.
    pub manual_split: Split,
    /// Split for frames saved by batch auto-annotation.
    pub auto_split: Split,
    pub stream_interval_ms: u64,
    /// Root for per-class stream snapshots; none disables them.
    pub snapshot_dir: Option<PathBuf>,
    pub record_stream: bool,
    /// Keep every n-th frame when extracting.
    pub extract_every: u64,
    pub history_limit: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("storage/datasets/default"),
            confidence: 0.25,
            manual_split: Split::Train,
            auto_split: Split::Val,
            stream_interval_ms: 33,
            snapshot_dir: None,
            record_stream: false,
            extract_every: 5,
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_file: None,
        }
    }
}

impl Config {
    /// Reads a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, FramelabelError> {
        let data = fs::read_to_string(path).map_err(|source| FramelabelError::persistence(path, source))?;
        Self::from_yaml(&data, path)
    }

    fn from_yaml(data: &str, path: &Path) -> Result<Self, FramelabelError> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|source| FramelabelError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, FramelabelError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            confidence: self.confidence,
            auto_detect: false,
            snapshot_dir: self.snapshot_dir.clone(),
            record_stream: self.record_stream,
            stream_split: self.auto_split,
            history_limit: self.history_limit,
        }
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `verbosity` (0 = warn, 1 = info, 2 = debug,
/// 3+ = trace). Logs go to stderr, and are also appended to `log_file` when
/// one is set.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<(), FramelabelError> {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("framelabel={default_level}")))
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|source| FramelabelError::persistence(parent, source))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| FramelabelError::persistence(path, source))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    // A subscriber may already be installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .with(file_layer)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_yaml("", Path::new("c.yaml")).expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.stream_interval(), Duration::from_millis(33));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = Config::from_yaml(
            "confidence: 0.5\nauto_split: train\nsnapshot_dir: snaps\n",
            Path::new("c.yaml"),
        )
        .expect("parse");
        assert_eq!(config.confidence, 0.5);
        assert_eq!(config.auto_split, Split::Train);
        assert_eq!(config.snapshot_dir, Some(PathBuf::from("snaps")));
        assert_eq!(config.extract_every, 5);
        assert_eq!(config.manual_split, Split::Train);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_yaml("confidance: 0.5\n", Path::new("c.yaml")).unwrap_err();
        assert!(matches!(err, FramelabelError::ConfigParse { .. }));
    }

    #[test]
    fn pipeline_options_follow_config() {
        let config = Config {
            record_stream: true,
            history_limit: 7,
            ..Config::default()
        };
        let options = config.pipeline_options();
        assert!(options.record_stream);
        assert_eq!(options.history_limit, 7);
        assert_eq!(options.stream_split, Split::Val);
    }
}
