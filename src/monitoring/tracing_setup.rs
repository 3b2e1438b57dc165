use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration for chainfleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    pub log_level: String,
    pub json: bool,
    /// Daily-rolling log file, in addition to the console.
    pub log_file: Option<PathBuf>,
}

impl TracingConfig {
    pub fn verbose(verbose: bool) -> Self {
        Self {
            log_level: if verbose { "debug" } else { "info" }.to_string(),
            ..Self::default()
        }
    }

    /// Installs the global subscriber. `RUST_LOG` takes precedence over
    /// `log_level`. Keep the returned guard alive for as long as file
    /// logging should be flushed.
    pub fn init(&self) -> Result<Option<WorkerGuard>> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // Console output goes to stderr so tables on stdout stay clean.
        let console_layer = if self.json {
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_writer(io::stderr)
                .boxed()
        } else {
            fmt::layer()
                .with_target(false)
                .compact()
                .with_writer(io::stderr)
                .boxed()
        };

        let (file_layer, guard) = match &self.log_file {
            Some(path) => {
                let directory = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                std::fs::create_dir_all(&directory)
                    .with_context(|| format!("creating log directory {}", directory.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "chainfleet.log".to_string());

                let appender = tracing_appender::rolling::daily(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false).json().boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("installing tracing subscriber")?;

        Ok(guard)
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_level() {
        assert_eq!(TracingConfig::verbose(true).log_level, "debug");
        assert_eq!(TracingConfig::verbose(false).log_level, "info");
        assert!(TracingConfig::default().log_file.is_none());
    }
}
