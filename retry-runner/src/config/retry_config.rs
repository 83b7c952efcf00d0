// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::MaxFailures;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    filter::FixtureFailureFilter,
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Retry configuration, read from the default config and an optional config file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryConfig {
    max_retries: u32,
    max_failures: MaxFailures,
    fail_on_passed_after_retry: bool,
    exempt_fixture_methods: Vec<String>,
}

impl RetryConfig {
    /// The default location of the config within a root directory, used when no config file is
    /// passed in explicitly.
    pub const CONFIG_PATH: &'static str = ".config/test-retry.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/test-retry.toml`
    /// under `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/test-retry.toml`, uses the
    /// default config options. Unknown keys are reported as warnings.
    pub fn from_sources(
        root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(root.as_ref(), config_file, |config_file, unknown| {
            let mut unknown_str = String::new();
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
            warn!("ignoring unknown configuration keys in config file {config_file}:{unknown_str}")
        })
    }

    pub(crate) fn from_sources_impl(
        root: &Utf8Path,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(config.into_config())
    }

    /// Returns the default config, with no repository-specific settings applied.
    pub fn default_config() -> Self {
        let (config, _unknown) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        config.into_config()
    }

    /// Returns the number of retries after the initial round. 0 disables retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the per-round failure cutoff.
    pub fn max_failures(&self) -> MaxFailures {
        self.max_failures
    }

    /// Returns true if tests that passed only after being retried should still fail the run.
    pub fn fail_on_passed_after_retry(&self) -> bool {
        self.fail_on_passed_after_retry
    }

    /// Returns the fixture methods whose failures are exempt from the retry guarantee.
    pub fn exempt_fixture_methods(&self) -> &[String] {
        &self.exempt_fixture_methods
    }

    /// Returns the retryability filter described by this config.
    pub fn retryability_filter(&self) -> FixtureFailureFilter {
        FixtureFailureFilter::new(self.exempt_fixture_methods.iter().cloned())
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(RetryConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut unknown_keys = BTreeSet::new();
        let mut record_unknown = |path: serde_ignored::Path| {
            unknown_keys.insert(path.to_string());
        };
        let deserializer = serde_ignored::Deserializer::new(config, &mut record_unknown);
        let config = serde_path_to_error::deserialize(deserializer).map_err(|error| {
            let path = error.path().clone();
            let error = without_location(error.into_inner());
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;

        Ok((config, unknown_keys))
    }
}

// The key path is reported by serde_path_to_error, so the location the config crate wraps around
// the error would only repeat it.
fn without_location(error: ConfigError) -> ConfigError {
    match error {
        ConfigError::At { error, .. } => *error,
        other => other,
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RetryConfigDeserialize {
    retry: RetrySectionDeserialize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RetrySectionDeserialize {
    max_retries: u32,
    max_failures: MaxFailures,
    fail_on_passed_after_retry: bool,
    #[serde(default)]
    exempt_fixture_methods: Vec<String>,
}

impl RetryConfigDeserialize {
    fn into_config(self) -> RetryConfig {
        let RetrySectionDeserialize {
            max_retries,
            max_failures,
            fail_on_passed_after_retry,
            exempt_fixture_methods,
        } = self.retry;
        RetryConfig {
            max_retries,
            max_failures,
            fail_on_passed_after_retry,
            exempt_fixture_methods,
        }
    }
}
