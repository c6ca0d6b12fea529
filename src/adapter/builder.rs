//! Adapter construction

use std::sync::Arc;

use super::Adapter;
use crate::api::{MetricsReporter, NetworkProbe, NodeDirectory, NoopReporter};
use crate::clock::{system_clock, Clock};
use crate::config::{AdapterConfig, ConfigError};
use crate::error::Result;

/// Builder wiring collaborators into an [`Adapter`]
///
/// A probe and a directory are required; the reporter defaults to
/// [`NoopReporter`] and the clock to the system clock.
pub struct AdapterBuilder {
    config: AdapterConfig,
    probe: Option<Arc<dyn NetworkProbe>>,
    directory: Option<Arc<dyn NodeDirectory>>,
    reporter: Option<Arc<dyn MetricsReporter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AdapterBuilder {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            probe: None,
            directory: None,
            reporter: None,
            clock: None,
        }
    }

    pub fn probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn NodeDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use one backend for all three collaborators
    pub fn with_backend<B>(self, backend: Arc<B>) -> Self
    where
        B: NetworkProbe + NodeDirectory + MetricsReporter + 'static,
    {
        let probe: Arc<dyn NetworkProbe> = backend.clone();
        let directory: Arc<dyn NodeDirectory> = backend.clone();
        let reporter: Arc<dyn MetricsReporter> = backend;
        self.probe(probe).directory(directory).reporter(reporter)
    }

    /// Validate the config and assemble a stopped adapter
    pub fn build(self) -> Result<Adapter> {
        self.config.validate()?;

        let probe = self.probe.ok_or(ConfigError::MissingField {
            field: "probe".to_string(),
        })?;
        let directory = self.directory.ok_or(ConfigError::MissingField {
            field: "directory".to_string(),
        })?;
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(NoopReporter));
        let clock = self.clock.unwrap_or_else(system_clock);

        Ok(Adapter::from_parts(self.config, probe, directory, reporter, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SimulatedBackend, SimulationProfile};
    use crate::error::Error;

    #[test]
    fn test_missing_collaborators() {
        let err = AdapterBuilder::new(AdapterConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::MissingField { ref field }) if field == "probe"));

        let backend = Arc::new(SimulatedBackend::new(SimulationProfile::urban_5g()));
        let err = AdapterBuilder::new(AdapterConfig::default())
            .probe(backend)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::MissingField { ref field }) if field == "directory"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AdapterConfig::default();
        config.target_latency_ms = 0.0;

        let backend = Arc::new(SimulatedBackend::new(SimulationProfile::urban_5g()));
        let result = AdapterBuilder::new(config).with_backend(backend).build();
        assert!(matches!(result, Err(Error::Config(ConfigError::InvalidValue { .. }))));
    }

    #[tokio::test]
    async fn test_build_with_backend() {
        let backend = Arc::new(SimulatedBackend::new(SimulationProfile::urban_5g()));
        let adapter = AdapterBuilder::new(AdapterConfig::default())
            .with_backend(backend)
            .build()
            .unwrap();
        assert!(!adapter.is_started());
    }
}
