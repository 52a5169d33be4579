//! Profiling configuration choices for one target

use cpuscope_common::{ProfilingConfiguration, ProfilingMode};
use log::warn;

/// Feature level that introduced native sampling
const NATIVE_SAMPLING_FEATURE_LEVEL: u32 = 26;
/// Feature level that introduced system tracing
const SYSTEM_TRACE_FEATURE_LEVEL: u32 = 28;

/// Built-in configurations, in display order
#[must_use]
pub fn default_configurations() -> Vec<ProfilingConfiguration> {
    vec![
        ProfilingConfiguration::new("Sampled (Java)", ProfilingMode::Sampled),
        ProfilingConfiguration::new("Instrumented (Java)", ProfilingMode::Instrumented),
        ProfilingConfiguration::new("Sampled (Native)", ProfilingMode::Sampled)
            .with_min_feature_level(NATIVE_SAMPLING_FEATURE_LEVEL),
        ProfilingConfiguration::new("System Trace", ProfilingMode::Instrumented)
            .with_min_feature_level(SYSTEM_TRACE_FEATURE_LEVEL),
    ]
}

/// Available, selected and active profiling configurations
///
/// The selected configuration is what the next start uses; the active one is
/// what the current (or last) recording was started with.
#[derive(Debug, Clone)]
pub struct ConfigModel {
    feature_level: u32,
    custom: Vec<ProfilingConfiguration>,
    selected: ProfilingConfiguration,
    active: Option<ProfilingConfiguration>,
}

impl ConfigModel {
    /// Preselects `preferred` by name when it is available on this target,
    /// otherwise the first available configuration.
    pub fn new(
        feature_level: u32,
        custom: Vec<ProfilingConfiguration>,
        preferred: Option<&str>,
    ) -> Self {
        let mut model = Self {
            feature_level,
            custom,
            selected: ProfilingConfiguration::default(),
            active: None,
        };

        let available = model.available();
        let preselected = preferred.and_then(|name| {
            let found = available.iter().find(|c| c.name == name).cloned();
            if found.is_none() {
                warn!("Profiling configuration '{name}' is not available at feature level {feature_level}");
            }
            found
        });
        if let Some(config) = preselected.or_else(|| available.into_iter().next()) {
            model.selected = config;
        }
        model
    }

    /// Custom entries, then defaults, both limited to what the target supports
    #[must_use]
    pub fn available(&self) -> Vec<ProfilingConfiguration> {
        self.custom
            .iter()
            .cloned()
            .chain(default_configurations())
            .filter(|c| c.is_supported_on(self.feature_level))
            .collect()
    }

    #[must_use]
    pub fn selected(&self) -> &ProfilingConfiguration {
        &self.selected
    }

    /// Returns whether the selection changed
    pub fn set_selected(&mut self, config: ProfilingConfiguration) -> bool {
        let changed = self.selected != config;
        self.selected = config;
        changed
    }

    #[must_use]
    pub fn active(&self) -> Option<&ProfilingConfiguration> {
        self.active.as_ref()
    }

    pub fn set_active(&mut self, config: ProfilingConfiguration) {
        self.active = Some(config);
    }
}
