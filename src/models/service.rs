//! Service-level data models.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StorageError, StorageResult};

/// Upper bound for metrics retention.
pub const MAX_RETENTION_DAYS: u32 = 365;

/// Storage sub-service a request or resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    File,
    Blob,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::File => "file",
            ServiceKind::Blob => "blob",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "file" => Some(ServiceKind::File),
            "blob" => Some(ServiceKind::Blob),
            _ => None,
        }
    }
}

/// Aggregation window of a metrics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsGranularity {
    Hour,
    Minute,
}

/// How much the service records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MetricsLevel {
    #[default]
    None,
    Service,
    ServiceAndApi,
}

impl MetricsLevel {
    pub fn enabled(&self) -> bool {
        !matches!(self, MetricsLevel::None)
    }

    pub fn include_apis(&self) -> bool {
        matches!(self, MetricsLevel::ServiceAndApi)
    }

    /// Rebuilds the level from the `Enabled` / `IncludeAPIs` pair.
    pub fn from_flags(enabled: bool, include_apis: bool) -> Self {
        match (enabled, include_apis) {
            (false, _) => MetricsLevel::None,
            (true, false) => MetricsLevel::Service,
            (true, true) => MetricsLevel::ServiceAndApi,
        }
    }

    pub fn parse(s: &str) -> StorageResult<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(MetricsLevel::None),
            "service" => Ok(MetricsLevel::Service),
            "service-and-api" | "serviceandapi" => Ok(MetricsLevel::ServiceAndApi),
            other => Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                format!("unknown metrics level '{}'", other),
            )),
        }
    }
}

/// Metrics configuration for one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub version: String,
    pub level: MetricsLevel,
    /// Days to keep metrics; `None` keeps them indefinitely.
    pub retention_days: Option<u32>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            level: MetricsLevel::None,
            retention_days: None,
        }
    }
}

impl MetricsConfig {
    pub fn new(level: MetricsLevel, retention_days: Option<u32>) -> Self {
        Self {
            level,
            retention_days,
            ..Self::default()
        }
    }

    /// Range-checks `retention_days` (0..=365).
    pub fn validate(&self) -> StorageResult<()> {
        match self.retention_days {
            Some(days) if days > MAX_RETENTION_DAYS => Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                format!(
                    "metrics retention of {} days is outside 0..={}",
                    days, MAX_RETENTION_DAYS
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// CORS rule for a storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_in_seconds: u32,
}

/// Service properties of the file service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileServiceProperties {
    pub hour_metrics: MetricsConfig,
    pub minute_metrics: MetricsConfig,
    pub cors: Vec<CorsRule>,
}

impl FileServiceProperties {
    pub fn metrics(&self, granularity: MetricsGranularity) -> &MetricsConfig {
        match granularity {
            MetricsGranularity::Hour => &self.hour_metrics,
            MetricsGranularity::Minute => &self.minute_metrics,
        }
    }

    pub fn set_metrics(&mut self, granularity: MetricsGranularity, config: MetricsConfig) {
        match granularity {
            MetricsGranularity::Hour => self.hour_metrics = config,
            MetricsGranularity::Minute => self.minute_metrics = config,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        self.hour_metrics.validate()?;
        self.minute_metrics.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_range() {
        assert!(MetricsConfig::new(MetricsLevel::Service, Some(14)).validate().is_ok());
        assert!(MetricsConfig::new(MetricsLevel::Service, Some(0)).validate().is_ok());
        assert!(MetricsConfig::new(MetricsLevel::Service, Some(365)).validate().is_ok());
        let err = MetricsConfig::new(MetricsLevel::Service, Some(400))
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_level_flags() {
        for level in [MetricsLevel::None, MetricsLevel::Service, MetricsLevel::ServiceAndApi] {
            assert_eq!(MetricsLevel::from_flags(level.enabled(), level.include_apis()), level);
        }
        assert_eq!(MetricsLevel::parse("service-and-api").unwrap(), MetricsLevel::ServiceAndApi);
    }

    #[test]
    fn test_granularity_slots() {
        let mut props = FileServiceProperties::default();
        props.set_metrics(
            MetricsGranularity::Minute,
            MetricsConfig::new(MetricsLevel::Service, Some(7)),
        );
        assert_eq!(props.metrics(MetricsGranularity::Minute).retention_days, Some(7));
        assert_eq!(props.metrics(MetricsGranularity::Hour).level, MetricsLevel::None);
    }
}
