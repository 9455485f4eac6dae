// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Parameters of a forwarding rules manager instance

use crate::container::DEFAULT_CONTAINER;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Failed to parse parameters: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Failed to build parameters: {0}")]
    Build(#[from] FrmParamsBuilderError),
    #[error("Invalid parameters: {0}")]
    Invalid(String),
}

/// Manager parameters. A builder type `FrmParamsBuilder` is derived with defaults for
/// each field. Parameters can also be read from YAML, where omitted fields take the
/// same defaults.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrmParams {
    /// The container the manager programs for
    #[builder(setter(into), default = DEFAULT_CONTAINER.to_string())]
    pub container_name: String,

    /// Start with non-default containers present
    #[builder(default = false)]
    pub start_in_container_mode: bool,

    /// Priority of the default punt flows installed in proactive mode
    #[builder(default = 1)]
    pub punt_priority: u16,

    /// Priority of the default drop flow installed in proactive mode
    #[builder(default = 0)]
    pub drop_priority: u16,

    /// Tracing configuration, as accepted by `TracingControl::setup_from_string`
    #[builder(setter(into, strip_option), default)]
    pub tracing: Option<String>,
}

impl Default for FrmParams {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_CONTAINER.to_string(),
            start_in_container_mode: false,
            punt_priority: 1,
            drop_priority: 0,
            tracing: None,
        }
    }
}

impl FrmParams {
    /// Parse parameters from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ParamsError> {
        let params: FrmParams = serde_yaml_ng::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.container_name.is_empty() {
            return Err(ParamsError::Invalid("empty container name".to_string()));
        }
        if self.punt_priority <= self.drop_priority {
            return Err(ParamsError::Invalid(format!(
                "punt priority {} must be above drop priority {}",
                self.punt_priority, self.drop_priority
            )));
        }
        Ok(())
    }
}

impl Display for FrmParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forwarding rules manager config")?;
        writeln!(f, "  container      : {}", self.container_name)?;
        writeln!(f, "  container mode : {}", self.start_in_container_mode)?;
        writeln!(f, "  punt priority  : {}", self.punt_priority)?;
        writeln!(f, "  drop priority  : {}", self.drop_priority)?;
        writeln!(
            f,
            "  tracing        : {}",
            self.tracing.as_deref().unwrap_or("--")
        )
    }
}
