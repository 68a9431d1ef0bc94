//! Limits configuration.
//!
//! A limits file describes the resource hierarchy as nested resources, each
//! optionally carrying rates. Loading it produces the `Tree<RateConfig>` the
//! evaluator runs on, with every node's id set to its dotted path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AlgorithmConfig;
use crate::error::{RateTreeError, Result};
use crate::rate::{Operator, Rate, RateConfig, Rates};
use crate::tree::{NodeId, Tree};

/// A complete limits document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Name of the root node; the root itself is never limited
    #[serde(default = "default_root")]
    pub name: String,
    /// Top-level resources
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

fn default_root() -> String {
    "root".to_string()
}

/// Configuration for one resource node.
///
/// Resources form a tree: a node without rates only groups its children,
/// and a node with rates is limited in addition to anything below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Name of the resource, unique among its siblings
    pub name: String,
    /// How the rates combine
    #[serde(default)]
    pub operator: Operator,
    /// Rates to enforce at this level
    #[serde(default)]
    pub rates: Vec<RateRule>,
    /// Free-form condition carried through to the node's value
    #[serde(default)]
    pub condition: Option<String>,
    /// Child resources
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// A single rate: `permits` per `every` units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRule {
    /// Number of permits allowed per period
    pub permits: u64,
    /// The time unit
    pub unit: TimeUnit,
    /// Number of units in the period
    #[serde(default = "default_every")]
    pub every: u32,
    /// Algorithm override for this rate
    #[serde(default)]
    pub algorithm: Option<AlgorithmConfig>,
}

fn default_every() -> u32 {
    1
}

/// Time unit for rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl RateRule {
    pub fn to_rate(&self) -> Result<Rate> {
        let rate = Rate::new(self.permits, self.unit.duration() * self.every)?;
        match &self.algorithm {
            Some(algorithm) => rate.with_algorithm(algorithm.to_algorithm()),
            None => Ok(rate),
        }
    }
}

impl ResourceConfig {
    /// Node value for this resource: `None` when it declares no rates.
    fn to_rate_config(&self, id: &str) -> Result<Option<RateConfig>> {
        if self.rates.is_empty() {
            return Ok(None);
        }
        let limits = self
            .rates
            .iter()
            .map(RateRule::to_rate)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| RateTreeError::Config(format!("resource '{}': {}", id, e)))?;

        let config = RateConfig::new(id, Rates::new(self.operator, limits));
        Ok(Some(match &self.condition {
            Some(condition) => config.with_condition(condition.clone()),
            None => config,
        }))
    }
}

impl LimitsConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limits configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateTreeError::Config(format!("Failed to parse limits config: {}", e)))
    }

    /// Build the resource tree.
    ///
    /// Fails on invalid rates and on sibling resources sharing a name.
    pub fn build_tree(&self) -> Result<Tree<RateConfig>> {
        let mut tree = Tree::new(self.name.clone(), None);
        let root = tree.root();
        for resource in &self.resources {
            Self::add_resource(&mut tree, root, None, resource)?;
        }
        info!(nodes = tree.len(), "Built resource tree");
        Ok(tree)
    }

    fn add_resource(
        tree: &mut Tree<RateConfig>,
        parent: NodeId,
        parent_path: Option<&str>,
        resource: &ResourceConfig,
    ) -> Result<()> {
        let path = match parent_path {
            Some(prefix) => format!("{}.{}", prefix, resource.name),
            None => resource.name.clone(),
        };
        let value = resource.to_rate_config(&path)?;
        if let Some(config) = &value {
            debug!(resource = %path, rates = %config.rates, "Configured resource");
        }

        let node = tree.add_child(parent, resource.name.clone(), value)?;
        for child in &resource.resources {
            Self::add_resource(tree, node, Some(&path), child)?;
        }
        Ok(())
    }
}
