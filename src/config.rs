use crate::collection::strategy::{
    ChangeDetectionStrategy, RootCollectionChangeDetectionStrategy,
    SubCollectionChangeDetectionStrategy,
};
use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a collection end-point decides whether its data differs from the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetectionMode {
    /// Membership only; reordering is not a change
    #[default]
    SetBased,
    /// Membership and order
    OrderSensitive,
}

impl ChangeDetectionMode {
    pub fn strategy(&self) -> Arc<dyn ChangeDetectionStrategy> {
        match self {
            ChangeDetectionMode::SetBased => Arc::new(RootCollectionChangeDetectionStrategy),
            ChangeDetectionMode::OrderSensitive => Arc::new(SubCollectionChangeDetectionStrategy),
        }
    }
}

/// Relation end-point manager configuration
///
/// # Examples
///
/// ```
/// use relmemodb::{ChangeDetectionMode, RelationConfig};
///
/// let config = RelationConfig::new()
///     .change_detection(ChangeDetectionMode::OrderSensitive)
///     .validate_mandatory_on_commit(false);
/// assert!(!config.validate_mandatory_on_commit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Strategy used by `has_changed` on collection end-points
    pub change_detection: ChangeDetectionMode,

    /// Check mandatory relations before committing
    pub validate_mandatory_on_commit: bool,

    /// Apply the relation's sort comparer when collection data is loaded
    pub sort_on_load: bool,
}

impl RelationConfig {
    pub fn new() -> Self {
        Self {
            change_detection: ChangeDetectionMode::SetBased,
            validate_mandatory_on_commit: true,
            sort_on_load: true,
        }
    }

    /// Set change detection mode
    pub fn change_detection(mut self, mode: ChangeDetectionMode) -> Self {
        self.change_detection = mode;
        self
    }

    /// Enable or disable mandatory validation on commit
    pub fn validate_mandatory_on_commit(mut self, enabled: bool) -> Self {
        self.validate_mandatory_on_commit = enabled;
        self
    }

    /// Enable or disable sorting of freshly loaded collections
    pub fn sort_on_load(mut self, enabled: bool) -> Self {
        self.sort_on_load = enabled;
        self
    }

    /// Parse from JSON; missing fields fall back to defaults
    ///
    /// ```
    /// use relmemodb::{ChangeDetectionMode, RelationConfig};
    ///
    /// let config = RelationConfig::from_json(r#"{ "change_detection": "order_sensitive" }"#).unwrap();
    /// assert_eq!(config.change_detection, ChangeDetectionMode::OrderSensitive);
    /// assert!(config.sort_on_load);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self::new()
    }
}
