use std::env;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::DeletePolicy;

pub const DELETE_POLICY_VAR: &str = "TAXONOMY_DELETE_POLICY";
pub const MAX_NAME_LEN_VAR: &str = "TAXONOMY_MAX_NAME_LEN";
pub const MAX_SLUG_LEN_VAR: &str = "TAXONOMY_MAX_SLUG_LEN";

/// Column widths of `taxonomy.categories.name` and `.slug`.
pub const DEFAULT_MAX_NAME_LEN: usize = 100;
pub const DEFAULT_MAX_SLUG_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Applied to deletes that do not name a policy themselves.
    pub delete_policy: DeletePolicy,
    pub max_name_len: usize,
    pub max_slug_len: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            delete_policy: DeletePolicy::PromoteChildren,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_slug_len: DEFAULT_MAX_SLUG_LEN,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(DELETE_POLICY_VAR) {
            config.delete_policy = DeletePolicy::from_config_value(&raw).ok_or_else(|| {
                LibError::invalid_with_code(
                    "invalid_config",
                    "TAXONOMY_DELETE_POLICY must be 'promote' or 'cascade'",
                    anyhow!("unrecognised delete policy '{}'", raw),
                )
            })?;
        }
        if let Some(raw) = lookup(MAX_NAME_LEN_VAR) {
            config.max_name_len = parse_limit(
                &raw,
                DEFAULT_MAX_NAME_LEN,
                "TAXONOMY_MAX_NAME_LEN must be between 1 and 100",
            )?;
        }
        if let Some(raw) = lookup(MAX_SLUG_LEN_VAR) {
            config.max_slug_len = parse_limit(
                &raw,
                DEFAULT_MAX_SLUG_LEN,
                "TAXONOMY_MAX_SLUG_LEN must be between 1 and 100",
            )?;
        }

        Ok(config)
    }
}

/// Limits can only tighten the column width, never exceed it.
fn parse_limit(raw: &str, column_width: usize, public: &'static str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(value) if (1..=column_width).contains(&value) => Ok(value),
        Ok(value) => Err(LibError::invalid_with_code(
            "invalid_config",
            public,
            anyhow!("limit {} outside 1..={}", value, column_width),
        )),
        Err(err) => Err(LibError::invalid_with_code(
            "invalid_config",
            public,
            anyhow!("could not parse '{}': {}", raw, err),
        )),
    }
}
