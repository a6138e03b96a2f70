use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// One reconciliation template: how to key, filter, clean, pivot and diff
/// the two datasets.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key_mappings: Vec<KeyMapping>,
    #[serde(default)]
    pub value_mapping: ValueMapping,
    #[serde(default)]
    pub manual_filters: Vec<FilterPredicate>,
    #[serde(default)]
    pub system_filters: Vec<FilterPredicate>,
    /// Regex cleaning rules, applied to the manual side only.
    #[serde(default)]
    pub clean_rules: Vec<CleanRule>,
    /// Categorical pivot on the system side.
    #[serde(default, alias = "pivot_column")]
    pub pivot: Option<PivotConfig>,
    /// Outbound/inbound flow pivot on the manual side.
    #[serde(default)]
    pub manual_pivot: Option<FlowPivotConfig>,
    /// Custom difference formula; empty means `manual_quantity - system_total`.
    #[serde(default)]
    pub difference_formula: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyMapping {
    pub manual: String,
    pub system: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueMapping {
    #[serde(default)]
    pub manual: String,
    #[serde(default)]
    pub system: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PivotConfig {
    pub system_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowPivotConfig {
    pub pivot_column: String,
    /// Older templates store these as `out_values` / `in_values`.
    #[serde(default, alias = "out_values")]
    pub outbound_values: Vec<String>,
    #[serde(default, alias = "in_values")]
    pub inbound_values: Vec<String>,
}

impl FlowPivotConfig {
    /// A flow pivot with no categories on either side nets nothing and is
    /// treated as absent.
    pub fn has_values(&self) -> bool {
        !self.outbound_values.is_empty() || !self.inbound_values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    #[serde(deserialize_with = "de_filter_op")]
    pub operator: FilterOp,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    InList,
    NotInList,
    Greater,
    Less,
}

impl FilterOp {
    /// Resolve an operator from its snake_case code, the legacy uppercase
    /// code stored by older templates, or the UI display label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "equals" | "EQUALS" | "=" | "等于" => Some(Self::Equals),
            "not_equals" | "NOT_EQUALS" | "!=" | "不等于" => Some(Self::NotEquals),
            "contains" | "CONTAINS" | "包含" => Some(Self::Contains),
            "not_contains" | "NOT_CONTAINS" | "不包含" => Some(Self::NotContains),
            "in_list" | "IN_LIST" | "包含于" => Some(Self::InList),
            "not_in_list" | "NOT_IN_LIST" | "不包含于" => Some(Self::NotInList),
            "greater" | "GREATER" | ">" | "大于" => Some(Self::Greater),
            "less" | "LESS" | "<" | "小于" => Some(Self::Less),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::InList => "in_list",
            Self::NotInList => "not_in_list",
            Self::Greater => "greater",
            Self::Less => "less",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn de_filter_op<'de, D>(deserializer: D) -> Result<FilterOp, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    FilterOp::from_label(&label)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown filter operator: \"{label}\"")))
}

// ---------------------------------------------------------------------------
// Cleaning rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CleanRule {
    pub column: String,
    #[serde(deserialize_with = "de_clean_mode")]
    pub mode: CleanMode,
    /// Regex pattern. Older templates store this under `regex`.
    #[serde(alias = "regex", default)]
    pub pattern: String,
    /// Replacement text for `replace` mode. Older templates use `replace`.
    #[serde(alias = "replace", default)]
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    /// Remove every match, then trim the remainder.
    DeleteMatch,
    /// Keep only the first match (empty string when nothing matches).
    KeepMatch,
    /// Substitute every match with the replacement text.
    Replace,
}

impl CleanMode {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "delete_match" | "DELETE_MATCH" | "删除匹配" => Some(Self::DeleteMatch),
            "keep_match" | "KEEP_MATCH" | "保留匹配" => Some(Self::KeepMatch),
            "replace" | "REPLACE" | "替换为" => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeleteMatch => "delete_match",
            Self::KeepMatch => "keep_match",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for CleanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn de_clean_mode<'de, D>(deserializer: D) -> Result<CleanMode, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    CleanMode::from_label(&label)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown clean mode: \"{label}\"")))
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject only structurally unusable configs; everything else degrades
    /// inside the engine.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.key_mappings.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one key mapping is required".into(),
            ));
        }
        for mapping in &self.key_mappings {
            if mapping.manual.trim().is_empty() || mapping.system.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "key mappings must name a column on both sides".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mapping suggestions
// ---------------------------------------------------------------------------

/// Default column aliases, used to propose mappings from raw headers.
const KEY_ALIASES: &[&[&str]] = &[
    &["订单号", "到货单号", "ASN", "单号", "order", "asn_no"],
    &["料号", "零件号", "物料号", "SKU", "part_no", "material"],
];
const MANUAL_QTY_ALIASES: &[&str] = &["数量", "到货数量", "qty", "quantity"];
const SYSTEM_QTY_ALIASES: &[&str] = &["系统数量", "完成数量", "actual_qty", "数量", "qty"];

fn find_alias(headers: &[String], aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        if let Some(hit) = headers.iter().find(|h| h.eq_ignore_ascii_case(alias)) {
            return Some(hit.clone());
        }
    }
    None
}

/// Propose key mappings by matching both header lists against the default
/// alias table. Best effort: roles with no hit on either side are omitted.
pub fn suggest_key_mappings(
    manual_headers: &[String],
    system_headers: &[String],
) -> Vec<KeyMapping> {
    KEY_ALIASES
        .iter()
        .filter_map(|aliases| {
            let manual = find_alias(manual_headers, aliases)?;
            let system = find_alias(system_headers, aliases)?;
            Some(KeyMapping { manual, system })
        })
        .collect()
}

/// Propose a value mapping from the default quantity aliases.
pub fn suggest_value_mapping(
    manual_headers: &[String],
    system_headers: &[String],
) -> Option<ValueMapping> {
    let manual = find_alias(manual_headers, MANUAL_QTY_ALIASES)?;
    let system = find_alias(system_headers, SYSTEM_QTY_ALIASES)?;
    Some(ValueMapping { manual, system })
}
