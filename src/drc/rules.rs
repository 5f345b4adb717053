//! Rule model and constraint resolution
//!
//! Rules arrive already parsed (JSON list). Compiling them parses each
//! condition once and orders the set by specificity so that resolution
//! is a plain "last match wins" scan.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::board::{DisallowFlags, Layer};
use super::condition::{Condition, ConditionContext, Property};
use super::error::{DrcError, Result};
use super::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Disallow,
    TextHeight,
    TextThickness,
}

/// Rule payload: a disallow mask or a min/max range in mm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Disallow(DisallowFlags),
    MinMax {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub layer: Option<Layer>,
    pub constraint: ConstraintType,
    #[serde(default)]
    pub severity: Severity,
    pub value: RuleValue,
}

impl Rule {
    pub fn disallow(name: &str, flags: DisallowFlags) -> Self {
        Self {
            name: name.to_string(),
            condition: None,
            layer: None,
            constraint: ConstraintType::Disallow,
            severity: Severity::Error,
            value: RuleValue::Disallow(flags),
        }
    }

    pub fn min_max(name: &str, constraint: ConstraintType, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            condition: None,
            layer: None,
            constraint,
            severity: Severity::Error,
            value: RuleValue::MinMax { min, max },
        }
    }

    pub fn when(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn on_layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Load an ordered rule list from a JSON file
    pub fn load_all<P: AsRef<Path>>(path: P) -> Result<Vec<Rule>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DrcError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Resolved constraint for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub constraint_type: ConstraintType,
    pub value: Option<RuleValue>,
    pub severity: Severity,
    /// Name of the rule that produced this constraint
    pub source: Option<String>,
}

impl Constraint {
    /// Permissive default when no rule matches
    pub fn ignore(constraint_type: ConstraintType) -> Self {
        Self { constraint_type, value: None, severity: Severity::Ignore, source: None }
    }

    pub fn is_ignore(&self) -> bool {
        self.severity == Severity::Ignore || self.value.is_none()
    }

    pub fn disallow_flags(&self) -> DisallowFlags {
        match self.value {
            Some(RuleValue::Disallow(flags)) => flags,
            _ => DisallowFlags::default(),
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self.value {
            Some(RuleValue::MinMax { min, .. }) => min,
            _ => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self.value {
            Some(RuleValue::MinMax { max, .. }) => max,
            _ => None,
        }
    }
}

#[derive(Debug)]
enum CompiledCondition {
    Always,
    Parsed(Condition),
    Invalid,
}

/// A rule with its parsed condition and specificity tier
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: Rule,
    pub tier: u8,
    condition: CompiledCondition,
    warned: AtomicBool,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Self {
        let condition = match rule.condition.as_deref().map(str::trim) {
            None | Some("") => CompiledCondition::Always,
            Some(src) => match Condition::parse(src) {
                Ok(cond) => CompiledCondition::Parsed(cond),
                Err(err) => {
                    let err = DrcError::InvalidCondition {
                        rule: rule.name.clone(),
                        offset: err.offset,
                        reason: err.reason,
                    };
                    tracing::warn!("[DRC] {}; rule disabled", err);
                    CompiledCondition::Invalid
                }
            },
        };
        let tier = specificity(&rule, &condition);
        let warned = AtomicBool::new(matches!(condition, CompiledCondition::Invalid));
        Self { rule, tier, condition, warned }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.condition, CompiledCondition::Invalid)
    }

    /// Layer filter then condition; evaluation errors fail closed and are
    /// logged once per rule
    pub fn matches(&self, layer: Option<Layer>, ctx: &dyn ConditionContext) -> bool {
        if let Some(rule_layer) = self.rule.layer {
            if layer != Some(rule_layer) {
                return false;
            }
        }
        match &self.condition {
            CompiledCondition::Always => true,
            CompiledCondition::Invalid => false,
            CompiledCondition::Parsed(cond) => match cond.evaluate(ctx) {
                Ok(hit) => hit,
                Err(reason) => {
                    if !self.warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            "[DRC] rule '{}': cannot evaluate '{}': {}",
                            self.rule.name,
                            cond.source(),
                            reason
                        );
                    }
                    false
                }
            },
        }
    }

    fn resolve(&self) -> Constraint {
        Constraint {
            constraint_type: self.rule.constraint,
            value: Some(self.rule.value.clone()),
            severity: self.rule.severity,
            source: Some(self.rule.name.clone()),
        }
    }
}

/// 3: reference or area function, 2: net or net class, 1: layer, 0: none
fn specificity(rule: &Rule, condition: &CompiledCondition) -> u8 {
    let layer_field = rule.layer.is_some();
    let CompiledCondition::Parsed(cond) = condition else {
        return u8::from(layer_field);
    };
    if cond.references(Property::Reference) || cond.uses_area_functions() {
        3
    } else if cond.references(Property::NetName) || cond.references(Property::NetClass) {
        2
    } else if layer_field || cond.references(Property::Layer) {
        1
    } else {
        0
    }
}

/// Compiled, precedence-ordered rule list
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: Vec<Rule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules.into_iter().map(CompiledRule::compile).collect();
        // Stable: declaration order breaks ties within a tier
        compiled.sort_by_key(|r| r.tier);
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    pub fn of_type(&self, constraint_type: ConstraintType) -> impl DoubleEndedIterator<Item = &CompiledRule> {
        self.rules.iter().filter(move |r| r.rule.constraint == constraint_type)
    }

    pub fn has_rules_for(&self, constraint_type: ConstraintType) -> bool {
        self.of_type(constraint_type).next().is_some()
    }

    /// Last matching rule in precedence order, else an ignore constraint
    pub fn resolve(&self, constraint_type: ConstraintType, layer: Option<Layer>, ctx: &dyn ConditionContext) -> Constraint {
        self.of_type(constraint_type)
            .rev()
            .find(|r| r.matches(layer, ctx))
            .map(CompiledRule::resolve)
            .unwrap_or_else(|| Constraint::ignore(constraint_type))
    }
}
