//! Action payloads carried by rules.

use crate::field::FieldPath;
use crate::normalizer::grok::GrokPattern;
use crate::normalizer::regex_mapping::translate_substitution;
use crate::normalizer::timestamp::TimestampFormat;
use chrono_tz::Tz;
use indexmap::IndexMap;

/// Normalization performed by one rule.
///
/// Entries of each map run in declaration order: grok extraction first, then
/// timestamps, then plain substitutions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeAction {
    /// Patterns tried in order against the source field; the first match wins.
    pub grok: IndexMap<FieldPath, Vec<GrokPattern>>,
    pub timestamps: IndexMap<FieldPath, TimestampSpec>,
    /// Source field copied to a target field.
    pub substitutions: IndexMap<FieldPath, TargetSpec>,
}

impl NormalizeAction {
    pub fn is_empty(&self) -> bool {
        self.grok.is_empty() && self.timestamps.is_empty() && self.substitutions.is_empty()
    }

    /// Every field the action may write.
    pub fn target_fields(&self) -> Vec<&FieldPath> {
        let grok_targets = self
            .grok
            .values()
            .flatten()
            .flat_map(|pattern| pattern.targets());
        let timestamp_targets = self.timestamps.values().map(|spec| &spec.destination);
        let substitution_targets = self.substitutions.values().map(|target| &target.path);

        grok_targets
            .chain(timestamp_targets)
            .chain(substitution_targets)
            .collect()
    }
}

/// Write target, optionally rewriting the value through the regex mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub path: FieldPath,
    pub transform: Option<RegexTransform>,
}

impl TargetSpec {
    pub fn plain(path: FieldPath) -> Self {
        Self {
            path,
            transform: None,
        }
    }

    pub fn with_transform(
        path: FieldPath,
        regex_id: impl Into<String>,
        substitution: impl Into<String>,
    ) -> Self {
        Self {
            path,
            transform: Some(RegexTransform::new(regex_id, substitution)),
        }
    }
}

/// Substitution applied with the regex registered under `regex_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexTransform {
    pub regex_id: String,
    /// Substitution as written in the rule, `\1` and `\g<name>` references allowed.
    pub substitution: String,
    replacement: String,
}

impl RegexTransform {
    pub fn new(regex_id: impl Into<String>, substitution: impl Into<String>) -> Self {
        let substitution = substitution.into();
        let replacement = translate_substitution(&substitution);
        Self {
            regex_id: regex_id.into(),
            substitution,
            replacement,
        }
    }

    /// Substitution in the syntax of [`regex::Regex::replace_all`].
    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// How a source timestamp is parsed, converted and written.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampSpec {
    pub destination: FieldPath,
    pub source_formats: Vec<TimestampFormat>,
    pub source_timezone: Tz,
    pub destination_timezone: Tz,
    /// Replace the destination without a conflict check.
    pub allow_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheckerAction {
    pub key_list: Vec<FieldPath>,
    pub output_field: FieldPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteAction {
    pub delete: bool,
}
