//! Static pre-execution policy check over submitted code.
//!
//! The filter rejects source text that contains known host-escape primitives
//! before anything runs. It is keyword based and therefore bypassable; the
//! process isolation in [`crate::sandbox`] is what actually confines code.

use regex::Regex;

/// Reason surfaced to callers when a denylist rule matches.
pub const DANGEROUS_CODE_REASON: &str = "Potentially dangerous code detected";

/// Default ceiling on submitted code size.
pub const DEFAULT_MAX_CODE_BYTES: usize = 64 * 1024;

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Accepted,
    Rejected {
        /// Human-readable reason returned to the caller
        reason: String,
        /// Name of the rule that matched (for logs)
        rule: String,
    },
}

impl SafetyVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SafetyVerdict::Accepted)
    }
}

/// A single denylist rule.
#[derive(Debug, Clone)]
pub struct SafetyRule {
    name: String,
    pattern: Regex,
}

impl SafetyRule {
    /// Build a rule from a regex pattern.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }
}

// Rules for JavaScript-like runtimes: process control, module loading,
// nested evaluation, and direct filesystem/process APIs.
const JAVASCRIPT_RULES: &[(&str, &str)] = &[
    ("eval", r"\beval\s*\("),
    ("function_constructor", r"\bFunction\s*\("),
    ("constructor_chain", r"constructor\s*(\.|\[)\s*['\x22]?constructor"),
    ("string_timer", r#"\bset(Timeout|Interval|Immediate)\s*\(\s*['"`]"#),
    ("require", r"\brequire\s*\("),
    ("module_object", r"\bmodule\s*(\.|\[)"),
    ("dynamic_import", r"\bimport\s*\("),
    ("static_import", r"\bimport\s+[\w*{}\s,]+\s+from\s"),
    ("process", r"\bprocess\s*(\.|\[)"),
    ("child_process", r"child_process"),
    ("filesystem", r"\bfs\s*(\.|\[)"),
    ("vm_module", r"\bvm\s*\.\s*(run|compile|Script)"),
    ("deno", r"\bDeno\s*(\.|\[)"),
    ("bun", r"\bBun\s*(\.|\[)"),
    ("global_this", r"\bglobalThis\b"),
    ("proto", r"__proto__"),
];

/// Keyword/regex denylist checked before execution.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    rules: Vec<SafetyRule>,
    max_code_bytes: usize,
}

impl SafetyFilter {
    /// Filter with the JavaScript denylist.
    pub fn javascript() -> Self {
        let rules = JAVASCRIPT_RULES
            .iter()
            .filter_map(|(name, pattern)| match SafetyRule::new(*name, pattern) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::error!(rule = name, error = %e, "Invalid built-in safety rule");
                    None
                }
            })
            .collect();
        Self {
            rules,
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
        }
    }

    /// Filter with a caller-supplied rule set.
    pub fn with_rules(rules: Vec<SafetyRule>) -> Self {
        Self {
            rules,
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
        }
    }

    pub fn with_max_code_bytes(mut self, max_code_bytes: usize) -> Self {
        self.max_code_bytes = max_code_bytes;
        self
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// Check a code string. Never executes anything.
    pub fn check(&self, code: &str) -> SafetyVerdict {
        if code.len() > self.max_code_bytes {
            return SafetyVerdict::Rejected {
                reason: format!(
                    "Code exceeds maximum length ({} > {} bytes)",
                    code.len(),
                    self.max_code_bytes
                ),
                rule: "max_length".to_string(),
            };
        }

        match self.rules.iter().find(|rule| rule.matches(code)) {
            Some(rule) => {
                tracing::warn!(rule = rule.name(), "Safety filter rejected code");
                SafetyVerdict::Rejected {
                    reason: DANGEROUS_CODE_REASON.to_string(),
                    rule: rule.name().to_string(),
                }
            }
            None => SafetyVerdict::Accepted,
        }
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::javascript()
    }
}
