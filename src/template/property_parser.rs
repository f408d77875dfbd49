use std::{collections::BTreeMap, sync::Arc};

use crate::Error;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// What to do with a `${name}` placeholder that no enclosing scope defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderPolicy {
    /// Leave the placeholder text in place.
    #[default]
    Keep,
    /// Fail with a builder error.
    Error,
}

/// Name→text substitution set visible at one point of a template tree.
///
/// Cloning is cheap; a child scope copies the parent entries once and
/// applies its own declarations on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    variables: Arc<BTreeMap<String, String>>,
}

impl Scope {
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self {
            variables: Arc::new(variables),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Parent entries overridden by `declared`.
    pub fn with_overrides(&self, declared: BTreeMap<String, String>) -> Scope {
        if declared.is_empty() {
            return self.clone();
        }
        let mut variables = (*self.variables).clone();
        variables.extend(declared);
        Scope::new(variables)
    }
}

impl From<BTreeMap<String, String>> for Scope {
    fn from(variables: BTreeMap<String, String>) -> Self {
        Scope::new(variables)
    }
}

/// Resolves `${name}` placeholders against a [`Scope`].
///
/// A backslash directly before `${` escapes the placeholder.
#[derive(Debug, Clone, Default)]
pub struct PropertyParser {
    policy: PlaceholderPolicy,
    default_value_separator: Option<String>,
}

impl PropertyParser {
    pub fn new(policy: PlaceholderPolicy, default_value_separator: Option<String>) -> Self {
        Self {
            policy,
            default_value_separator: default_value_separator.filter(|s| !s.is_empty()),
        }
    }

    pub fn policy(&self) -> PlaceholderPolicy {
        self.policy
    }

    pub fn parse(&self, text: &str, scope: &Scope) -> Result<String, Error> {
        if !text.contains(OPEN) {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 && rest[..start].ends_with('\\') {
                out.push_str(&rest[..start - 1]);
                out.push_str(OPEN);
                rest = &rest[start + OPEN.len()..];
                continue;
            }
            out.push_str(&rest[..start]);
            let after_open = &rest[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                // unterminated: the remainder is literal text
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let key = &after_open[..end];
            out.push_str(&self.resolve(key, scope)?);
            rest = &after_open[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve(&self, key: &str, scope: &Scope) -> Result<String, Error> {
        if let Some(separator) = &self.default_value_separator {
            if let Some((name, default)) = key.split_once(separator.as_str()) {
                return Ok(scope.get(name).unwrap_or(default).to_string());
            }
        }
        match (scope.get(key), self.policy) {
            (Some(value), _) => Ok(value.to_string()),
            (None, PlaceholderPolicy::Keep) => Ok(format!("{OPEN}{key}{CLOSE}")),
            (None, PlaceholderPolicy::Error) => Err(Error::Builder(format!(
                "unresolved placeholder '{OPEN}{key}{CLOSE}'"
            ))),
        }
    }
}
