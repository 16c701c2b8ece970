//! URI templates with `{name}` placeholders.
//!
//! Templates compile to anchored regexes with named capture groups. When
//! several templates match a URI, the one with the longest static prefix
//! wins (`resources/read` routing).

use regex::Regex;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    static_prefix: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compile a template such as `notes://{id}` or `file:///{path}/{name}`.
    ///
    /// Placeholder names must be non-empty and match `[A-Za-z0-9_]+`; a
    /// placeholder matches one URI segment (no `/`).
    pub fn new(pattern: &str) -> Result<Self> {
        let mut regex_src = String::from("^");
        let mut variables = Vec::new();
        let mut static_prefix = String::new();
        let mut prefix_done = false;

        let mut rest = pattern;
        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            regex_src.push_str(&regex::escape(literal));
            if !prefix_done {
                static_prefix.push_str(literal);
                prefix_done = true;
            }

            let close = tail.find('}').ok_or_else(|| {
                Error::invalid_params(format!("unterminated placeholder in template '{pattern}'"))
            })?;
            let name = &tail[1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::invalid_params(format!(
                    "invalid placeholder name '{name}' in template '{pattern}'"
                )));
            }
            regex_src.push_str(&format!("(?P<{name}>[^/]+)"));
            variables.push(name.to_string());
            rest = &tail[close + 1..];
        }
        regex_src.push_str(&regex::escape(rest));
        if !prefix_done {
            static_prefix.push_str(rest);
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| Error::invalid_params(format!("bad template '{pattern}': {e}")))?;

        Ok(Self {
            pattern: pattern.to_string(),
            static_prefix,
            regex,
            variables,
        })
    }

    /// The original pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The literal text before the first placeholder.
    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }

    /// Match a URI, returning extracted placeholder values on success.
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        let mut values = HashMap::with_capacity(self.variables.len());
        for name in &self.variables {
            if let Some(capture) = captures.name(name) {
                values.insert(name.clone(), capture.as_str().to_string());
            }
        }
        Some(values)
    }
}
