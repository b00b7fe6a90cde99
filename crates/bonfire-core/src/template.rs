//! # Template Resolver
//!
//! Substitutes `$name` / `${name}` placeholders in stored query options.
//! Three time variables are always available (`today`, `time`, `now`),
//! rendered from the caller's clock; `-x key=value` overrides win over them.
//! `$$` is a literal dollar sign.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Local, Timelike};
use regex::Regex;

use crate::error::{Error, Result};

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\$(?:(\$)|([_a-z][_a-z0-9]*)|\{([_a-z][_a-z0-9]*)\}|)")
            .expect("placeholder pattern is valid")
    })
}

/// Caller-supplied `key=value` overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    vars: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` tokens. The value may itself contain `=`.
    pub fn parse<I, S>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars = BTreeMap::new();
        for option in options {
            let option = option.as_ref();
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| Error::InvalidTemplateOption(option.to_string()))?;
            if key.is_empty() {
                return Err(Error::InvalidTemplateOption(option.to_string()));
            }
            vars.insert(key.to_string(), value.to_string());
        }
        Ok(Self { vars })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// The built-in time variables as rendered at `now`.
pub fn builtins(now: DateTime<Local>) -> [(&'static str, String); 3] {
    let centis = now.nanosecond() % 1_000_000_000 / 10_000_000;
    [
        ("today", now.format("%Y-%m-%d").to_string()),
        ("time", now.format("%H:%M:%S").to_string()),
        (
            "now",
            format!("{}.{:02}", now.format("%Y-%m-%d %H:%M:%S"), centis),
        ),
    ]
}

/// Substitute every placeholder in `template`.
///
/// Fails with [`Error::UndefinedPlaceholder`] when a name is neither an
/// override nor a built-in, and with [`Error::InvalidPlaceholder`] on a bare
/// `$` that starts no valid name.
pub fn render(template: &str, overrides: &TemplateVars, now: DateTime<Local>) -> Result<String> {
    let builtins = builtins(now);
    let lookup = |name: &str| -> Option<&str> {
        overrides.get(name).or_else(|| {
            builtins
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        })
    };

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in placeholder().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('$');
            continue;
        }

        let name = match caps.get(2).or_else(|| caps.get(3)) {
            Some(name) => name.as_str(),
            None => {
                return Err(Error::InvalidPlaceholder {
                    template: template.to_string(),
                    offset: whole.start(),
                })
            }
        };
        let value = lookup(name).ok_or_else(|| Error::UndefinedPlaceholder(name.to_string()))?;
        out.push_str(value);
    }
    out.push_str(&template[last..]);
    Ok(out)
}
