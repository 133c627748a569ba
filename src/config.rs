//! API configuration and URL prefix derivation.

use heck::ToSnakeCase;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

const ENV_PREFIX: &str = "AUTOCRUD_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// How an entity name becomes its URL segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixStyle {
    /// `Category` → `categories`
    #[default]
    Plural,
    /// `Category` → `category`
    Singular,
    /// The table name, untouched.
    Table,
}

impl FromStr for PrefixStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plural" => Ok(Self::Plural),
            "singular" => Ok(Self::Singular),
            "table" => Ok(Self::Table),
            other => Err(format!("expected plural, singular or table, got '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Mount point of every route group, `/api` by default.
    pub base_path: String,
    pub prefix_style: PrefixStyle,
    /// Explicit URL segments by entity name, overriding `prefix_style`.
    pub prefixes: BTreeMap<String, String>,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Where the OpenAPI document is served. `None` disables the route.
    pub openapi_path: Option<String>,
    pub max_page_size: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/api".to_owned(),
            prefix_style: PrefixStyle::Plural,
            prefixes: BTreeMap::new(),
            title: "autocrud".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            description: None,
            openapi_path: Some("/openapi.json".to_owned()),
            max_page_size: 1000,
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `AUTOCRUD_*` environment variables.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `AUTOCRUD_BASE_PATH` | `base_path` |
    /// | `AUTOCRUD_PREFIX_STYLE` | `prefix_style` |
    /// | `AUTOCRUD_PREFIXES` | `prefixes`, as `User=people,Item=things` |
    /// | `AUTOCRUD_TITLE` | `title` |
    /// | `AUTOCRUD_VERSION` | `version` |
    /// | `AUTOCRUD_DESCRIPTION` | `description` |
    /// | `AUTOCRUD_OPENAPI_PATH` | `openapi_path`, empty to disable |
    /// | `AUTOCRUD_MAX_PAGE_SIZE` | `max_page_size` |
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let invalid = |suffix: &str, value: &str, reason: String| ConfigError::Invalid {
            var: format!("{ENV_PREFIX}{suffix}"),
            value: value.to_owned(),
            reason,
        };

        let mut config = Self::default();
        if let Some(base_path) = var("BASE_PATH") {
            config.base_path = base_path;
        }
        if let Some(style) = var("PREFIX_STYLE") {
            config.prefix_style = style
                .parse::<PrefixStyle>()
                .map_err(|reason| invalid("PREFIX_STYLE", &style, reason))?;
        }
        if let Some(prefixes) = var("PREFIXES") {
            for pair in prefixes.split(',').filter(|p| !p.trim().is_empty()) {
                let (entity, prefix) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("PREFIXES", pair, "expected Entity=prefix".to_owned()))?;
                config
                    .prefixes
                    .insert(entity.trim().to_owned(), prefix.trim().to_owned());
            }
        }
        if let Some(title) = var("TITLE") {
            config.title = title;
        }
        if let Some(version) = var("VERSION") {
            config.version = version;
        }
        if let Some(description) = var("DESCRIPTION") {
            config.description = Some(description);
        }
        if let Some(path) = var("OPENAPI_PATH") {
            config.openapi_path = (!path.trim().is_empty()).then_some(path);
        }
        if let Some(size) = var("MAX_PAGE_SIZE") {
            config.max_page_size = match size.trim().parse::<u64>() {
                Ok(0) => return Err(invalid("MAX_PAGE_SIZE", &size, "must be positive".to_owned())),
                Ok(n) => n,
                Err(e) => return Err(invalid("MAX_PAGE_SIZE", &size, e.to_string())),
            };
        }
        Ok(config)
    }

    /// URL segment of an entity, without slashes.
    #[must_use]
    pub fn prefix_for(&self, entity_name: &str, table_name: &str) -> String {
        if let Some(prefix) = self.prefixes.get(entity_name) {
            return prefix.trim_matches('/').to_owned();
        }
        match self.prefix_style {
            PrefixStyle::Plural => pluralize(&entity_name.to_snake_case()),
            PrefixStyle::Singular => entity_name.to_snake_case(),
            PrefixStyle::Table => table_name.to_owned(),
        }
    }

    /// Full path of a route group: `base_path` joined with `prefix`.
    #[must_use]
    pub fn mount(&self, prefix: &str) -> String {
        join(&self.base_path, prefix)
    }
}

fn join(base: &str, segment: &str) -> String {
    let base = base.trim_matches('/');
    let segment = segment.trim_matches('/');
    match (base.is_empty(), segment.is_empty()) {
        (true, true) => "/".to_owned(),
        (true, false) => format!("/{segment}"),
        (false, true) => format!("/{base}"),
        (false, false) => format!("/{base}/{segment}"),
    }
}

/// English plural of the last word of a snake_case name.
fn pluralize(word: &str) -> String {
    const SIBILANT: [&str; 5] = ["s", "x", "z", "ch", "sh"];

    if SIBILANT.iter().any(|end| word.ends_with(end)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.ends_with(|c: char| c.is_ascii_alphabetic() && !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}
