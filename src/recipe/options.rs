// src/recipe/options.rs

//! Build option vocabulary
//!
//! Options are written as plain names (`lto`) to force them on and with a
//! leading `!` (`!check`) to force them off. Anything not mentioned keeps
//! its default.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options a recipe or subpackage may toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecipeOption {
    /// Run the check stage
    Check,
    /// Iterate configure/build/check/install over the cross targets
    Cross,
    /// Link-time optimization
    Lto,
    /// Reproducibility hardening (fixed timestamps, path prefix maps)
    Reproducible,
    /// Parallel make jobs
    Parallel,
    /// Strip binaries when packaging
    Strip,
}

impl RecipeOption {
    pub fn all() -> &'static [RecipeOption] {
        &[
            Self::Check,
            Self::Cross,
            Self::Lto,
            Self::Reproducible,
            Self::Parallel,
            Self::Strip,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Cross => "cross",
            Self::Lto => "lto",
            Self::Reproducible => "reproducible",
            Self::Parallel => "parallel",
            Self::Strip => "strip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|o| o.as_str() == s)
    }

    /// Value used when a recipe does not mention the option
    pub fn default_enabled(&self) -> bool {
        true
    }
}

impl std::fmt::Display for RecipeOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Explicit option settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Options {
    settings: BTreeMap<RecipeOption, bool>,
}

impl Options {
    /// Parse option words such as `["!check", "lto"]`
    pub fn parse<S: AsRef<str>>(words: &[S]) -> Result<Self> {
        let mut settings = BTreeMap::new();
        for word in words {
            let word = word.as_ref().trim();
            let (name, value) = match word.strip_prefix('!') {
                Some(name) => (name, false),
                None => (word, true),
            };
            let option =
                RecipeOption::parse(name).ok_or_else(|| Error::InvalidOption(word.to_string()))?;
            settings.insert(option, value);
        }
        Ok(Self { settings })
    }

    /// Whether an option is in effect
    pub fn enabled(&self, option: RecipeOption) -> bool {
        self.settings
            .get(&option)
            .copied()
            .unwrap_or_else(|| option.default_enabled())
    }

    pub fn set(&mut self, option: RecipeOption, value: bool) {
        self.settings.insert(option, value);
    }

    /// Layer `overrides` on top of these settings
    pub fn merged(&self, overrides: &Options) -> Options {
        let mut settings = self.settings.clone();
        settings.extend(overrides.settings.iter().map(|(k, v)| (*k, *v)));
        Options { settings }
    }

    /// Option words, explicit settings only
    pub fn to_words(&self) -> Vec<String> {
        self.settings
            .iter()
            .map(|(option, enabled)| {
                if *enabled {
                    option.as_str().to_string()
                } else {
                    format!("!{}", option)
                }
            })
            .collect()
    }
}

impl TryFrom<Vec<String>> for Options {
    type Error = Error;

    fn try_from(words: Vec<String>) -> Result<Self> {
        Options::parse(&words)
    }
}

impl From<Options> for Vec<String> {
    fn from(options: Options) -> Self {
        options.to_words()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_negations() {
        let options = Options::parse(&["!check", "!lto"]).unwrap();
        assert!(!options.enabled(RecipeOption::Check));
        assert!(!options.enabled(RecipeOption::Lto));
        assert!(options.enabled(RecipeOption::Cross));
        assert!(options.enabled(RecipeOption::Parallel));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = Options::parse(&["!foreignelf"]).unwrap_err();
        assert!(matches!(err, Error::InvalidOption(word) if word == "!foreignelf"));
    }

    #[test]
    fn test_merged_overrides_win() {
        let base = Options::parse(&["!strip", "!check"]).unwrap();
        let overrides = Options::parse(&["strip"]).unwrap();
        let merged = base.merged(&overrides);
        assert!(merged.enabled(RecipeOption::Strip));
        assert!(!merged.enabled(RecipeOption::Check));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            options: Options,
        }
        let w: Wrapper = toml::from_str(r#"options = ["!cross", "reproducible"]"#).unwrap();
        assert!(!w.options.enabled(RecipeOption::Cross));
        assert_eq!(w.options.to_words(), vec!["!cross", "reproducible"]);

        assert!(toml::from_str::<Wrapper>(r#"options = ["!bogus"]"#).is_err());
    }
}
