//! Keymap resolution through the XKB rule database.
//!
//! An RMLVO configuration (rules/model/layout/variant/options) is composed
//! into a compiled keymap exactly once, at backend startup. Keyboard
//! drivers derive per-device state from the shared keymap; layout hot-swap
//! is not supported.

use xkbcommon::xkb;

use crate::error::{Error, Result};

/// RMLVO keymap configuration.
///
/// Unset fields fall back to the system defaults baked into the rule
/// database. Layout, variant, and options take comma-separated lists, as
/// the database itself does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeymapConfig {
    pub rules: Option<String>,
    pub model: Option<String>,
    pub layout: Option<String>,
    pub variant: Option<String>,
    pub options: Option<String>,
}

impl KeymapConfig {
    /// Fill unset fields from the `XKB_DEFAULT_*` environment variables.
    ///
    /// Called once at configuration-build time; the environment is not
    /// re-read afterwards.
    pub(crate) fn with_env_fallback(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        self.rules = self.rules.or_else(|| env("XKB_DEFAULT_RULES"));
        self.model = self.model.or_else(|| env("XKB_DEFAULT_MODEL"));
        self.layout = self.layout.or_else(|| env("XKB_DEFAULT_LAYOUT"));
        self.variant = self.variant.or_else(|| env("XKB_DEFAULT_VARIANT"));
        self.options = self.options.or_else(|| env("XKB_DEFAULT_OPTIONS"));
        self
    }
}

/// A compiled keymap, shared by all keyboard drivers.
#[derive(Clone)]
pub struct ResolvedKeymap {
    pub(crate) keymap: xkb::Keymap,
}

impl ResolvedKeymap {
    /// Compose `config` against the rule database.
    ///
    /// Fails with [`Error::InvalidLayoutSpec`] when the database cannot
    /// resolve the combination.
    pub fn resolve(config: &KeymapConfig) -> Result<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            config.rules.as_deref().unwrap_or(""),
            config.model.as_deref().unwrap_or(""),
            config.layout.as_deref().unwrap_or(""),
            config.variant.as_deref().unwrap_or(""),
            config.options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| {
            Error::InvalidLayoutSpec(format!(
                "rules={:?} model={:?} layout={:?} variant={:?} options={:?}",
                config.rules, config.model, config.layout, config.variant, config.options,
            ))
        })?;
        Ok(Self { keymap })
    }

    /// Fresh per-device lookup state (modifier and group tracking).
    pub(crate) fn new_state(&self) -> xkb::State {
        xkb::State::new(&self.keymap)
    }
}

impl std::fmt::Debug for ResolvedKeymap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKeymap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_fallback_fills_only_unset_fields() {
        let config = KeymapConfig {
            layout: Some("de".into()),
            ..Default::default()
        };
        let env = |name: &str| match name {
            "XKB_DEFAULT_LAYOUT" => Some("us".to_string()),
            "XKB_DEFAULT_VARIANT" => Some("nodeadkeys".to_string()),
            _ => None,
        };
        let resolved = config.with_env_fallback(env);
        // Explicit value wins over the environment.
        assert_eq!(resolved.layout.as_deref(), Some("de"));
        assert_eq!(resolved.variant.as_deref(), Some("nodeadkeys"));
        assert_eq!(resolved.rules, None);
    }
}
