//! Backend configuration — builder values, environment fallback, defaults.
//!
//! Precedence, highest first: explicit builder calls, environment
//! variables, compiled defaults. The environment is read exactly once,
//! when the configuration snapshot is built; later changes to it have no
//! effect on a running backend.

use std::path::PathBuf;

use crate::input::keymap::KeymapConfig;
use crate::input::registry::FilterPolicy;

/// Framebuffer device when neither builder nor environment names one.
pub const DEFAULT_FRAMEBUFFER: &str = "/dev/fb0";
/// Primary console device default.
pub const DEFAULT_TTY: &str = "/dev/tty1";
/// Console fallback when the primary cannot be opened.
pub const FALLBACK_TTY: &str = "/dev/tty0";

/// Environment variable naming the framebuffer device.
pub const ENV_FRAMEBUFFER: &str = "SLINT_FRAMEBUFFER";
/// Environment variable naming the console device.
pub const ENV_TTY: &str = "SLINT_TTY_DEVICE";

/// Immutable configuration snapshot, resolved before acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackendConfig {
    pub fb_path: PathBuf,
    /// Console candidates, tried in order.
    pub tty_candidates: Vec<PathBuf>,
    pub autodiscovery: bool,
    pub hotplug: bool,
    pub filter: FilterPolicy,
    pub double_buffer: bool,
    pub vsync: bool,
    pub keymap: KeymapConfig,
}

/// Unresolved builder values; `None` means "fall back".
#[derive(Debug, Clone, Default)]
pub(crate) struct BuilderValues {
    pub fb_path: Option<PathBuf>,
    pub tty_path: Option<PathBuf>,
    pub autodiscovery: Option<bool>,
    pub hotplug: Option<bool>,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub double_buffer: Option<bool>,
    pub vsync: Option<bool>,
    pub keymap: KeymapConfig,
}

impl BuilderValues {
    /// Resolve against the process environment.
    pub fn resolve(self) -> BackendConfig {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolution against an explicit environment lookup, for tests.
    pub fn resolve_with(self, env: impl Fn(&str) -> Option<String>) -> BackendConfig {
        let fb_path = self
            .fb_path
            .or_else(|| env(ENV_FRAMEBUFFER).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMEBUFFER));

        let primary_tty = self
            .tty_path
            .or_else(|| env(ENV_TTY).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TTY));
        let mut tty_candidates = vec![primary_tty];
        let fallback = PathBuf::from(FALLBACK_TTY);
        if tty_candidates[0] != fallback {
            tty_candidates.push(fallback);
        }

        BackendConfig {
            fb_path,
            tty_candidates,
            autodiscovery: self.autodiscovery.unwrap_or(true),
            hotplug: self.hotplug.unwrap_or(true),
            filter: FilterPolicy {
                whitelist: self.whitelist,
                blacklist: self.blacklist,
            },
            double_buffer: self.double_buffer.unwrap_or(true),
            vsync: self.vsync.unwrap_or(false),
            keymap: self.keymap.with_env_fallback(env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = BuilderValues::default().resolve_with(no_env);
        assert_eq!(config.fb_path, PathBuf::from("/dev/fb0"));
        assert_eq!(
            config.tty_candidates,
            vec![PathBuf::from("/dev/tty1"), PathBuf::from("/dev/tty0")]
        );
        assert!(config.autodiscovery);
        assert!(config.double_buffer);
        assert!(!config.vsync);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let env = |name: &str| match name {
            "SLINT_FRAMEBUFFER" => Some("/dev/fb1".to_string()),
            "SLINT_TTY_DEVICE" => Some("/dev/tty3".to_string()),
            _ => None,
        };
        let config = BuilderValues::default().resolve_with(env);
        assert_eq!(config.fb_path, PathBuf::from("/dev/fb1"));
        assert_eq!(
            config.tty_candidates,
            vec![PathBuf::from("/dev/tty3"), PathBuf::from("/dev/tty0")]
        );
    }

    #[test]
    fn test_builder_overrides_env() {
        let env = |name: &str| match name {
            "SLINT_FRAMEBUFFER" => Some("/dev/fb1".to_string()),
            _ => None,
        };
        let values = BuilderValues {
            fb_path: Some(PathBuf::from("/dev/fb2")),
            ..Default::default()
        };
        let config = values.resolve_with(env);
        assert_eq!(config.fb_path, PathBuf::from("/dev/fb2"));
    }

    #[test]
    fn test_tty0_not_duplicated_as_its_own_fallback() {
        let values = BuilderValues {
            tty_path: Some(PathBuf::from("/dev/tty0")),
            ..Default::default()
        };
        let config = values.resolve_with(no_env);
        assert_eq!(config.tty_candidates, vec![PathBuf::from("/dev/tty0")]);
    }
}
