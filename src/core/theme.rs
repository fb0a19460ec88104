use std::fmt;

use tracing::warn;

use crate::core::storage::{KeyValueStore, StorageError, THEME_KEY};

/// Display theme persisted alongside the session list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Restores the saved theme, falling back to the OS preference and then
    /// to light when nothing usable is stored.
    pub fn load(storage: &dyn KeyValueStore) -> Self {
        let saved = match storage.get(THEME_KEY) {
            Ok(saved) => saved,
            Err(err) => {
                warn!(error = %err, "theme record unreadable");
                None
            }
        };
        saved
            .as_deref()
            .and_then(Theme::parse)
            .or_else(detect_preferred_theme)
            .unwrap_or(Theme::Light)
    }

    pub fn save(self, storage: &mut dyn KeyValueStore) -> Result<(), StorageError> {
        storage.set(THEME_KEY, self.as_str())
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort OS dark-mode hint. Returns None when no hint is available.
pub fn detect_preferred_theme() -> Option<Theme> {
    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        // Prints "Dark" when dark mode is on; exits non-zero when the key is unset.
        let output = Command::new("/usr/bin/defaults")
            .args(["read", "-g", "AppleInterfaceStyle"])
            .output()
            .ok()?;
        let dark = output.status.success()
            && String::from_utf8_lossy(&output.stdout)
                .to_ascii_lowercase()
                .contains("dark");
        return Some(if dark { Theme::Dark } else { Theme::Light });
    }

    #[cfg(target_os = "linux")]
    {
        use std::process::Command;
        let output = Command::new("gsettings")
            .args(["get", "org.gnome.desktop.interface", "color-scheme"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let scheme = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
        if scheme.contains("prefer-dark") {
            return Some(Theme::Dark);
        }
        if scheme.contains("default") || scheme.contains("prefer-light") {
            return Some(Theme::Light);
        }
        None
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
