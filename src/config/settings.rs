//! Runtime feature toggles.
//!
//! `AppConfig` is read once at startup. The toggles that may change while the
//! daemon runs live in a [`SettingsStore`]: every mutation goes through
//! [`SettingsStore::update`], and components hold a read-only [`SettingsView`]
//! that always reflects the latest value.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::AppConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Snapshot of the toggles consulted on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub cache_enabled: bool,
    pub completions_enabled: bool,
    pub chat_enabled: bool,
    pub monthly_limit_usd: Option<f64>,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cache_enabled: config.cache.enabled,
            completions_enabled: config.completions.enabled,
            chat_enabled: config.chat.enabled,
            monthly_limit_usd: config.usage.monthly_limit_usd,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Partial update accepted by [`SettingsStore::apply`].
///
/// A non-positive `monthly_limit_usd` removes the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub cache_enabled: Option<bool>,
    #[serde(default)]
    pub completions_enabled: Option<bool>,
    #[serde(default)]
    pub chat_enabled: Option<bool>,
    #[serde(default)]
    pub monthly_limit_usd: Option<f64>,
}

/// Owner of the live settings.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn view(&self) -> SettingsView {
        SettingsView(self.tx.subscribe())
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// The single mutation entry point. Returns the settings after the change.
    pub fn update<F>(&self, modify: F) -> Settings
    where
        F: FnOnce(&mut Settings),
    {
        self.tx.send_modify(modify);
        self.current()
    }

    pub fn apply(&self, patch: SettingsPatch) -> Settings {
        let updated = self.update(|settings| {
            if let Some(enabled) = patch.cache_enabled {
                settings.cache_enabled = enabled;
            }
            if let Some(enabled) = patch.completions_enabled {
                settings.completions_enabled = enabled;
            }
            if let Some(enabled) = patch.chat_enabled {
                settings.chat_enabled = enabled;
            }
            if let Some(limit) = patch.monthly_limit_usd {
                settings.monthly_limit_usd = (limit > 0.0).then_some(limit);
            }
        });
        info!(?updated, "Settings updated");
        updated
    }
}

/// Read-only view of the live settings.
#[derive(Clone)]
pub struct SettingsView(watch::Receiver<Settings>);

impl SettingsView {
    /// A view pinned to one value, for components used outside the daemon.
    pub fn fixed(settings: Settings) -> Self {
        let (_tx, rx) = watch::channel(settings);
        Self(rx)
    }

    pub fn current(&self) -> Settings {
        self.0.borrow().clone()
    }

    pub fn cache_enabled(&self) -> bool {
        self.0.borrow().cache_enabled
    }

    pub fn monthly_limit_usd(&self) -> Option<f64> {
        self.0.borrow().monthly_limit_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_observe_updates() {
        let store = SettingsStore::new(Settings::default());
        let view = store.view();
        assert!(view.cache_enabled());

        store.update(|s| s.cache_enabled = false);
        assert!(!view.cache_enabled());
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let store = SettingsStore::new(Settings::default());
        let updated = store.apply(SettingsPatch {
            chat_enabled: Some(false),
            monthly_limit_usd: Some(20.0),
            ..Default::default()
        });

        assert!(updated.cache_enabled);
        assert!(updated.completions_enabled);
        assert!(!updated.chat_enabled);
        assert_eq!(updated.monthly_limit_usd, Some(20.0));

        let cleared = store.apply(SettingsPatch {
            monthly_limit_usd: Some(0.0),
            ..Default::default()
        });
        assert_eq!(cleared.monthly_limit_usd, None);
    }

    #[test]
    fn test_fixed_view_keeps_value_without_store() {
        let view = SettingsView::fixed(Settings {
            cache_enabled: false,
            ..Default::default()
        });
        assert!(!view.cache_enabled());
    }
}
