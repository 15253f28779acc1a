use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Plugin-wide settings shared by every action.
/// The host may replace these at any time; readers always see
/// the most recently stored value.
#[derive(Default)]
pub struct GlobalSettings {
    api_key: ArcSwapOption<String>,
}

impl GlobalSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key<K: Into<String>>(key: K) -> Self {
        let settings = Self::new();
        settings.set_api_key(Some(key.into()));
        settings
    }

    pub fn api_key(&self) -> Option<Arc<String>> {
        self.api_key.load_full()
    }

    /// Stores a new key. Blank keys are treated as no key.
    pub fn set_api_key(&self, key: Option<String>) {
        let key = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(Arc::new);
        self.api_key.store(key);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replace_key() {
        let settings = GlobalSettings::with_api_key(" abc ");
        k9::assert_equal!(settings.api_key().as_deref().cloned(), Some("abc".to_string()));

        settings.set_api_key(Some("   ".to_string()));
        assert!(settings.api_key().is_none());

        settings.set_api_key(Some("def".to_string()));
        k9::assert_equal!(settings.api_key().as_deref().cloned(), Some("def".to_string()));
    }
}
