use crate::notification::model::{NotificationError, NotificationSettings};
use crate::notification::store::PreferenceStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Looks up and maintains per-recipient notification settings.
#[derive(Clone)]
pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Settings used when deciding whether to deliver an event. A recipient
    /// without a row gets the defaults; nothing is written.
    pub async fn get_settings(
        &self,
        profile_id: Uuid,
    ) -> Result<NotificationSettings, NotificationError> {
        Ok(self
            .store
            .find_settings(profile_id)
            .await?
            .unwrap_or_default())
    }

    /// Settings page read: seeds the default row the first time it is visited.
    pub async fn load_or_seed(
        &self,
        profile_id: Uuid,
    ) -> Result<NotificationSettings, NotificationError> {
        if let Some(settings) = self.store.find_settings(profile_id).await? {
            return Ok(settings);
        }

        let defaults = NotificationSettings::default();
        self.store.upsert_settings(profile_id, defaults).await?;
        info!("Seeded default notification settings for {}", profile_id);
        Ok(defaults)
    }

    pub async fn save(
        &self,
        profile_id: Uuid,
        settings: NotificationSettings,
    ) -> Result<NotificationSettings, NotificationError> {
        self.store.upsert_settings(profile_id, settings).await?;
        info!(
            "Updated notification settings for {} (email: {})",
            profile_id, settings.pref_email
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::store::MockPreferenceStore;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_missing_row_yields_defaults_without_writing() {
        let mut store = MockPreferenceStore::new();
        store.expect_find_settings().returning(|_| Ok(None));
        store.expect_upsert_settings().times(0);

        let resolver = PreferenceResolver::new(Arc::new(store));
        let settings = resolver.get_settings(Uuid::new_v4()).await.unwrap();

        assert_eq!(settings, NotificationSettings::default());
    }

    #[tokio::test]
    async fn test_settings_page_seeds_defaults_once() {
        let profile_id = Uuid::new_v4();
        let mut store = MockPreferenceStore::new();
        store
            .expect_find_settings()
            .with(eq(profile_id))
            .returning(|_| Ok(None));
        store
            .expect_upsert_settings()
            .with(eq(profile_id), eq(NotificationSettings::default()))
            .times(1)
            .returning(|_, _| Ok(()));

        let resolver = PreferenceResolver::new(Arc::new(store));
        let settings = resolver.load_or_seed(profile_id).await.unwrap();

        assert!(!settings.pref_email);
    }

    #[tokio::test]
    async fn test_existing_row_is_returned_as_is() {
        let stored = NotificationSettings {
            pref_email: true,
            on_like: true,
            ..Default::default()
        };
        let mut store = MockPreferenceStore::new();
        store
            .expect_find_settings()
            .returning(move |_| Ok(Some(stored)));
        store.expect_upsert_settings().times(0);

        let resolver = PreferenceResolver::new(Arc::new(store));
        assert_eq!(resolver.load_or_seed(Uuid::new_v4()).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_lookup_errors_propagate() {
        let mut store = MockPreferenceStore::new();
        store
            .expect_find_settings()
            .returning(|_| Err(NotificationError::InternalError("down".to_string())));

        let resolver = PreferenceResolver::new(Arc::new(store));
        assert!(resolver.get_settings(Uuid::new_v4()).await.is_err());
    }
}
