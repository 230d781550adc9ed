use std::sync::Arc;

use crate::error::AppError;
use crate::model::{Profile, ProfileChanges};
use crate::store::{KeyValueStore, PROFILE_KEY};

/// Locally stored body profile; the weight drives calorie estimates.
pub struct ProfileStore<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ProfileStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Profile {
        match self.store.get(PROFILE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(profile) => profile,
                Err(err) => {
                    tracing::warn!(error = %err, "stored profile is unreadable");
                    Profile::default()
                }
            },
            Ok(None) => Profile::default(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read profile");
                Profile::default()
            }
        }
    }

    pub async fn save(&self, changes: ProfileChanges) -> Result<Profile, AppError> {
        if let Some(username) = changes.username.as_deref() {
            if username.trim().is_empty() {
                return Err(AppError::Validation("username is empty".to_string()));
            }
        }
        ensure_positive("height", changes.height_cm)?;
        ensure_positive("weight", changes.weight_kg)?;

        let mut profile = self.load().await;
        if let Some(username) = changes.username {
            profile.username = Some(username.trim().to_string());
        }
        if changes.height_cm.is_some() {
            profile.height_cm = changes.height_cm;
        }
        if changes.weight_kg.is_some() {
            profile.weight_kg = changes.weight_kg;
        }

        let raw = serde_json::to_string(&profile)?;
        if let Err(err) = self.store.set(PROFILE_KEY, raw).await {
            tracing::warn!(error = %err, "failed to persist profile");
        }
        Ok(profile)
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.remove(PROFILE_KEY).await {
            tracing::warn!(error = %err, "failed to clear profile");
        }
    }
}

fn ensure_positive(label: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(value) if !value.is_finite() || value <= 0.0 => Err(AppError::Validation(format!(
            "{label} must be a positive number"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn save_merges_with_existing_profile() {
        let store = Arc::new(MemoryStore::new());
        let profiles = ProfileStore::new(store.clone());

        profiles
            .save(ProfileChanges {
                username: Some(" emily ".to_string()),
                height_cm: Some(168.0),
                ..Default::default()
            })
            .await
            .expect("save username");
        let profile = profiles
            .save(ProfileChanges {
                weight_kg: Some(61.5),
                ..Default::default()
            })
            .await
            .expect("save weight");

        assert_eq!(profile.username.as_deref(), Some("emily"));
        assert_eq!(profile.height_cm, Some(168.0));
        assert_eq!(profile.weight_kg, Some(61.5));
        assert_eq!(profiles.load().await, profile);
    }

    #[tokio::test]
    async fn rejects_non_positive_weight() {
        let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));

        let err = profiles
            .save(ProfileChanges {
                weight_kg: Some(0.0),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(profiles.load().await, Profile::default());
    }

    #[tokio::test]
    async fn clear_and_unreadable_profiles_load_empty() {
        let store = Arc::new(MemoryStore::new().with_entry(PROFILE_KEY, "not json"));
        let profiles = ProfileStore::new(store.clone());
        assert_eq!(profiles.load().await, Profile::default());

        store.put(PROFILE_KEY, r#"{"weight_kg":70.0}"#);
        assert_eq!(profiles.load().await.weight_kg, Some(70.0));

        profiles.clear().await;
        assert!(store.peek(PROFILE_KEY).is_none());
    }
}
