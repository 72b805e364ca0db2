//! Profile slice: the signed-in user, read through the offline cache.

use serde::Deserialize;

use super::{cache_fallback, Remote, SyncError};
use crate::api::api_types::ApiProfile;
use crate::api::client::{ApiClient, ApiError};
use crate::api::types::UserProfile;
use crate::cache::{CacheKey, DataSource, KeyValueStorage, OfflineCache};

const PROFILE_PATH: &str = "auth/profile/";

pub struct ProfileSync<C: ApiClient, S: KeyValueStorage> {
  remote: Remote<C>,
  cache: OfflineCache<S>,
}

impl<C: ApiClient, S: KeyValueStorage> ProfileSync<C, S> {
  pub fn new(remote: Remote<C>, cache: OfflineCache<S>) -> Self {
    Self { remote, cache }
  }

  pub async fn fetch_remote(&self) -> Result<UserProfile, ApiError> {
    let response = self.remote.get(PROFILE_PATH).await?;
    let profile = ApiProfile::deserialize(&response.data)
      .map_err(|e| ApiError::transport(format!("Unexpected profile payload: {}", e)))?;
    Ok(profile.into())
  }

  pub async fn fetch_profile(&self) -> Result<(UserProfile, DataSource), SyncError> {
    match self.fetch_remote().await {
      Ok(profile) => {
        if self.remote.is_online() {
          self.cache.set(CacheKey::UserProfile, &profile);
        }
        Ok((profile, DataSource::Network))
      }
      Err(e) => {
        let cached = self.cache.get::<UserProfile>(CacheKey::UserProfile);
        cache_fallback(e, cached, "profile")
      }
    }
  }
}
