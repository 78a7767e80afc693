//! Settings service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        event::{ChangeAction, ChangeEvent, ChangeTable},
        settings::{SettingsResponse, UpdateSettingsRequest},
    },
    repository::Repository,
    services::events::ChangeFeed,
};

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
    events: ChangeFeed,
}

impl SettingsService {
    pub fn new(repository: Repository, events: ChangeFeed) -> Self {
        Self { repository, events }
    }

    /// Get current settings
    pub async fn get_settings(&self) -> AppResult<SettingsResponse> {
        let library = self.repository.settings.library_info().await?;
        let policies = self.repository.settings.policies().await?;
        Ok(SettingsResponse { library, policies })
    }

    /// Update settings
    pub async fn update_settings(&self, request: UpdateSettingsRequest) -> AppResult<SettingsResponse> {
        request.validate()?;
        for policy in request.policies.iter().flatten() {
            policy.check_amounts().map_err(AppError::Validation)?;
        }

        self.repository.settings.update(&request).await?;

        let settings = self.get_settings().await?;
        self.events.publish(ChangeEvent::new(
            ChangeTable::Settings,
            ChangeAction::Update,
            "library",
            Some(&settings),
        ));
        Ok(settings)
    }
}
