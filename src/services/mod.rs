//! Business logic services

pub mod borrowings;
pub mod catalog;
pub mod events;
pub mod preferences;
pub mod settings;
pub mod stats;
pub mod users;

use crate::{config::AppConfig, error::AppResult, query::PageLimits, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrowings: borrowings::BorrowingsService,
    pub preferences: preferences::PreferencesService,
    pub settings: settings::SettingsService,
    pub stats: stats::StatsService,
    pub events: events::ChangeFeed,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let events = events::ChangeFeed::new(config.events.channel_capacity);
        let limits = PageLimits::from(&config.search);

        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone(), events.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), events.clone()),
            borrowings: borrowings::BorrowingsService::new(repository.clone(), events.clone()),
            preferences: preferences::PreferencesService::new(repository.clone(), limits),
            settings: settings::SettingsService::new(repository.clone(), events.clone()),
            stats: stats::StatsService::new(repository.clone()),
            events,
            repository,
        }
    }

    /// Check that the database answers
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
