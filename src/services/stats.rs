//! Statistics service

use crate::{error::AppResult, models::stats::DashboardStats, repository::Repository};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Counts shown on the staff dashboard
    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let stats = &self.repository.stats;
        let (books, borrowings, users) = tokio::try_join!(stats.books(), stats.borrowings(), stats.users())?;
        Ok(DashboardStats { books, borrowings, users })
    }
}
