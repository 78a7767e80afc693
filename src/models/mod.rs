//! Data models for Maktaba

pub mod book;
pub mod borrowing;
pub mod category;
pub mod event;
pub mod preference;
pub mod settings;
pub mod stats;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use borrowing::{BorrowingDetails, BorrowingPolicy, BorrowingRecord, BorrowingStatus};
pub use category::Category;
pub use event::{ChangeAction, ChangeEvent, ChangeTable};
pub use user::{Profile, Role, UserClaims};
