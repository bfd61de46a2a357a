//! Data models for the lending domain

pub mod borrowing;
pub mod membership;
pub mod subscription;

// Re-export commonly used types
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingStatus, LoanCountScope};
pub use membership::{LoanTerms, Membership};
pub use subscription::Subscription;
