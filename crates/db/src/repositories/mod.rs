//! Database repositories.

pub mod content;
pub mod enforcement;
pub mod report;
pub mod user;

pub use content::ContentRepository;
pub use enforcement::EnforcementRepository;
pub use report::ReportRepository;
pub use user::UserRepository;
