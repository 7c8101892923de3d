//! Database entities.

#![allow(missing_docs)]

pub mod answer;
pub mod ban;
pub mod question;
pub mod reply;
pub mod report;
pub mod user;
pub mod warning;

pub use answer::Entity as Answer;
pub use ban::Entity as Ban;
pub use question::Entity as Question;
pub use reply::Entity as Reply;
pub use report::Entity as Report;
pub use user::Entity as User;
pub use warning::Entity as Warning;
