//! REST surface: auth, profile, message history, groups, albums, admin.

pub mod admin;
pub mod albums;
pub mod auth;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
