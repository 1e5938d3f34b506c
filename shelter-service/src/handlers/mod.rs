//! HTTP handlers for the shelter service.

pub mod auth;
pub mod locks;
pub mod media;
pub mod permissions;
pub mod roles;
pub mod user;

pub use auth::*;
pub use locks::*;
pub use media::*;
pub use permissions::*;
pub use roles::*;
pub use user::*;
