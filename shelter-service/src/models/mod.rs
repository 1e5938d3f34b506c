pub mod editing_lock;
pub mod security_token;
pub mod user;

pub use editing_lock::EditingLock;
pub use security_token::{SecurityToken, TokenType};
pub use user::{NewUser, Permission, ProfileUpdate, Role, SanitizedUser, User};
