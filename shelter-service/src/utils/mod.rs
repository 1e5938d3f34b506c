pub mod password;
pub mod validation;

pub use password::{hash_fingerprint, hash_password, verify_password, Password};
pub use validation::ValidatedJson;
