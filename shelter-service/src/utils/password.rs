use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use service_core::error::AppError;
use sha2::{Digest, Sha256};

/// Plain-text password. `Debug` never prints the secret.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Argon2id hash with a random salt, in PHC string form.
pub fn hash_password(password: &Password) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to hash password: {}", e)))
}

/// `true` when `password` matches `password_hash`. A malformed hash never matches.
pub fn verify_password(password: &Password, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_str().as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

/// Short digest of a stored hash, embedded in reset tokens so that a token dies
/// once the password changes.
pub fn hash_fingerprint(password_hash: &str) -> String {
    hex::encode(&Sha256::digest(password_hash.as_bytes())[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = Password::new("correct horse battery");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&password, &hash));
        assert!(!verify_password(&Password::new("wrong"), &hash));
    }

    #[test]
    fn test_salts_differ_and_garbage_never_matches() {
        let password = Password::new("correct horse battery");
        let a = hash_password(&password).unwrap();
        let b = hash_password(&password).unwrap();

        assert_ne!(a, b);
        assert_ne!(hash_fingerprint(&a), hash_fingerprint(&b));
        assert!(!verify_password(&password, "not-a-phc-string"));
    }

    #[test]
    fn test_debug_hides_secret() {
        assert_eq!(format!("{:?}", Password::new("hunter2")), "Password(***)");
    }
}
