use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{CoreError, CoreResult};

/// Hashes `password` into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Password(format!("failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Returns `Ok(false)` on mismatch; `Err` only when `hash` is not a valid PHC string.
pub fn verify_password(hash: &str, password: &str) -> CoreResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| CoreError::Password(format!("invalid password hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn invalid_hash_is_an_error() {
        assert!(matches!(
            verify_password("not-a-phc-string", "x"),
            Err(CoreError::Password(_))
        ));
    }
}
