use crate::error::{Error, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| Error::MsgError("failed to hash password".into()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| Error::MsgError("invalid password hash".into()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// New passwords must mix letters, digits and at least one special
/// character, and may contain nothing else.
pub fn password_strength_ok(password: &str) -> bool {
    const SPECIALS: &str = "@$!%*?&";
    let has_alpha = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIALS.contains(c));
    let only_allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || SPECIALS.contains(c));
    has_alpha && has_digit && has_special && only_allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret!pw").unwrap();
        assert!(hash.starts_with("$argon2"));

        assert!(verify_password("s3cret!pw", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hash1 = hash_password("s3cret!pw").unwrap();
        let hash2 = hash_password("s3cret!pw").unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("s3cret!pw", &hash1).unwrap());
        assert!(verify_password("s3cret!pw", &hash2).unwrap());
    }

    #[test]
    fn test_password_strength() {
        assert!(password_strength_ok("abc123!x"));
        assert!(!password_strength_ok(""));
        assert!(!password_strength_ok("abcdefgh"));
        assert!(!password_strength_ok("12345678"));
        assert!(!password_strength_ok("abc12345"));
        assert!(!password_strength_ok("abc 123!"));
    }
}
