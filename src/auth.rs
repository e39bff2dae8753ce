use argon2::{
    Argon2,
    PasswordHash,
    PasswordVerifier,
    PasswordHasher,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore, rngs::OsRng, seq::SliceRandom};
use sha2::{Digest, Sha256};

use argon2::password_hash::{SaltString, rand_core::OsRng as PHOsRng};

/// Canonical email form used for both storage and lookup, so the case the
/// caller types never matters.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Verify password against the Argon2 hash stored in DB.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash a new password using Argon2id with a random salt.
/// Store the returned string in app_user.password_hash.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut PHOsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| format!("argon2 hash error: {e}"))
}

/// Generate an opaque session token to return to the client.
/// We store only a hash(token) in DB for safety.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash token for DB storage (SHA-256 hex).
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

const PW_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const PW_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const PW_DIGIT: &[u8] = b"0123456789";
const PW_SYMBOL: &[u8] = b"!@#$%^&*()_+-=";

/// Generate the initial password for an admin-created account. 12 chars with
/// at least one character from each class; the plaintext is only ever handed
/// to the mailer, the DB keeps the Argon2 hash.
pub fn generate_password() -> String {
    let mut rng = OsRng;
    let all: Vec<u8> = [PW_UPPER, PW_LOWER, PW_DIGIT, PW_SYMBOL].concat();

    let mut chars: Vec<u8> = vec![
        PW_UPPER[rng.gen_range(0..PW_UPPER.len())],
        PW_LOWER[rng.gen_range(0..PW_LOWER.len())],
        PW_DIGIT[rng.gen_range(0..PW_DIGIT.len())],
        PW_SYMBOL[rng.gen_range(0..PW_SYMBOL.len())],
    ];
    while chars.len() < 12 {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).expect("password charset is ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_normalize_to_lowercase_trimmed() {
        assert_eq!(normalize_email("  Jane.Doe@College.EDU "), "jane.doe@college.edu");
        assert_eq!(normalize_email("plain@example.org"), "plain@example.org");
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_hash_is_deterministic_and_tokens_are_unique() {
        let t1 = generate_access_token();
        let t2 = generate_access_token();
        assert_ne!(t1, t2);
        assert_eq!(hash_access_token(&t1), hash_access_token(&t1));
        assert_ne!(hash_access_token(&t1), hash_access_token(&t2));
    }

    #[test]
    fn generated_password_has_all_character_classes() {
        for _ in 0..20 {
            let pw = generate_password();
            assert_eq!(pw.len(), 12);
            assert!(pw.bytes().any(|b| b.is_ascii_uppercase()));
            assert!(pw.bytes().any(|b| b.is_ascii_lowercase()));
            assert!(pw.bytes().any(|b| b.is_ascii_digit()));
            assert!(pw.bytes().any(|b| !b.is_ascii_alphanumeric()));
        }
    }
}
