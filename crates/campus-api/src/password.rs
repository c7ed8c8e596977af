use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Argon2id hashing with a fixed parameter set.
///
/// Verification always runs a full Argon2 computation, against a dummy hash
/// when there is no candidate account, so response timing does not reveal
/// whether an identifier exists.
pub struct Passwords {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Passwords {
    pub fn new(params: Params) -> Result<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"campus-dummy-password", &salt)
            .map_err(|e| anyhow!("Failed to hash dummy password: {}", e))?
            .to_string();
        Ok(Self { argon2, dummy_hash })
    }

    /// Library-default Argon2id parameters.
    pub fn standard() -> Result<Self> {
        Self::new(Params::default())
    }

    pub fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    /// Constant-time check of `plain` against a stored PHC string.
    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, plain: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self.argon2.verify_password(plain.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Burn the same work as a real verification when there is nothing to verify.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Passwords {
        Passwords::new(Params::new(1024, 1, 1, None).unwrap()).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let pw = fast();
        let hash = pw.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(pw.verify("correct horse", &hash));
        assert!(!pw.verify("wrong horse", &hash));
    }

    #[test]
    fn salts_differ_per_hash() {
        let pw = fast();
        assert_ne!(pw.hash("same").unwrap(), pw.hash("same").unwrap());
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        let pw = fast();
        assert!(!pw.verify("anything", "not-a-phc-string"));
        pw.verify_dummy("anything");
    }
}
