//! 비밀번호 유틸리티.
//!
//! Argon2 기반 [`CredentialVerifier`] 구현과 비밀번호 정책 검증.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Serialize;
use warden_core::PasswordPolicy;

use crate::directory::{CredentialVerifier, SharedCredentialVerifier};

/// 흔히 쓰이는 약한 비밀번호 (소문자 비교).
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "123456",
    "123456789",
    "qwerty",
    "abc123",
    "password123",
    "admin",
    "letmein",
    "welcome",
    "monkey",
    "dragon",
    "master",
    "football",
    "superman",
    "trustno1",
];

/// 특수문자로 인정하는 문자.
const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// 비밀번호 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("비밀번호 해싱 실패")]
    HashingFailed,
    #[error("비밀번호 검증 실패")]
    VerificationFailed,
    #[error("잘못된 해시 형식")]
    InvalidHashFormat,
}

/// 비밀번호 해싱 (Argon2id, 솔트 자동 생성).
///
/// PHC 형식 문자열을 반환합니다.
///
/// ```rust,ignore
/// let hash = hash_secret("my_secure_password").unwrap();
/// // "$argon2id$v=19$m=19456,t=2,p=1$..."
/// ```
pub fn hash_secret(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::HashingFailed)?;

    Ok(hash.to_string())
}

/// 저장된 PHC 해시로 비밀번호 검증.
pub fn verify_secret(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// Argon2 자격 증명 검증기.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl Argon2Verifier {
    /// 공유 핸들로 생성.
    pub fn shared() -> SharedCredentialVerifier {
        Arc::new(Argon2Verifier)
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, username: &str, supplied: &str, stored_hash: &str) -> bool {
        match verify_secret(supplied, stored_hash) {
            Ok(()) => true,
            Err(PasswordError::InvalidHashFormat) => {
                tracing::warn!(username = %username, "Stored password hash is malformed");
                false
            }
            Err(_) => false,
        }
    }
}

/// 정책 검증 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordValidation {
    /// 모든 조건 충족 여부
    pub is_valid: bool,
    /// 위반 항목 메시지
    pub errors: Vec<String>,
}

/// 비밀번호 정책 검증.
///
/// 모든 위반 항목을 모아 반환합니다.
pub fn validate_password(policy: &PasswordPolicy, password: &str) -> PasswordValidation {
    let mut errors = Vec::new();

    if password.chars().count() < policy.min_length {
        errors.push(format!(
            "비밀번호는 최소 {}자 이상이어야 합니다",
            policy.min_length
        ));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("비밀번호에 대문자가 최소 1개 포함되어야 합니다".to_string());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("비밀번호에 소문자가 최소 1개 포함되어야 합니다".to_string());
    }
    if policy.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("비밀번호에 숫자가 최소 1개 포함되어야 합니다".to_string());
    }
    if policy.require_special_chars && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        errors.push("비밀번호에 특수문자가 최소 1개 포함되어야 합니다".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.push("너무 흔한 비밀번호입니다".to_string());
    }
    if has_repeated_run(password, 3) {
        errors.push("같은 문자가 3번 이상 연속됩니다".to_string());
    }

    PasswordValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// 같은 문자가 `run`번 이상 연속되는지 확인.
fn has_repeated_run(password: &str, run: usize) -> bool {
    let mut previous = None;
    let mut count = 0;
    for c in password.chars() {
        if Some(c) == previous {
            count += 1;
        } else {
            previous = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("TestPassword123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));

        let verifier = Argon2Verifier;
        assert!(verifier.verify("alice", "TestPassword123!", &hash));
        assert!(!verifier.verify("alice", "WrongPassword123!", &hash));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let first = hash_secret("Password1").unwrap();
        let second = hash_secret("Password1").unwrap();
        assert_ne!(first, second);
        assert!(verify_secret("Password1", &second).is_ok());
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(matches!(
            verify_secret("password", "not-a-valid-hash"),
            Err(PasswordError::InvalidHashFormat)
        ));
        assert!(!Argon2Verifier.verify("alice", "password", "not-a-valid-hash"));
    }

    #[test]
    fn test_policy_accepts_strong_password() {
        let result = validate_password(&PasswordPolicy::default(), "Correct-Horse-9");
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_policy_collects_all_errors() {
        let result = validate_password(&PasswordPolicy::default(), "short");
        assert!(!result.is_valid);
        // 길이, 대문자, 숫자, 특수문자
        assert_eq!(result.errors.len(), 4);
    }

    #[test]
    fn test_policy_rejects_repeated_characters() {
        let result = validate_password(&PasswordPolicy::default(), "Abcdefff-1234");
        assert_eq!(result.errors.len(), 1);
        assert!(has_repeated_run("aaa", 3));
        assert!(!has_repeated_run("aabbaa", 3));
    }

    #[test]
    fn test_policy_rejects_common_password() {
        let relaxed = PasswordPolicy {
            min_length: 1,
            require_uppercase: false,
            require_lowercase: false,
            require_numbers: false,
            require_special_chars: false,
        };
        assert!(!validate_password(&relaxed, "LetMeIn").is_valid);
        assert!(validate_password(&relaxed, "letmeinplease").is_valid);
    }

    #[test]
    fn test_unicode_password() {
        let password = "한글패스워드123";
        let hash = hash_secret(password).unwrap();
        assert!(verify_secret(password, &hash).is_ok());
    }
}
