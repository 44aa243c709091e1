//! 불투명(opaque) 식별자 생성.
//!
//! 세션 ID와 Refresh Token은 유효한 서명과 함께 세션을 사칭하는 데 필요한
//! 유일한 능력이므로 OS CSPRNG에서 생성합니다.

use rand::rngs::OsRng;
use rand::RngCore;

/// 세션 ID 바이트 수 (256 bit).
pub const SESSION_ID_BYTES: usize = 32;

/// Refresh Token 바이트 수 (512 bit).
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// 목록 노출 시 보여주는 토큰 접두사 길이.
pub const REDACTED_PREFIX_LEN: usize = 16;

/// 지정한 바이트 수의 난수를 hex 문자열로 생성.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// 새 세션 ID 생성.
pub fn generate_session_id() -> String {
    random_hex(SESSION_ID_BYTES)
}

/// 새 Refresh Token 생성.
pub fn generate_refresh_token() -> String {
    random_hex(REFRESH_TOKEN_BYTES)
}

/// 토큰을 앞부분만 남기고 가립니다.
///
/// 목록/로그에서는 항상 이 형태만 노출합니다.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(REDACTED_PREFIX_LEN).collect();
    format!("{prefix}...")
}
