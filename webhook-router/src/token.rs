//! Route token generation and comparison.
//!
//! A token is a short lookup prefix (`token_id`) followed by a high-entropy
//! suffix. The registry indexes on the prefix and then compares the full
//! token in constant time, so lookup timing leaks nothing about the suffix.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Length of the indexed token prefix.
pub const TOKEN_ID_LENGTH: usize = 10;

/// Length of the secret part after the prefix.
pub const TOKEN_SECRET_LENGTH: usize = 43;

/// A freshly generated token together with its lookup prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub token_id: String,
}

/// Generate a new token from the OS random source.
pub fn generate_token() -> TokenPair {
    let token: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LENGTH + TOKEN_SECRET_LENGTH)
        .map(char::from)
        .collect();

    TokenPair {
        token_id: token[..TOKEN_ID_LENGTH].to_string(),
        token,
    }
}

/// Lookup prefix of a presented token, `None` when it is too short to be one.
pub fn token_id(token: &str) -> Option<&str> {
    token.get(..TOKEN_ID_LENGTH)
}

/// Whether a presented token only uses characters that survive a URL path
/// segment unescaped.
pub fn is_url_safe(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
