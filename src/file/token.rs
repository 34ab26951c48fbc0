//! Share token generation.
//!
//! Tokens are the only public handle on a stored file, so they are drawn from
//! the thread-local CSPRNG and carry no sequential structure.

use rand::Rng;

/// Length of newly generated tokens.
pub const TOKEN_LENGTH: usize = 12;

/// Longest token accepted on lookup.
pub const MAX_TOKEN_LENGTH: usize = 64;

const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a new URL-safe share token (62^12 possible values).
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..TOKEN_CHARS.len());
            TOKEN_CHARS[idx] as char
        })
        .collect()
}

/// Check whether a string could be a token issued by this service.
///
/// Lookups with anything else are answered as not found without touching
/// the catalog.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LENGTH
        && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
