// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Generate random alphanumeric string with `len` chars.
#[must_use]
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Larger than 65535 bytes.
    TooLong,

    /// Contains U+0000.
    ContainsNull,

    /// Not well-formed UTF-8.
    InvalidUtf8,
}

/// Check string rules applied to all UTF-8 fields in packets.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8
/// as defined by the Unicode specification and restated in RFC 3629.
/// A UTF-8 Encoded String MUST NOT include an encoding of the null
/// character U+0000 [MQTT-1.5.3-2].
///
/// # Errors
///
/// Returns error if `s` is too long or contains U+0000.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > usize::from(u16::MAX) {
        return Err(StringError::TooLong);
    }
    if s.contains('\u{0000}') {
        return Err(StringError::ContainsNull);
    }
    Ok(())
}

/// Convert `bytes` into an owned string, applying the packet string rules.
///
/// # Errors
///
/// Returns error if `bytes` is not a well-formed UTF-8 string.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_err| StringError::InvalidUtf8)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// No chars at all.
    IsEmpty,
}

/// Check client id rules.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length [MQTT-3.1.3-5]. Longer ids are accepted by most brokers
/// and are forwarded as-is, with a warning.
///
/// # Errors
///
/// Returns error if `client_id` is empty.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > 23 {
        log::warn!("client id is longer than 23 bytes: {client_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string() {
        let s = random_string(8);
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(char::is_alphanumeric));
    }

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("topic/one").is_ok());
        assert_eq!(
            validate_utf8_string("nul\u{0000}char"),
            Err(StringError::ContainsNull)
        );
    }

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("roost-1").is_ok());
        assert_eq!(validate_client_id(""), Err(ClientIdError::IsEmpty));
        // Longer than 23 bytes is accepted.
        assert!(validate_client_id("a-very-long-client-identifier").is_ok());
    }
}
