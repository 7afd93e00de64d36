//! Local validation of user-supplied names
//!
//! Usernames, call targets and room display names must be non-empty and
//! strictly alphanumeric. A rejected value never reaches the gateway.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ClientError, ClientResult};

static ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

const NOT_ALPHANUMERIC: &str = "Input is not alphanumeric";

fn validate(value: &str, empty_message: &str) -> ClientResult<()> {
    if value.is_empty() {
        return Err(ClientError::invalid_username(empty_message));
    }
    if !ALPHANUMERIC.is_match(value) {
        return Err(ClientError::invalid_username(NOT_ALPHANUMERIC));
    }
    Ok(())
}

/// Name to register with the call plugin
pub fn validate_username(username: &str) -> ClientResult<()> {
    validate(username, "Insert a username to register (e.g., pippo)")
}

/// Name of the peer to call
pub fn validate_peer(peer: &str) -> ClientResult<()> {
    validate(peer, "Insert a username to call (e.g., pluto)")
}

/// Display name used when joining a room
pub fn validate_display_name(display: &str) -> ClientResult<()> {
    validate(display, "Insert your display name (e.g., pippo)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            validate_username("").unwrap_err().to_string(),
            "Insert a username to register (e.g., pippo)"
        );
        assert_eq!(validate_peer("").unwrap_err().to_string(), "Insert a username to call (e.g., pluto)");
        assert_eq!(validate_display_name("bob smith").unwrap_err().to_string(), "Input is not alphanumeric");
        assert!(validate_username("alice42").is_ok());
    }

    #[test]
    fn test_non_ascii_letters_are_rejected() {
        assert!(validate_username("jürgen").is_err());
        assert!(validate_username("a_b").is_err());
        assert!(validate_username("alice\n").is_err());
    }

    proptest! {
        #[test]
        fn prop_alphanumeric_accepted(name in "[A-Za-z0-9]{1,32}") {
            prop_assert!(validate_username(&name).is_ok());
        }

        #[test]
        fn prop_anything_else_rejected(name in ".*") {
            let expected = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric());
            prop_assert_eq!(validate_username(&name).is_ok(), expected);
        }
    }
}
