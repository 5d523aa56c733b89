//! Memcached ASCII protocol command types

use crate::ProtocolError;
use std::borrow::Cow;

/// Maximum key length accepted by memcached
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest data block accepted or read back (memcached's default item size)
pub const MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Parsed inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// get <key>* / gets <key>*
    Get {
        keys: Vec<Cow<'a, [u8]>>,
        with_cas: bool,
    },

    /// set <key> <flags> <exptime> <bytes> [noreply]
    Set {
        key: Cow<'a, [u8]>,
        exptime: u64,
        data: Cow<'a, [u8]>,
        noreply: bool,
    },

    /// delete <key> [time] [noreply]
    Delete { key: Cow<'a, [u8]>, noreply: bool },

    /// version
    Version,

    /// quit
    Quit,
}

impl Command<'_> {
    /// Returns true if this command should not send a response
    pub fn is_noreply(&self) -> bool {
        match self {
            Command::Set { noreply, .. } | Command::Delete { noreply, .. } => *noreply,
            _ => false,
        }
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // No control characters or whitespace, otherwise the command line splits
    key.iter().all(|&b| b > 32 && b < 127)
}

/// Validate a key, reporting which rule it broke
pub fn check_key(key: &[u8]) -> Result<(), ProtocolError> {
    if is_valid_key(key) {
        Ok(())
    } else if key.len() > MAX_KEY_LENGTH {
        Err(ProtocolError::KeyTooLong)
    } else {
        Err(ProtocolError::InvalidKey(
            String::from_utf8_lossy(key).into_owned(),
        ))
    }
}
