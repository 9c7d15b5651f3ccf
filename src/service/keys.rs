use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("key must be 32 bytes, got {0}")]
    Length(usize),
}

/// Base64 encoded X25519 key pair, as wg-quick expects it.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        let private = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&private);

        Self {
            private_key: STANDARD.encode(private.to_bytes()),
            public_key: STANDARD.encode(public.as_bytes()),
        }
    }
}

pub fn decode_key(key: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = STANDARD.decode(key.trim())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::Length(len))
}

pub fn public_from_private(private_key: &str) -> Result<String, KeyError> {
    let private = StaticSecret::from(decode_key(private_key)?);
    Ok(STANDARD.encode(PublicKey::from(&private).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_wg_shaped() {
        let keys = KeyPair::generate();

        assert_eq!(keys.private_key.len(), 44);
        assert_eq!(keys.public_key.len(), 44);
        assert!(decode_key(&keys.private_key).is_ok());
        assert_eq!(
            public_from_private(&keys.private_key).unwrap(),
            keys.public_key
        );
    }

    #[test]
    fn generated_keys_are_fresh() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.private_key, b.private_key);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn debug_hides_private_key() {
        let keys = KeyPair::generate();
        assert!(!format!("{keys:?}").contains(&keys.private_key));
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(matches!(decode_key("not base64!"), Err(KeyError::Encoding(_))));
        assert!(matches!(
            decode_key(&STANDARD.encode([0u8; 16])),
            Err(KeyError::Length(16))
        ));
    }

    #[test]
    fn derives_known_public_key() {
        // RFC 7748 section 6.1, Alice
        let private = STANDARD.encode([
            0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2,
            0x66, 0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5,
            0x1d, 0xb9, 0x2c, 0x2a,
        ]);
        let public = STANDARD.encode([
            0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e,
            0xf7, 0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e,
            0xaa, 0x9b, 0x4e, 0x6a,
        ]);

        assert_eq!(public_from_private(&private).unwrap(), public);
    }
}
