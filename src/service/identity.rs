use std::{fmt, str::FromStr};

use thiserror::Error;

const MIN_LEN: usize = 2;
const MAX_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name may only contain lowercase latin letters, digits, '-' and '_'")]
    Charset,
    #[error("name must be 2 to 20 characters long, got {0}")]
    Length(usize),
}

/// Name of a client config. Doubles as the file name of its record on the
/// server, so the charset is kept path and shell safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientName(String);

impl ClientName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClientName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ValidationError::Charset);
        }
        // ascii only at this point, so bytes == chars
        if !(MIN_LEN..=MAX_LEN).contains(&s.len()) {
            return Err(ValidationError::Length(s.len()));
        }

        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for name in ["ab", "phone", "laptop-2", "my_tablet", "a1-b2_c3", "01234567890123456789"] {
            assert_eq!(name.parse::<ClientName>().unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!("".parse::<ClientName>(), Err(ValidationError::Length(0)));
        assert_eq!("a".parse::<ClientName>(), Err(ValidationError::Length(1)));
        assert_eq!(
            "a".repeat(21).parse::<ClientName>(),
            Err(ValidationError::Length(21))
        );
    }

    #[test]
    fn rejects_bad_characters() {
        for name in ["Phone", "PHONE", "телефон", "café", "my phone", "a.b", "a/b", "a;b", "ab'"] {
            assert_eq!(name.parse::<ClientName>(), Err(ValidationError::Charset), "{name}");
        }
    }
}
