//! Access credentials.
//!
//! An [`AuthToken`] is issued by plex.tv at the end of the pairing flow and
//! grants access to the account. Each server in the directory comes with its
//! own token for talking to that server.
//!
//! The account token is kept in a small TOML secrets file:
//!
//! ```toml
//! token = "..."
//! ```
//!
//! Keep this file private: anyone holding the token has full access to the
//! Plex account.

use std::{fmt, fs, io, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::error::{Error, Result};

/// A Plex access token.
///
/// Its `Debug` output is redacted so that it does not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, Serialize, Redact)]
#[redact(all)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Secrets files are tiny; anything bigger than this is not ours.
    const MAX_FILE_SIZE: u64 = 4096;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the token from a TOML secrets file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is too large, is not valid
    /// TOML, or holds no valid token.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: secrets file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let secrets = toml::from_str::<Secrets>(&contents)?;
        secrets.token.as_str().parse()
    }

    /// Writes the token to a TOML secrets file, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string(&Secrets {
            token: self.0.clone(),
        })?;
        fs::write(path, contents).map_err(Into::into)
    }

    /// Removes the secrets file. A file that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub fn remove_file<P: AsRef<Path>>(path: P) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl FromStr for AuthToken {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument("token is empty"));
        }

        // Tokens travel in query strings and headers.
        if let Some(chr) = token
            .chars()
            .find(|chr| !chr.is_ascii_graphic() || matches!(chr, '&' | '#' | '?' | '/'))
        {
            return Err(Error::invalid_argument(format!(
                "token contains invalid character {chr:?}"
            )));
        }

        Ok(Self(token.to_owned()))
    }
}

/// Shows the token itself, for building URLs. Use `Debug` for logging.
impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Serialize)]
struct Secrets {
    token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rejects_empty_and_malformed_tokens() {
        assert!("".parse::<AuthToken>().is_err());
        assert!("   ".parse::<AuthToken>().is_err());
        assert!("abc def".parse::<AuthToken>().is_err());
        assert!("abc&X-Plex-Token=x".parse::<AuthToken>().is_err());
        assert_eq!(
            " Zx9-_token ".parse::<AuthToken>().unwrap().as_str(),
            "Zx9-_token"
        );
    }

    #[test]
    fn debug_is_redacted() {
        let token: AuthToken = "supersecret".parse().unwrap();
        assert!(!format!("{token:?}").contains("supersecret"));
        assert_eq!(token.to_string(), "supersecret");
    }

    #[test]
    fn file_round_trip_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");

        let token: AuthToken = "abc123".parse().unwrap();
        token.to_file(&path).unwrap();
        assert_eq!(AuthToken::from_file(&path).unwrap(), token);

        AuthToken::remove_file(&path).unwrap();
        let err = AuthToken::from_file(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        // Removing twice is fine.
        AuthToken::remove_file(&path).unwrap();
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "x".repeat(8192)).unwrap();

        let err = AuthToken::from_file(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
