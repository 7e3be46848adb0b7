//! Artifact identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Required suffix for every artifact id.
pub const ARTIFACT_SUFFIX: &str = ".mp3";

/// Maximum length of the id stem (the part before the suffix).
pub const MAX_STEM_LEN: usize = 64;

/// Content type served for every artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "audio/mpeg";

/// A validated artifact identifier, e.g. `dQw4w9WgXcQ.mp3`.
///
/// The stem is 1 to [`MAX_STEM_LEN`] characters from `[A-Za-z0-9_-]` and the
/// suffix is exactly [`ARTIFACT_SUFFIX`]. Anything that could name a path
/// outside a flat directory (separators, `..`, leading dots, NUL) fails the
/// allow-list before it ever reaches the filesystem.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Parse and validate an artifact id.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let stem = raw.strip_suffix(ARTIFACT_SUFFIX).ok_or_else(|| {
            crate::Error::InvalidArtifactId(format!("must end with {ARTIFACT_SUFFIX}"))
        })?;

        if stem.is_empty() {
            return Err(crate::Error::InvalidArtifactId(
                "stem cannot be empty".to_string(),
            ));
        }

        if stem.len() > MAX_STEM_LEN {
            return Err(crate::Error::InvalidArtifactId(format!(
                "stem must be at most {MAX_STEM_LEN} chars, got {}",
                stem.len()
            )));
        }

        if let Some(c) = stem
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-'))
        {
            return Err(crate::Error::InvalidArtifactId(format!(
                "invalid character in id: {:?}",
                c
            )));
        }

        Ok(Self(raw.to_string()))
    }

    /// Cheap allow-list check without constructing an id.
    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    /// The id as stored on disk and used in URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its suffix.
    pub fn stem(&self) -> &str {
        &self.0[..self.0.len() - ARTIFACT_SUFFIX.len()]
    }
}

impl FromStr for ArtifactId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.0
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactId({})", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ids() {
        for raw in ["dQw4w9WgXcQ.mp3", "a.mp3", "under_score-dash.mp3", "0123.mp3"] {
            let id = ArtifactId::parse(raw).unwrap();
            assert_eq!(id.as_str(), raw);
        }
        assert_eq!(ArtifactId::parse("abc.mp3").unwrap().stem(), "abc");
    }

    #[test]
    fn test_parse_rejects_traversal() {
        for raw in [
            "../secret.mp3",
            "..%2Fsecret.mp3",
            "/etc/passwd.mp3",
            "a/b.mp3",
            "a\\b.mp3",
            "..mp3",
            "...mp3",
            ".hidden.mp3",
        ] {
            assert!(ArtifactId::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_parse_rejects_wrong_suffix() {
        assert!(ArtifactId::parse("song").is_err());
        assert!(ArtifactId::parse("song.MP3").is_err());
        assert!(ArtifactId::parse("song.mp3.tmp").is_err());
        assert!(ArtifactId::parse("song.mp3.mp3").is_err());
        assert!(ArtifactId::parse(".mp3").is_err());
    }

    #[test]
    fn test_parse_rejects_long_stem() {
        let ok = format!("{}.mp3", "a".repeat(MAX_STEM_LEN));
        let too_long = format!("{}.mp3", "a".repeat(MAX_STEM_LEN + 1));
        assert!(ArtifactId::parse(&ok).is_ok());
        assert!(ArtifactId::parse(&too_long).is_err());
    }

    #[test]
    fn test_parse_non_ascii_does_not_panic() {
        let result = ArtifactId::parse("caf\u{00e9}.mp3");
        assert!(result.is_err());
        assert!(!ArtifactId::is_valid("\u{0000}.mp3"));
    }

    #[test]
    fn test_serde_validates() {
        let id: ArtifactId = serde_json::from_str("\"abc.mp3\"").unwrap();
        assert_eq!(id.as_str(), "abc.mp3");
        assert!(serde_json::from_str::<ArtifactId>("\"../abc.mp3\"").is_err());
    }
}
