//! Mapping from utterance ids to audio file paths.

use crate::error::MalformedUidError;
use crate::shard::parse_serial;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of bucket directories used by [`BucketedLayout`]
pub const BUCKET_COUNT: u64 = 256;

/// Resolves a uid to the path of its encoded audio file.
///
/// Any `Fn(&str) -> PathBuf` is a resolver.
pub trait PathResolver {
    fn resolve(&self, uid: &str) -> Result<PathBuf, MalformedUidError>;
}

impl<F> PathResolver for F
where
    F: Fn(&str) -> PathBuf,
{
    fn resolve(&self, uid: &str) -> Result<PathBuf, MalformedUidError> {
        Ok(self(uid))
    }
}

/// All files in one directory: `<root>/<uid>.<extension>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatLayout {
    pub root: PathBuf,
    pub extension: String,
}

impl FlatLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }
}

impl PathResolver for FlatLayout {
    fn resolve(&self, uid: &str) -> Result<PathBuf, MalformedUidError> {
        Ok(self.root.join(format!("{uid}.{}", self.extension)))
    }
}

/// Files spread over 256 hex-named buckets by serial:
/// `<root>/<serial % 256 as two hex digits>/<uid>.<extension>`.
///
/// `common_voice_en_482` lands in `<root>/e2/common_voice_en_482.mp3`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketedLayout {
    pub root: PathBuf,
    pub extension: String,
}

impl BucketedLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Bucket directory name for `uid`.
    pub fn bucket(uid: &str) -> Result<String, MalformedUidError> {
        Ok(format!("{:02x}", parse_serial(uid)?.residue(BUCKET_COUNT)))
    }
}

impl PathResolver for BucketedLayout {
    fn resolve(&self, uid: &str) -> Result<PathBuf, MalformedUidError> {
        let bucket = Self::bucket(uid)?;
        Ok(self
            .root
            .join(bucket)
            .join(format!("{uid}.{}", self.extension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn flat_layout_joins_uid_and_extension() {
        let layout = FlatLayout::new("/data/mp3", "mp3");

        assert_eq!(
            layout.resolve("cv_en_7").unwrap(),
            Path::new("/data/mp3/cv_en_7.mp3")
        );
    }

    #[test]
    fn bucketed_layout_uses_hex_serial_bucket() {
        let layout = BucketedLayout::new("/data/mp3", "mp3");

        assert_eq!(
            layout.resolve("common_voice_en_482").unwrap(),
            Path::new("/data/mp3/e2/common_voice_en_482.mp3")
        );
        assert_eq!(
            layout.resolve("cv_en_5").unwrap(),
            Path::new("/data/mp3/05/cv_en_5.mp3")
        );
        assert_eq!(BucketedLayout::bucket("cv_en_256").unwrap(), "00");
        assert_eq!(BucketedLayout::bucket("cv_en_255").unwrap(), "ff");
    }

    #[test]
    fn bucketed_layout_accepts_serials_wider_than_u64() {
        // 123456789012345678901234 % 256 == 0xf2
        assert_eq!(
            BucketedLayout::bucket("cv_en_123456789012345678901234").unwrap(),
            "f2"
        );
    }

    #[test]
    fn bucketed_layout_rejects_malformed_uid() {
        let layout = BucketedLayout::new("/data", "wav");

        assert!(layout.resolve("no-serial").is_err());
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |uid: &str| PathBuf::from(format!("/clips/{uid}.wav"));

        assert_eq!(
            resolver.resolve("cv_en_1").unwrap(),
            Path::new("/clips/cv_en_1.wav")
        );
    }
}
