//! Utterance manifest loading.

use crate::error::ManifestError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Ordered list of utterance ids read from a manifest.
///
/// The manifest is plain UTF-8 text with one uid per line. Blank lines are
/// skipped; duplicates and manifest order are kept as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtteranceIndex {
    uids: Vec<String>,
}

impl UtteranceIndex {
    /// Load the index from a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Open`] if the file cannot be opened and
    /// [`ManifestError::Read`] if a line cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();

        tracing::debug!(path = ?path.display(), "loading manifest");

        let file = File::open(path).map_err(|source| ManifestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let index = Self::from_reader(BufReader::new(file), path)?;

        tracing::info!(path = ?path.display(), uids = index.len(), "manifest loaded");

        Ok(index)
    }

    /// Read the index from any buffered reader. `origin` is only used in errors.
    pub fn from_reader<R: BufRead>(
        reader: R,
        origin: impl Into<PathBuf>,
    ) -> Result<Self, ManifestError> {
        let origin = origin.into();
        let mut uids = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ManifestError::Read {
                path: origin.clone(),
                line: i + 1,
                source,
            })?;

            let uid = line.trim();
            if !uid.is_empty() {
                uids.push(uid.to_owned());
            }
        }

        Ok(Self { uids })
    }

    /// Build an index from uids already in memory. Blank entries are skipped.
    pub fn from_uids<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let uids = uids
            .into_iter()
            .filter_map(|uid| {
                let uid = uid.as_ref().trim();
                (!uid.is_empty()).then(|| uid.to_owned())
            })
            .collect();

        Self { uids }
    }

    pub fn uids(&self) -> &[String] {
        &self.uids
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.uids.iter()
    }
}

impl<'a> IntoIterator for &'a UtteranceIndex {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.uids.iter()
    }
}
