// Image Map Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping from symbolic image tag to a local image file (".sif")
///
/// Built once when the runner is configured and never mutated afterwards.
/// Ordered by tag so listings are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageMap(BTreeMap<String, PathBuf>);

impl ImageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image (builder style)
    pub fn with_image(mut self, tag: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.0.insert(tag.into(), path.into());
        self
    }

    pub fn get(&self, tag: &str) -> Option<&Path> {
        self.0.get(tag).map(PathBuf::as_path)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.0.iter().map(|(tag, path)| (tag.as_str(), path.as_path()))
    }
}

impl<T, P> FromIterator<(T, P)> for ImageMap
where
    T: Into<String>,
    P: Into<PathBuf>,
{
    fn from_iter<I: IntoIterator<Item = (T, P)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(tag, path)| (tag.into(), path.into()))
                .collect(),
        )
    }
}
