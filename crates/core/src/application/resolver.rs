// Image Resolver

use std::path::Path;

use crate::domain::ImageMap;
use crate::error::{Result, RunnerError};

/// Resolves symbolic image tags against a configured image map
pub struct ImageResolver<'a> {
    images: &'a ImageMap,
}

impl<'a> ImageResolver<'a> {
    pub fn new(images: &'a ImageMap) -> Self {
        Self { images }
    }

    /// Look up the local image file for `tag`
    ///
    /// # Errors
    /// - RunnerError::UnknownImage if the tag is not configured
    pub fn resolve(&self, tag: &str) -> Result<&'a Path> {
        self.images.get(tag).ok_or_else(|| RunnerError::UnknownImage {
            tag: tag.to_string(),
        })
    }
}
