//! Request classification by URL path.

use std::collections::HashSet;
use std::fmt;

use reqwest::Url;

use crate::config::RouteConfig;

/// Category of an intercepted same-origin request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// HTML shell whose content depends on the active theme.
    ThemedPage,
    /// Generated media metadata.
    JsonData,
    /// Generated artwork.
    ImageData,
    /// Anything else: scripts, styles, icons, the manifest.
    StaticAsset,
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ThemedPage => "themed page",
            Self::JsonData => "JSON data",
            Self::ImageData => "image data",
            Self::StaticAsset => "static asset",
        };
        f.write_str(name)
    }
}

/// Pure path classifier built from a [`RouteConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    themed: HashSet<String>,
    data_segment: String,
    json_extensions: Vec<String>,
    image_extensions: Vec<String>,
}

impl Classifier {
    /// Builds a classifier from route rules.
    #[must_use]
    pub fn new(routes: &RouteConfig) -> Self {
        let lower = |exts: &[String]| exts.iter().map(|e| e.to_ascii_lowercase()).collect();
        Self {
            themed: routes.themed_paths().into_iter().collect(),
            data_segment: routes.data_segment.clone(),
            json_extensions: lower(&routes.json_extensions),
            image_extensions: lower(&routes.image_extensions),
        }
    }

    /// Classifies a URL path. First match wins: themed literal, data JSON,
    /// data image, static asset.
    #[must_use]
    pub fn classify_path(&self, path: &str) -> RequestClass {
        if self.themed.contains(path) {
            return RequestClass::ThemedPage;
        }
        if self.is_data_path(path) {
            let lower = path.to_ascii_lowercase();
            if self.json_extensions.iter().any(|ext| lower.ends_with(ext)) {
                return RequestClass::JsonData;
            }
            if self.image_extensions.iter().any(|ext| lower.ends_with(ext)) {
                return RequestClass::ImageData;
            }
        }
        RequestClass::StaticAsset
    }

    /// Classifies a URL by its path; the query string is ignored.
    #[must_use]
    pub fn classify(&self, url: &Url) -> RequestClass {
        self.classify_path(url.path())
    }

    /// Returns true if the path lies under the data directory.
    #[must_use]
    pub fn is_data_path(&self, path: &str) -> bool {
        !self.data_segment.is_empty() && path.contains(&self.data_segment)
    }

    /// Themed route literals, in no particular order.
    pub fn themed_paths(&self) -> impl Iterator<Item = &str> {
        self.themed.iter().map(String::as_str)
    }
}
