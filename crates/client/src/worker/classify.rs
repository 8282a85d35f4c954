//! Request classification.
//!
//! Decides which strategy handles an intercepted request, and whether a
//! request is intercepted at all.

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::strategy::Strategy;
use crate::fetch::{Request, is_http};
use cachewarden_core::Error;

/// Classification of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestClass {
    StaticAsset,
    Api,
    Other,
}

impl RequestClass {
    /// Strategy bound to this class.
    pub fn strategy(self) -> Strategy {
        match self {
            RequestClass::StaticAsset => Strategy::CacheFirst,
            RequestClass::Api => Strategy::NetworkFirst,
            RequestClass::Other => Strategy::StaleWhileRevalidate,
        }
    }
}

/// True if the caching layer handles this request. Everything else goes
/// straight to the network untouched.
pub fn is_interceptable(request: &Request) -> bool {
    request.method == Method::GET && is_http(&request.url)
}

/// URL-shape classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    static_asset: Regex,
    api_prefix: String,
}

impl Classifier {
    /// Build a classifier from bare extensions (`"css"`, `"woff2"`) and an
    /// API path prefix.
    pub fn new(static_extensions: &[String], api_prefix: &str) -> Result<Self, Error> {
        if static_extensions.is_empty() {
            return Err(Error::InvalidInput("static extensions must not be empty".into()));
        }

        let alternatives: Vec<String> = static_extensions.iter().map(|ext| regex::escape(ext)).collect();
        let pattern = format!(r"\.({})$", alternatives.join("|"));
        let static_asset =
            Regex::new(&pattern).map_err(|e| Error::InvalidInput(format!("static asset pattern: {e}")))?;

        Ok(Self { static_asset, api_prefix: api_prefix.to_string() })
    }

    /// Classify a request. First match wins: static extension, then API
    /// prefix, then everything else.
    pub fn classify(&self, request: &Request) -> RequestClass {
        let path = request.url.path();

        if self.static_asset.is_match(path) {
            RequestClass::StaticAsset
        } else if path.starts_with(&self.api_prefix) {
            RequestClass::Api
        } else {
            RequestClass::Other
        }
    }
}
