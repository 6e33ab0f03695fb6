//! Domain Classifier - hostname to traffic category
//!
//! An ordered rule table; the first matching rule wins. Pure and
//! deterministic, so callers may classify the same domain as often as they like.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic category shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Analytics")]
    Analytics,
    #[serde(rename = "Advertising")]
    Advertising,
    #[serde(rename = "Video Content")]
    VideoContent,
    #[serde(rename = "Image Content")]
    ImageContent,
    #[serde(rename = "CDN")]
    Cdn,
    #[serde(rename = "Google API")]
    GoogleApi,
    #[serde(rename = "Google Service")]
    GoogleService,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Self::Analytics => "Analytics",
            Self::Advertising => "Advertising",
            Self::VideoContent => "Video Content",
            Self::ImageContent => "Image Content",
            Self::Cdn => "CDN",
            Self::GoogleApi => "Google API",
            Self::GoogleService => "Google Service",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

static TRACKER_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r"(analytics|pixel|track|collect|doubleclick|ads|adservice|googlesyndication|googletagmanager|facebook|google-analytics)",
    )
    .case_insensitive(true)
    .build()
    .expect("tracker pattern compiles")
});

static ANALYTICS_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"analytics|googletagmanager")
        .case_insensitive(true)
        .build()
        .expect("analytics pattern compiles")
});

/// Suffix rules evaluated after the tracker check, in order
static SUFFIX_RULES: Lazy<Vec<(Regex, Category)>> = Lazy::new(|| {
    [
        (r"\.googlevideo\.com$", Category::VideoContent),
        (r"\.ytimg\.com$|\.ggpht\.com$", Category::ImageContent),
        (r"\.gstatic\.com$|\.cloudfront\.net$|\.akamaized\.net$", Category::Cdn),
        (r"\.googleapis\.com$", Category::GoogleApi),
    ]
    .into_iter()
    .map(|(pattern, category)| (Regex::new(pattern).expect("suffix pattern compiles"), category))
    .collect()
});

/// Substring that marks a generic platform service
const PLATFORM_MARKER: &str = "google";

/// Classify a hostname. Empty input is `Other`.
pub fn classify(domain: &str) -> Category {
    if domain.is_empty() {
        return Category::Other;
    }

    if TRACKER_RE.is_match(domain) {
        if ANALYTICS_RE.is_match(domain) {
            return Category::Analytics;
        }
        return Category::Advertising;
    }

    if let Some((_, category)) = SUFFIX_RULES.iter().find(|(re, _)| re.is_match(domain)) {
        return *category;
    }

    if domain.contains(PLATFORM_MARKER) {
        return Category::GoogleService;
    }

    Category::Other
}

/// Whether the domain hits the tracker/advertiser pattern at all
pub fn is_known_tracker(domain: &str) -> bool {
    !domain.is_empty() && TRACKER_RE.is_match(domain)
}
