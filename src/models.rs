//! Request and response types shared by both services

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("invalid {field} '{value}', expected one of: {expected}")]
    UnknownVariant {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("invalid {field} '{value}', expected YYYYMMDD or YYYYMMDDHH")]
    BadTimestamp { field: &'static str, value: String },

    #[error("project '{0}' must be a bare domain such as en.wikipedia.org")]
    BadProject(String),

    #[error("{field} '{value}' is not a usable path segment")]
    DotSegment { field: &'static str, value: String },

    #[error("start {start} is after end {end}")]
    InvertedRange { start: String, end: String },
}

/// Declares a closed set of upstream path values with its wire names.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ValidationError::UnknownVariant {
                        field: $field,
                        value: other.to_string(),
                        expected: Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", "),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// How the page was reached. `AllAccess` aggregates the other three.
    Access, "access" {
        AllAccess => "all-access",
        MobileApp => "mobile-app",
        MobileWeb => "mobile-web",
        Desktop => "desktop",
    }
);

wire_enum!(
    /// Who requested the page. `AllAgents` aggregates the other three.
    Agent, "agent" {
        AllAgents => "all-agents",
        User => "user",
        Automated => "automated",
        Spider => "spider",
    }
);

wire_enum!(
    Granularity, "granularity" {
        Daily => "daily",
        Monthly => "monthly",
    }
);

/// Turn a human title into the form the pageview API and the store key on.
///
/// Surrounding whitespace is dropped and interior spaces become underscores.
/// Other reserved characters (`%`, `/`, `?`) pass through unchanged.
pub fn normalize_article(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// A validated per-article pageview lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageviewQuery {
    pub project: String,
    pub access: Access,
    pub agent: Agent,
    pub article: String,
    pub granularity: Granularity,
    pub start: String,
    pub end: String,
}

/// Raw path segments of `GET /page_views/...`, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct PageviewPath {
    pub project: String,
    pub access: String,
    pub agent: String,
    pub article: String,
    pub granularity: String,
    pub start: String,
    pub end: String,
}

impl TryFrom<PageviewPath> for PageviewQuery {
    type Error = ValidationError;

    fn try_from(path: PageviewPath) -> Result<Self, Self::Error> {
        let project = path.project.trim();
        if project.is_empty() {
            return Err(ValidationError::Empty { field: "project" });
        }
        if project.contains('/') {
            return Err(ValidationError::BadProject(project.to_string()));
        }
        reject_dot_segment("project", project)?;

        let article = normalize_article(&path.article);
        if article.is_empty() {
            return Err(ValidationError::Empty { field: "article" });
        }
        reject_dot_segment("article", &article)?;

        let start_at = parse_timestamp("start", &path.start)?;
        let end_at = parse_timestamp("end", &path.end)?;
        if start_at > end_at {
            return Err(ValidationError::InvertedRange {
                start: path.start,
                end: path.end,
            });
        }

        Ok(PageviewQuery {
            project: project.to_string(),
            access: path.access.parse()?,
            agent: path.agent.parse()?,
            article,
            granularity: path.granularity.parse()?,
            start: path.start,
            end: path.end,
        })
    }
}

impl PageviewQuery {
    /// Path segments below the REST root, in the order the per-article endpoint expects.
    ///
    /// Segments are unencoded; the URL builder percent-encodes each one.
    pub fn upstream_segments(&self) -> [&str; 10] {
        [
            "metrics",
            "pageviews",
            "per-article",
            self.project.as_str(),
            self.access.as_str(),
            self.agent.as_str(),
            self.article.as_str(),
            self.granularity.as_str(),
            self.start.as_str(),
            self.end.as_str(),
        ]
    }
}

/// URL builders collapse `.` and `..`, which would drop the segment upstream.
fn reject_dot_segment(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value == "." || value == ".." {
        return Err(ValidationError::DotSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Parse `YYYYMMDD` or `YYYYMMDDHH`; a bare date means hour 00.
fn parse_timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime, ValidationError> {
    let bad = || ValidationError::BadTimestamp {
        field,
        value: value.to_string(),
    };

    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let (date, hour) = match value.len() {
        8 => (value, 0),
        10 => (&value[..8], value[8..].parse::<u32>().map_err(|_| bad())?),
        _ => return Err(bad()),
    };

    NaiveDate::parse_from_str(date, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or_else(bad)
}

/// Body of `POST /add_article` on both services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRegistration {
    pub article: String,
}

impl ArticleRegistration {
    /// Normalized copy, rejecting names that are blank after trimming.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let article = normalize_article(&self.article);
        if article.is_empty() {
            return Err(ValidationError::Empty { field: "article" });
        }
        Ok(Self { article })
    }
}

/// The parts of an upstream per-article response used for log summaries.
///
/// The proxy relays upstream JSON untouched; each item also carries
/// project, article, granularity, access and agent, which serde skips here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageviewsResponse {
    pub items: Vec<PageviewPoint>,
}

impl PageviewsResponse {
    pub fn total_views(&self) -> u64 {
        self.items.iter().map(|item| item.views).sum()
    }

    /// First and last upstream timestamps, `YYYYMMDDHH`
    pub fn span(&self) -> Option<(&str, &str)> {
        let first = self.items.first()?;
        let last = self.items.last()?;
        Some((first.timestamp.as_str(), last.timestamp.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageviewPoint {
    pub timestamp: String,
    pub views: u64,
}
