//! Catalog identity: course keys, course-run keys, product tags and loader kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Course key in `{org}+{number}` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseKey {
    org: String,
    number: String,
}

impl CourseKey {
    pub fn new(org: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            number: number.into(),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    /// Build the run key for a run value on this course
    pub fn run_key(&self, run: &str) -> CourseRunKey {
        CourseRunKey {
            org: self.org.clone(),
            number: self.number.clone(),
            run: run.to_string(),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.org, self.number)
    }
}

impl FromStr for CourseKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (org, number) = s
            .split_once('+')
            .ok_or_else(|| KeyParseError::InvalidCourseKey(s.to_string()))?;
        if org.is_empty() || number.is_empty() || number.contains('+') {
            return Err(KeyParseError::InvalidCourseKey(s.to_string()));
        }
        Ok(Self::new(org, number))
    }
}

impl TryFrom<String> for CourseKey {
    type Error = KeyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CourseKey> for String {
    fn from(key: CourseKey) -> Self {
        key.to_string()
    }
}

/// Course-run key in `course-v1:{org}+{number}+{run}` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CourseRunKey {
    org: String,
    number: String,
    run: String,
}

impl CourseRunKey {
    pub const PREFIX: &'static str = "course-v1:";

    pub fn course_key(&self) -> CourseKey {
        CourseKey::new(self.org.clone(), self.number.clone())
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Run value derived from a start date: `{ceil(month/4)}T{year}`
    pub fn run_value_for(year: i32, month: u32) -> String {
        let term = month.div_ceil(4).max(1);
        format!("{}T{}", term, year)
    }
}

impl fmt::Display for CourseRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}+{}+{}", Self::PREFIX, self.org, self.number, self.run)
    }
}

impl FromStr for CourseRunKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| KeyParseError::InvalidRunKey(s.to_string()))?;
        let parts: Vec<&str> = body.split('+').collect();
        match parts.as_slice() {
            [org, number, run] if !org.is_empty() && !number.is_empty() && !run.is_empty() => {
                Ok(Self {
                    org: org.to_string(),
                    number: number.to_string(),
                    run: run.to_string(),
                })
            }
            _ => Err(KeyParseError::InvalidRunKey(s.to_string())),
        }
    }
}

/// Lowercase ascii slug: alphanumerics kept, every other run collapsed to `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut dash = false;
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Whether `slug` is a usable url slug: `/`-separated segments of lowercase
/// ascii letters, digits, `-` and `_`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        })
}

/// Errors when parsing keys
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("invalid course key '{0}': expected {{org}}+{{number}}")]
    InvalidCourseKey(String),

    #[error("invalid course run key '{0}': expected course-v1:{{org}}+{{number}}+{{run}}")]
    InvalidRunKey(String),
}

/// Product a row refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Course,
    Program,
    Degree,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Course => "course",
            ProductKind::Program => "program",
            ProductKind::Degree => "degree",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "course" => Ok(ProductKind::Course),
            "program" => Ok(ProductKind::Program),
            "degree" => Ok(ProductKind::Degree),
            _ => Err(format!("Unknown product type: {}", s)),
        }
    }
}

/// The loaders the engine ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LoaderKind {
    /// Course and course-run CSV loader
    Course,
    /// Degree loader
    Degree,
    /// Course editor loader
    Editor,
    /// Geolocation loader
    Geolocation,
    /// Geotargeting (location restriction) loader
    Geotargeting,
    /// Product value loader
    ProductValue,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Course => "course",
            LoaderKind::Degree => "degree",
            LoaderKind::Editor => "editor",
            LoaderKind::Geolocation => "geolocation",
            LoaderKind::Geotargeting => "geotargeting",
            LoaderKind::ProductValue => "product-value",
        }
    }

    pub fn all() -> &'static [LoaderKind] {
        &[
            LoaderKind::Course,
            LoaderKind::Degree,
            LoaderKind::Editor,
            LoaderKind::Geolocation,
            LoaderKind::Geotargeting,
            LoaderKind::ProductValue,
        ]
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a single ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RUN-{}", self.0)
    }
}
