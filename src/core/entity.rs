//! Status and classification enums shared by catalog entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Course-run review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CourseRunStatus {
    #[default]
    Unpublished,
    #[serde(rename = "review_by_legal")]
    LegalReview,
    #[serde(rename = "review_by_internal")]
    InternalReview,
    Reviewed,
    Published,
}

impl CourseRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseRunStatus::Unpublished => "unpublished",
            CourseRunStatus::LegalReview => "review_by_legal",
            CourseRunStatus::InternalReview => "review_by_internal",
            CourseRunStatus::Reviewed => "reviewed",
            CourseRunStatus::Published => "published",
        }
    }

    /// True while legal or internal review is pending
    pub fn in_review(&self) -> bool {
        matches!(
            self,
            CourseRunStatus::LegalReview | CourseRunStatus::InternalReview
        )
    }
}

impl fmt::Display for CourseRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpublished" => Ok(CourseRunStatus::Unpublished),
            "review_by_legal" | "legal_review" => Ok(CourseRunStatus::LegalReview),
            "review_by_internal" | "internal_review" => Ok(CourseRunStatus::InternalReview),
            "reviewed" => Ok(CourseRunStatus::Reviewed),
            "published" => Ok(CourseRunStatus::Published),
            _ => Err(format!("Unknown course run status: {}", s)),
        }
    }
}

/// Course-run pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    InstructorPaced,
    SelfPaced,
}

impl Pacing {
    /// Map a spreadsheet pacing token; unknown tokens map to `None`
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "instructor-paced" => Some(Pacing::InstructorPaced),
            "self-paced" => Some(Pacing::SelfPaced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pacing::InstructorPaced => "instructor_paced",
            Pacing::SelfPaced => "self_paced",
        }
    }
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instructor_paced" => Ok(Pacing::InstructorPaced),
            "self_paced" => Ok(Pacing::SelfPaced),
            other => Pacing::from_token(other).ok_or_else(|| format!("Unknown pacing: {}", s)),
        }
    }
}

/// Status of an externally sourced product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Published,
    Archived,
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductStatus::Published => write!(f, "published"),
            ProductStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "published" => Ok(ProductStatus::Published),
            "archived" => Ok(ProductStatus::Archived),
            _ => Err(format!("Unknown product status: {}", s)),
        }
    }
}

/// Kind of a location restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionType {
    Allowlist,
    Blocklist,
}

impl RestrictionType {
    /// `include` maps to an allowlist, anything else to a blocklist
    pub fn from_include_exclude(value: &str) -> Self {
        if value.eq_ignore_ascii_case("include") {
            RestrictionType::Allowlist
        } else {
            RestrictionType::Blocklist
        }
    }
}

impl fmt::Display for RestrictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictionType::Allowlist => write!(f, "allowlist"),
            RestrictionType::Blocklist => write!(f, "blocklist"),
        }
    }
}

impl FromStr for RestrictionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allowlist" => Ok(RestrictionType::Allowlist),
            "blocklist" => Ok(RestrictionType::Blocklist),
            _ => Err(format!("Unknown restriction type: {}", s)),
        }
    }
}

/// Program publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    #[default]
    Unpublished,
    Active,
    Retired,
    Deleted,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramStatus::Unpublished => write!(f, "unpublished"),
            ProgramStatus::Active => write!(f, "active"),
            ProgramStatus::Retired => write!(f, "retired"),
            ProgramStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for ProgramStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpublished" => Ok(ProgramStatus::Unpublished),
            "active" => Ok(ProgramStatus::Active),
            "retired" => Ok(ProgramStatus::Retired),
            "deleted" => Ok(ProgramStatus::Deleted),
            _ => Err(format!("Unknown program status: {}", s)),
        }
    }
}

/// Course-run restriction slugs
pub mod run_restriction {
    pub const CUSTOM_B2B_ENTERPRISE: &str = "custom-b2b-enterprise";
    pub const CUSTOM_B2C: &str = "custom-b2c";

    pub fn is_valid(value: &str) -> bool {
        value == CUSTOM_B2B_ENTERPRISE || value == CUSTOM_B2C
    }
}

/// Course-type slugs the loaders special-case
pub mod course_type {
    pub const AUDIT: &str = "audit";
    pub const VERIFIED_AUDIT: &str = "verified-audit";
    pub const MASTERS: &str = "masters";
    pub const EXECUTIVE_EDUCATION_2U: &str = "executive-education-2u";
    pub const BOOTCAMP_2U: &str = "bootcamp-2u";

    /// Externally sourced course types carry additional metadata
    pub fn is_external(slug: &str) -> bool {
        slug == EXECUTIVE_EDUCATION_2U || slug == BOOTCAMP_2U
    }
}
