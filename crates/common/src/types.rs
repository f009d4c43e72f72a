//! Core types for Refshot

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status of a test result or an aggregated suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Idle,
    Queued,
    Running,
    Success,
    Fail,
    Error,
    Skipped,
    Updated,
}

impl Default for TestStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl TestStatus {
    /// Weight used when folding statuses into a suite status; higher wins.
    ///
    /// In-flight states dominate, then ERROR > FAIL > UPDATED > SUCCESS >
    /// SKIPPED > IDLE.
    pub fn precedence(self) -> u8 {
        match self {
            TestStatus::Idle => 0,
            TestStatus::Skipped => 1,
            TestStatus::Success => 2,
            TestStatus::Updated => 3,
            TestStatus::Fail => 4,
            TestStatus::Error => 5,
            TestStatus::Queued => 6,
            TestStatus::Running => 7,
        }
    }

    /// Worst-case status of a set of statuses, IDLE when empty
    pub fn aggregate<I: IntoIterator<Item = TestStatus>>(statuses: I) -> TestStatus {
        statuses
            .into_iter()
            .max_by_key(|s| s.precedence())
            .unwrap_or_default()
    }

    pub fn is_failed(self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Idle => write!(f, "idle"),
            TestStatus::Queued => write!(f, "queued"),
            TestStatus::Running => write!(f, "running"),
            TestStatus::Success => write!(f, "success"),
            TestStatus::Fail => write!(f, "fail"),
            TestStatus::Error => write!(f, "error"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Updated => write!(f, "updated"),
        }
    }
}

/// Pixel dimensions of a screenshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// A screenshot on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub path: PathBuf,
    #[serde(default)]
    pub size: ImageSize,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>, size: ImageSize) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// One named UI region captured during one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub state_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TestStatus>,

    /// Freshly captured screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_img: Option<ImageRef>,

    /// Accepted baseline, present once the state has a reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_img: Option<ImageRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_img: Option<ImageRef>,
}

impl ImageInfo {
    pub fn actual(state_name: impl Into<String>, actual_img: ImageRef) -> Self {
        Self {
            state_name: state_name.into(),
            status: None,
            actual_img: Some(actual_img),
            expected_img: None,
            diff_img: None,
        }
    }

    /// Whether the comparison against the baseline found a difference
    pub fn has_diff(&self) -> bool {
        self.diff_img.is_some() || self.status == Some(TestStatus::Fail)
    }
}

/// Session details attached to a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Outcome of one attempt of one test in one browser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(default)]
    pub status: TestStatus,

    #[serde(default)]
    pub attempt: u32,

    #[serde(default)]
    pub images_info: Vec<ImageInfo>,

    /// Baselines accepted for this attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assert_view_results: Vec<AssertViewResult>,

    #[serde(default)]
    pub meta_info: MetaInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl TestResult {
    pub fn with_status(status: TestStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Baseline comparison record produced when a reference is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertViewResult {
    pub state_name: String,
    pub ref_img: ImageRef,
    pub curr_img: ImageRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&[], TestStatus::Idle; "empty is idle")]
    #[test_case(&[TestStatus::Idle, TestStatus::Skipped], TestStatus::Skipped; "skipped over idle")]
    #[test_case(&[TestStatus::Skipped, TestStatus::Success], TestStatus::Success; "success over skipped")]
    #[test_case(&[TestStatus::Success, TestStatus::Updated], TestStatus::Updated; "updated over success")]
    #[test_case(&[TestStatus::Updated, TestStatus::Fail], TestStatus::Fail; "fail over updated")]
    #[test_case(&[TestStatus::Fail, TestStatus::Error, TestStatus::Idle], TestStatus::Error; "error over fail")]
    #[test_case(&[TestStatus::Error, TestStatus::Running], TestStatus::Running; "running dominates")]
    fn test_aggregate(statuses: &[TestStatus], expected: TestStatus) {
        assert_eq!(TestStatus::aggregate(statuses.iter().copied()), expected);
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(serde_json::to_string(&TestStatus::Fail).unwrap(), "\"fail\"");
        let status: TestStatus = serde_json::from_str("\"updated\"").unwrap();
        assert_eq!(status, TestStatus::Updated);
    }

    #[test]
    fn test_image_info_diff() {
        let mut info = ImageInfo::actual("plain", ImageRef::new("a.png", ImageSize::default()));
        assert!(!info.has_diff());
        info.status = Some(TestStatus::Fail);
        assert!(info.has_diff());
    }
}
