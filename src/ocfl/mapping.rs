use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::LogicalPath;

/// Maps logical paths to the paths content files are written to beneath a version's
/// content directory. Implementations must be deterministic: the same logical path
/// must always map to the same content path.
pub trait LogicalPathMapper: Send + Sync {
    fn map(&self, logical_path: &LogicalPath) -> Result<String>;
}

/// Validates that a generated content path is legal for the backing store
pub trait ContentPathConstraint: Send + Sync {
    fn validate(&self, content_path: &str) -> Result<()>;
}

/// Maps logical paths one-to-one onto content paths
#[derive(Debug, Default)]
pub struct DirectPathMapper;

/// Enforces the baseline OCFL content path rules: non-empty segments that are not
/// `.` or `..`, and no control characters or backslashes.
#[derive(Debug, Default)]
pub struct BaselinePathConstraint;

impl LogicalPathMapper for DirectPathMapper {
    fn map(&self, logical_path: &LogicalPath) -> Result<String> {
        Ok(logical_path.as_str().to_string())
    }
}

impl ContentPathConstraint for BaselinePathConstraint {
    fn validate(&self, content_path: &str) -> Result<()> {
        if content_path.is_empty() {
            return Err(OcflError::InvalidInput(
                "Content paths may not be empty".to_string(),
            ));
        }

        let has_illegal_part = content_path
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");

        if has_illegal_part {
            return Err(OcflError::InvalidInput(format!(
                "Content paths may not contain '.', '..', or '' segments. Found: {}",
                content_path
            )));
        }

        if content_path
            .chars()
            .any(|c| c.is_control() || c == '\\')
        {
            return Err(OcflError::InvalidInput(format!(
                "Content paths may not contain control characters or backslashes. Found: {}",
                content_path
            )));
        }

        Ok(())
    }
}
