//! Work item status and the stored result payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved key injected into every stored result.
pub const RESULT_KEY: &str = "results";

/// Marker stored under [`RESULT_KEY`] for items that ran successfully.
pub const RESULT_SUCCESSFUL_ITEM: &str = "ITEM RAN";

/// Marker stored under [`RESULT_KEY`] for items cancelled before running.
pub const RESULT_CANCELLED_ITEM: &str = "ITEM CANCELLED";

/// Prefix of the marker stored for items whose callable failed.
pub const RESULT_FAILED_PREFIX: &str = "ITEM FAILED WITH EXCEPTION";

/// Status of a work item.
///
/// ```text
/// Submitted → Running → RanSuccessfully | Failed
/// Submitted → Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkStatus {
    /// Waiting for a worker
    Submitted,
    /// Executing on a worker
    Running,
    /// Callable returned a mapping
    RanSuccessfully,
    /// Callable failed, panicked or returned a non-mapping
    Failed,
    /// Cancelled before it started
    Cancelled,
}

impl WorkStatus {
    /// Whether the item can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkStatus::RanSuccessfully | WorkStatus::Failed | WorkStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkStatus::Submitted => write!(f, "Submitted"),
            WorkStatus::Running => write!(f, "Running"),
            WorkStatus::RanSuccessfully => write!(f, "Ran successfully"),
            WorkStatus::Failed => write!(f, "Failed to run"),
            WorkStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Terminal outcome of a work item, as kept in the results store.
///
/// On success this is the callable's own mapping plus the status marker under
/// [`RESULT_KEY`] (a callable value under that key is overwritten). Failed and
/// cancelled items only carry the marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkResult(Map<String, Value>);

impl WorkResult {
    /// Result of an item whose callable returned `values`.
    pub fn success(mut values: Map<String, Value>) -> Self {
        values.insert(RESULT_KEY.to_string(), Value::from(RESULT_SUCCESSFUL_ITEM));
        Self(values)
    }

    /// Result of an item whose callable failed with `detail`.
    pub fn failure(detail: impl fmt::Display) -> Self {
        Self::marker_only(format!("{RESULT_FAILED_PREFIX}: '{detail}'."))
    }

    /// Result of an item whose callable returned `err`.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::failure(describe_error(err))
    }

    /// Result of an item cancelled before it ran.
    pub fn cancelled() -> Self {
        Self::marker_only(RESULT_CANCELLED_ITEM.to_string())
    }

    fn marker_only(marker: String) -> Self {
        let mut values = Map::new();
        values.insert(RESULT_KEY.to_string(), Value::String(marker));
        Self(values)
    }

    /// The status marker.
    pub fn marker(&self) -> Option<&str> {
        self.0.get(RESULT_KEY).and_then(Value::as_str)
    }

    /// Status derived from the marker.
    pub fn status(&self) -> WorkStatus {
        match self.marker() {
            Some(RESULT_CANCELLED_ITEM) => WorkStatus::Cancelled,
            Some(marker) if marker.starts_with(RESULT_FAILED_PREFIX) => WorkStatus::Failed,
            _ => WorkStatus::RanSuccessfully,
        }
    }

    /// Failure message, if the item failed.
    pub fn failure_message(&self) -> Option<&str> {
        self.marker().filter(|m| m.starts_with(RESULT_FAILED_PREFIX))
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All stored values, marker included.
    pub fn values(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the raw mapping.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Render an error with its debug form and source chain.
///
/// The debug form is kept when it says more than the message, so error kinds
/// such as `ValueError("boom")` survive next to the text.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let display = err.to_string();
    let debug = format!("{err:?}");

    let mut detail = if debug == display || debug == format!("{display:?}") {
        display
    } else {
        format!("{debug}: {display}")
    };

    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }

    detail
}
