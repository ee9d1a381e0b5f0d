//! Per-component result envelope.

use serde::Serialize;

use crate::error::{ContagionError, Result};

/// Either a computed value or the reason there is none.
///
/// Serialized with a `status` tag: `computed` (with `value`), `insufficient`
/// or `failed` (with `reason`).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Computed { value: T },
    Insufficient { reason: String },
    Failed { reason: String },
}

impl<T> Outcome<T> {
    /// Fold a component result into the envelope, logging degraded outcomes.
    ///
    /// `InsufficientData` becomes `Insufficient`; every other error is `Failed`.
    pub fn from_result(component: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Computed { value },
            Err(ContagionError::InsufficientData { reason, .. }) => {
                log::warn!("{component}: insufficient data ({reason})");
                Outcome::Insufficient { reason }
            }
            Err(e) => {
                log::warn!("{component}: failed ({e})");
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Computed { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Outcome::Computed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Computed { .. } => None,
            Outcome::Insufficient { reason } | Outcome::Failed { reason } => Some(reason),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Computed { .. } => "computed",
            Outcome::Insufficient { .. } => "insufficient",
            Outcome::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_is_computed() {
        let o = Outcome::from_result("x", Ok(3));
        assert_eq!(o.value(), Some(&3));
        assert_eq!(o.status(), "computed");
        assert!(o.reason().is_none());
    }

    #[test]
    fn test_insufficient_is_soft() {
        let o: Outcome<i32> =
            Outcome::from_result("x", Err(ContagionError::insufficient("x", "only 1 pair")));
        assert_eq!(o.status(), "insufficient");
        assert_eq!(o.reason(), Some("only 1 pair"));
    }

    #[test]
    fn test_computation_error_is_failed() {
        let o: Outcome<i32> =
            Outcome::from_result("x", Err(ContagionError::computation("x", "NaN in row")));
        assert_eq!(o.status(), "failed");
        assert!(o.reason().unwrap().contains("NaN in row"));
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let o = Outcome::Computed { value: 1.5 };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["status"], "computed");
        assert_eq!(json["value"], 1.5);

        let o: Outcome<f64> = Outcome::Insufficient {
            reason: "zero variance".into(),
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["status"], "insufficient");
        assert_eq!(json["reason"], "zero variance");
    }
}
