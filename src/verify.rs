//! Geofence/proof verifier
//!
//! Pure over its inputs. Persisting the outcome is the caller's job; nothing
//! here touches storage.

use serde::Serialize;

use crate::db::tasks::TaskRow;
use crate::geo::haversine_distance_m;
use crate::model::{Proof, TaskType};

/// Why a check-in attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Token mismatch, missing proof config, or unusable coordinates
    InvalidProof,
    /// Reported GPS accuracy exceeds the policy ceiling
    InsufficientAccuracy,
    /// Fix is outside the task's allowed radius
    OutOfRange,
    /// Check-in proof supplied for a non-checkin task
    TypeMismatch,
}

/// Outcome of verifying one check-in attempt
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Measured great-circle distance to the target, when computable.
    /// Returned on `OutOfRange` so clients can report "you were N meters away".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl VerificationResult {
    fn pass(distance_m: Option<f64>, accuracy_m: Option<f64>) -> Self {
        Self {
            ok: true,
            reason: None,
            distance_m,
            accuracy_m,
        }
    }

    fn fail(reason: FailureReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            distance_m: None,
            accuracy_m: None,
        }
    }
}

/// Verify a single check-in attempt against a task's proof requirements.
///
/// `max_accuracy_m` is the policy ceiling on GPS radius-of-uncertainty.
pub fn verify(task: &TaskRow, proof: &Proof, max_accuracy_m: f64) -> VerificationResult {
    if task.task_type != TaskType::Checkin {
        return VerificationResult::fail(FailureReason::TypeMismatch);
    }

    match proof {
        Proof::Qr { token } => verify_qr(task, token),
        Proof::Gps {
            latitude,
            longitude,
            accuracy_m,
        } => verify_gps(task, *latitude, *longitude, *accuracy_m, max_accuracy_m),
    }
}

fn verify_qr(task: &TaskRow, token: &str) -> VerificationResult {
    match task.qr_secret.as_deref() {
        Some(secret) if !token.is_empty() && secret == token => {
            VerificationResult::pass(None, None)
        }
        _ => VerificationResult::fail(FailureReason::InvalidProof),
    }
}

fn verify_gps(
    task: &TaskRow,
    latitude: f64,
    longitude: f64,
    accuracy_m: f64,
    max_accuracy_m: f64,
) -> VerificationResult {
    let (target_lat, target_lon, allowed_radius_m) =
        match (task.latitude, task.longitude, task.allowed_radius_m) {
            (Some(lat), Some(lon), Some(radius)) => (lat, lon, radius),
            _ => return VerificationResult::fail(FailureReason::InvalidProof),
        };

    if !accuracy_m.is_finite() || accuracy_m < 0.0 {
        return VerificationResult::fail(FailureReason::InvalidProof);
    }
    if accuracy_m > max_accuracy_m {
        return VerificationResult {
            ok: false,
            reason: Some(FailureReason::InsufficientAccuracy),
            distance_m: None,
            accuracy_m: Some(accuracy_m),
        };
    }

    let distance_m = match haversine_distance_m(latitude, longitude, target_lat, target_lon) {
        Some(d) => d,
        None => return VerificationResult::fail(FailureReason::InvalidProof),
    };

    if distance_m <= allowed_radius_m {
        VerificationResult::pass(Some(distance_m), Some(accuracy_m))
    } else {
        VerificationResult {
            ok: false,
            reason: Some(FailureReason::OutOfRange),
            distance_m: Some(distance_m),
            accuracy_m: Some(accuracy_m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkin_task() -> TaskRow {
        TaskRow {
            id: "task-1".to_string(),
            title: "Petronas Towers".to_string(),
            task_type: TaskType::Checkin,
            category: "landmarks".to_string(),
            latitude: Some(3.1390),
            longitude: Some(101.6869),
            allowed_radius_m: Some(50.0),
            qr_secret: Some("tower-secret".to_string()),
            is_published: true,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_gps_at_target_passes() {
        let result = verify(
            &checkin_task(),
            &Proof::Gps {
                latitude: 3.1390,
                longitude: 101.6869,
                accuracy_m: 10.0,
            },
            150.0,
        );
        assert!(result.ok);
        assert!(result.distance_m.unwrap() < 1.0);
    }

    #[test]
    fn test_gps_200m_away_out_of_range() {
        let result = verify(
            &checkin_task(),
            &Proof::Gps {
                latitude: 3.1390 + 0.0017986,
                longitude: 101.6869,
                accuracy_m: 10.0,
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::OutOfRange));
        let d = result.distance_m.unwrap();
        assert!((d - 200.0).abs() < 2.0, "expected ~200m, got {}", d);
    }

    #[test]
    fn test_poor_accuracy_rejected_before_distance() {
        let result = verify(
            &checkin_task(),
            &Proof::Gps {
                latitude: 3.1390,
                longitude: 101.6869,
                accuracy_m: 500.0,
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::InsufficientAccuracy));
        assert_eq!(result.accuracy_m, Some(500.0));
    }

    #[test]
    fn test_nan_coordinates_invalid_proof() {
        let result = verify(
            &checkin_task(),
            &Proof::Gps {
                latitude: f64::NAN,
                longitude: 101.6869,
                accuracy_m: 10.0,
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::InvalidProof));
    }

    #[test]
    fn test_qr_token_match() {
        let result = verify(
            &checkin_task(),
            &Proof::Qr {
                token: "tower-secret".to_string(),
            },
            150.0,
        );
        assert!(result.ok);
    }

    #[test]
    fn test_qr_token_mismatch() {
        let result = verify(
            &checkin_task(),
            &Proof::Qr {
                token: "wrong".to_string(),
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::InvalidProof));
    }

    #[test]
    fn test_checkin_proof_against_quiz_task() {
        let mut task = checkin_task();
        task.task_type = TaskType::Quiz;
        let result = verify(
            &task,
            &Proof::Qr {
                token: "tower-secret".to_string(),
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::TypeMismatch));
    }

    #[test]
    fn test_gps_task_without_target_invalid() {
        let mut task = checkin_task();
        task.latitude = None;
        let result = verify(
            &task,
            &Proof::Gps {
                latitude: 3.1390,
                longitude: 101.6869,
                accuracy_m: 10.0,
            },
            150.0,
        );
        assert!(!result.ok);
        assert_eq!(result.reason, Some(FailureReason::InvalidProof));
    }
}
