//! Distance and proximity helpers shared by every pipeline stage.
//!
//! # Example
//!
//! ```rust
//! use centroids_perception::geometry::{any_within, distance};
//! use centroids_types::Point3;
//!
//! let a = Point3::new(0.0, 0.0, 0.0);
//! let b = Point3::new(3.0, 4.0, 0.0);
//! assert!((distance(a, b) - 5.0).abs() < 1e-6);
//!
//! // Strictly-less-than comparison: exactly 5 m away is not "within 5 m".
//! assert!(!any_within(a, &[b], 5.0));
//! assert!(any_within(a, &[b], 5.01));
//! ```

use centroids_types::{PipelineError, Point3};

/// Euclidean distance between `a` and `b`.
pub fn distance(a: Point3, b: Point3) -> f32 {
    distance_sq(a, b).sqrt()
}

pub(crate) fn distance_sq(a: Point3, b: Point3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

/// True iff at least one element of `set` lies strictly closer than
/// `threshold` to `p`.  Always `false` for an empty `set`.
pub fn any_within(p: Point3, set: &[Point3], threshold: f32) -> bool {
    set.iter().any(|&q| distance(p, q) < threshold)
}

/// Arithmetic mean of `points`, or `None` when the slice is empty.
///
/// Accumulates in `f64` so that large batches do not lose precision.
pub fn mean(points: &[Point3]) -> Option<Point3> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy, sz) = points.iter().fold((0.0f64, 0.0f64, 0.0f64), |acc, p| {
        (acc.0 + p.x as f64, acc.1 + p.y as f64, acc.2 + p.z as f64)
    });
    let n = points.len() as f64;
    Some(Point3::new(
        (sx / n) as f32,
        (sy / n) as f32,
        (sz / n) as f32,
    ))
}

/// Reject thresholds that are negative or not a finite number.
pub(crate) fn check_threshold(name: &str, value: f32) -> Result<(), PipelineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::MalformedInput(format!(
            "{name} must be a non-negative finite number, got {value}"
        )));
    }
    Ok(())
}

/// Reject a batch containing any NaN or infinite coordinate.
pub fn check_finite<'a>(
    what: &str,
    points: impl IntoIterator<Item = &'a Point3>,
) -> Result<(), PipelineError> {
    match points.into_iter().enumerate().find(|(_, p)| !p.is_finite()) {
        Some((idx, p)) => Err(PipelineError::MalformedInput(format!(
            "{what}[{idx}] has a non-finite coordinate: {p:?}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_reflexive_and_symmetric() {
        let a = Point3::new(1.0, -2.0, 0.5);
        let b = Point3::new(-0.5, 3.0, 2.0);
        assert_eq!(distance(a, a), 0.0);
        assert_eq!(distance(a, b), distance(b, a));
        assert!(distance(a, b) > 0.0);
    }

    #[test]
    fn any_within_empty_set_is_false() {
        assert!(!any_within(Point3::default(), &[], f32::MAX));
    }

    #[test]
    fn any_within_is_monotone_in_threshold() {
        let p = Point3::new(0.0, 0.0, 0.0);
        let set = [Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 2.0, 0.0)];
        let thresholds = [0.5, 1.0, 1.0001, 1.5, 2.0, 3.0];
        let mut seen_true = false;
        for t in thresholds {
            let hit = any_within(p, &set, t);
            if seen_true {
                assert!(hit, "must stay true once satisfied (t = {t})");
            }
            seen_true |= hit;
        }
        assert!(seen_true);
    }

    #[test]
    fn any_within_uses_strict_comparison() {
        let p = Point3::new(0.0, 0.0, 0.0);
        let set = [Point3::new(0.25, 0.0, 0.0)];
        assert!(!any_within(p, &set, 0.25));
        assert!(any_within(p, &set, 0.26));
    }

    #[test]
    fn mean_of_points() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.05, 0.0, 0.0),
        ];
        let m = mean(&pts).unwrap();
        assert!((m.x - 0.025).abs() < 1e-6);
        assert_eq!(m.y, 0.0);
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn check_threshold_rejects_negative_and_nan() {
        assert!(check_threshold("eps", 0.3).is_ok());
        assert!(check_threshold("eps", 0.0).is_ok());
        assert!(matches!(
            check_threshold("eps", -0.1),
            Err(PipelineError::MalformedInput(_))
        ));
        assert!(check_threshold("eps", f32::NAN).is_err());
    }

    #[test]
    fn check_finite_reports_offending_index() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, f32::NAN, 0.0)];
        let err = check_finite("obstacles", &pts).unwrap_err();
        assert!(err.to_string().contains("obstacles[1]"));
    }
}
