//! Linear interpolation for filling gaps in a single parcel's series.

use chrono::NaiveDate;

/// A single data point for interpolation. `value` is `None` for a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl DataPoint {
    fn known(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Linearly interpolate the value at `at` between two known points,
/// weighting by day distance.
///
/// If start and end fall on the same day the start value is returned.
pub fn interpolate_at(start: (NaiveDate, f64), end: (NaiveDate, f64), at: NaiveDate) -> f64 {
    let span = (end.0 - start.0).num_days();
    if span <= 0 {
        return start.1;
    }
    let offset = (at - start.0).num_days();
    let slope = (end.1 - start.1) / span as f64;
    start.1 + slope * offset as f64
}

/// Fill every gap in a date-sorted series.
///
/// Interior gaps are interpolated in time between the nearest known
/// neighbours; leading gaps take the first known value and trailing gaps the
/// last known value. Non-finite values count as gaps. A series with no known
/// values comes back unchanged (all `None`).
pub fn fill_both_directions(points: &[DataPoint]) -> Vec<Option<f64>> {
    let known: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.known().is_some())
        .map(|(i, _)| i)
        .collect();

    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return vec![None; points.len()];
    };

    let mut result = Vec::with_capacity(points.len());
    // index into `known` of the closest known point at or before i
    let mut k = 0usize;
    for (i, point) in points.iter().enumerate() {
        if let Some(v) = point.known() {
            result.push(Some(v));
            continue;
        }
        if i < first {
            result.push(points[first].known());
            continue;
        }
        if i > last {
            result.push(points[last].known());
            continue;
        }
        while k + 1 < known.len() && known[k + 1] < i {
            k += 1;
        }
        let (before, after) = (&points[known[k]], &points[known[k + 1]]);
        let value = match (before.known(), after.known()) {
            (Some(b), Some(a)) => Some(interpolate_at((before.date, b), (after.date, a), point.date)),
            _ => None,
        };
        result.push(value);
    }
    result
}
