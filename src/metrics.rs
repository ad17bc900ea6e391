use crate::model::Series;
use serde::Serialize;

/// Median of `values`, or `None` for an empty input.
///
/// Sorts a copy; even lengths average the two middle elements.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// `max - min` of `values`, or `None` for an empty input.
pub fn range(values: &[f64]) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    let (min, max) = rest
        .iter()
        .fold((*first, *first), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    Some(max - min)
}

/// Order statistics for one plotted series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatistics {
    pub label: String,
    pub median: Option<f64>,
    pub range: Option<f64>,
}

impl SeriesStatistics {
    pub fn from_series(series: &Series) -> Self {
        Self {
            label: series.label().to_string(),
            median: median(series.y_values()),
            range: range(series.y_values()),
        }
    }

    pub fn median_text(&self) -> String {
        format_stat(self.median)
    }

    pub fn range_text(&self) -> String {
        format_stat(self.range)
    }
}

pub fn compute_statistics(series: &[Series]) -> Vec<SeriesStatistics> {
    series.iter().map(SeriesStatistics::from_series).collect()
}

fn format_stat(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.4}"),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn median_odd_even_and_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_does_not_touch_input() {
        let input = vec![5.0, -1.0, 3.0];
        let _ = median(&input);
        assert_eq!(input, vec![5.0, -1.0, 3.0]);
    }

    #[test]
    fn range_basics() {
        assert_eq!(range(&[]), None);
        assert_eq!(range(&[7.5]), Some(0.0));
        assert_eq!(range(&[2.0, 2.0, 2.0]), Some(0.0));
        assert_eq!(range(&[-3.0, 4.0, 1.0]), Some(7.0));
    }

    #[test]
    fn empty_series_formats_as_na() {
        let stats = SeriesStatistics::from_series(&Series::new("Load Cell 3", []));
        assert_eq!(stats.median, None);
        assert_eq!(stats.median_text(), "N/A");
        assert_eq!(stats.range_text(), "N/A");
    }

    proptest! {
        #[test]
        fn median_is_middle_of_sorted(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = sorted.len();
            let expected = if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            };
            prop_assert_eq!(median(&values), Some(expected));
        }

        #[test]
        fn range_is_max_minus_min(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
            let max = values.iter().cloned().fold(f64::MIN, f64::max);
            let min = values.iter().cloned().fold(f64::MAX, f64::min);
            prop_assert_eq!(range(&values), Some(max - min));
        }

        #[test]
        fn constant_sequences_have_zero_range(v in -1e6f64..1e6, n in 1usize..100) {
            let values = vec![v; n];
            prop_assert_eq!(range(&values), Some(0.0));
            prop_assert_eq!(median(&values), Some(v));
        }
    }
}
