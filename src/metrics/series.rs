//! Time series and fixed-width binning.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RateUnit;

/// One sample at an offset from the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: f64,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(time: f64, value: f64) -> Self {
        SeriesPoint { time, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeBin {
    pub bin_index: u64,
    pub bin_start: f64,
    pub aggregate_bits: f64,
}

impl TimeBin {
    pub fn midpoint(&self, bin_duration: f64) -> f64 {
        self.bin_start + bin_duration / 2.0
    }

    /// Bits per second over the bin.
    pub fn rate(&self, bin_duration: f64) -> f64 {
        self.aggregate_bits / bin_duration
    }
}

/// Sum `points` into bins of `bin_duration` seconds.
///
/// Bin `k` covers `[min + k*d, min + (k+1)*d]` where `min` is the smallest
/// point time. Both ends are inclusive, so a point sitting exactly on a
/// shared boundary is added to both neighbours. Only bins holding at least
/// one point are returned, in index order.
pub fn bin(points: &[SeriesPoint], bin_duration: f64) -> Vec<TimeBin> {
    if points.is_empty() || !(bin_duration > 0.0) {
        return Vec::new();
    }

    let (min, max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.time), hi.max(p.time))
        });
    let last = ((max - min) / bin_duration).floor() as u64;

    let start_of = |idx: u64| min + idx as f64 * bin_duration;
    let mut bins: BTreeMap<u64, f64> = BTreeMap::new();

    for point in points {
        let idx = ((point.time - min) / bin_duration).floor() as u64;
        // Rounding can put the point one bin off from the exact comparison,
        // and a boundary point also belongs to the previous bin.
        for candidate in [idx.checked_sub(1), Some(idx), Some(idx + 1)]
            .into_iter()
            .flatten()
        {
            if candidate > last {
                continue;
            }
            let start = start_of(candidate);
            if start <= point.time && point.time <= start + bin_duration {
                *bins.entry(candidate).or_insert(0.0) += point.value;
            }
        }
    }

    bins.into_iter()
        .map(|(bin_index, aggregate_bits)| TimeBin {
            bin_index,
            bin_start: start_of(bin_index),
            aggregate_bits,
        })
        .collect()
}

/// Rate series reported at each bin's midpoint, in `unit`.
pub fn rate_series(bins: &[TimeBin], bin_duration: f64, unit: RateUnit) -> Vec<SeriesPoint> {
    bins.iter()
        .map(|b| SeriesPoint::new(b.midpoint(bin_duration), unit.scale(b.rate(bin_duration))))
        .collect()
}

/// Raw byte volume in one non-overlapping interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficSlot {
    /// `floor(offset / interval)`; negative for frames timestamped before
    /// the first one.
    pub slot_index: i64,
    pub bytes: u64,
}

impl TrafficSlot {
    pub fn start(&self, interval: f64) -> f64 {
        self.slot_index as f64 * interval
    }
}

/// Accumulates bytes into `floor(offset / interval)` slots.
#[derive(Debug, Clone)]
pub struct TrafficSeries {
    interval: f64,
    slots: BTreeMap<i64, u64>,
}

impl TrafficSeries {
    pub fn new(interval: f64) -> Self {
        TrafficSeries {
            interval,
            slots: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, offset: f64, bytes: usize) {
        let slot = (offset / self.interval).floor() as i64;
        *self.slots.entry(slot).or_insert(0) += bytes as u64;
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn slots(&self) -> Vec<TrafficSlot> {
        self.slots
            .iter()
            .map(|(&slot_index, &bytes)| TrafficSlot { slot_index, bytes })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f64, f64)]) -> Vec<SeriesPoint> {
        raw.iter().map(|&(t, v)| SeriesPoint::new(t, v)).collect()
    }

    #[test]
    fn empty_input_has_no_bins() {
        assert!(bin(&[], 0.2).is_empty());
    }

    #[test]
    fn single_point_makes_one_bin() {
        let bins = bin(&pts(&[(5.0, 800.0)]), 0.2);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].bin_index, 0);
        assert_eq!(bins[0].bin_start, 5.0);
        assert_eq!(bins[0].aggregate_bits, 800.0);
        assert!((bins[0].midpoint(0.2) - 5.1).abs() < 1e-12);
    }

    #[test]
    fn boundary_point_counts_in_both_bins() {
        let bins = bin(&pts(&[(0.0, 8.0), (0.5, 16.0), (1.0, 32.0)]), 0.5);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].aggregate_bits, 8.0 + 16.0);
        assert_eq!(bins[1].aggregate_bits, 16.0 + 32.0);
        assert_eq!(bins[2].aggregate_bits, 32.0);
    }

    #[test]
    fn gaps_stay_sparse() {
        let bins = bin(&pts(&[(0.0, 8.0), (0.1, 8.0), (2.05, 8.0)]), 0.25);
        let idx: Vec<u64> = bins.iter().map(|b| b.bin_index).collect();
        assert_eq!(idx, vec![0, 8]);
        assert_eq!(bins[0].aggregate_bits, 16.0);
    }

    #[test]
    fn zero_valued_points_still_create_bins() {
        let bins = bin(&pts(&[(0.0, 0.0), (0.9, 0.0)]), 0.25);
        assert_eq!(bins.len(), 2);
        assert!(bins.iter().all(|b| b.aggregate_bits == 0.0));
    }

    #[test]
    fn unsorted_points_bin_from_minimum() {
        let bins = bin(&pts(&[(1.0, 8.0), (-0.5, 8.0)]), 1.0);
        assert_eq!(bins[0].bin_start, -0.5);
        assert_eq!(bins.len(), 2);
    }

    #[test]
    fn bins_cover_every_bit() {
        let points = pts(&[(0.0, 480.0), (0.03, 480.0), (0.21, 12000.0), (0.4, 480.0), (0.99, 64.0)]);
        let total: f64 = points.iter().map(|p| p.value).sum();
        let d = 0.2;
        let binned: f64 = bin(&points, d).iter().map(|b| b.rate(d) * d).sum();
        assert!(binned >= total - 1e-9);
    }

    #[test]
    fn rate_series_uses_midpoints_and_unit() {
        let bins = [TimeBin {
            bin_index: 0,
            bin_start: 0.0,
            aggregate_bits: 2_000_000.0,
        }];
        let series = rate_series(&bins, 0.5, RateUnit::Mbps);
        assert_eq!(series, vec![SeriesPoint::new(0.25, 4.0)]);
    }

    #[test]
    fn traffic_slots_do_not_overlap() {
        let mut traffic = TrafficSeries::new(0.1);
        traffic.add(0.0, 60);
        traffic.add(0.05, 60);
        traffic.add(0.25, 1500);
        traffic.add(-0.05, 40);
        let slots = traffic.slots();
        assert_eq!(
            slots,
            vec![
                TrafficSlot { slot_index: -1, bytes: 40 },
                TrafficSlot { slot_index: 0, bytes: 120 },
                TrafficSlot { slot_index: 2, bytes: 1500 },
            ]
        );
        assert_eq!(slots[2].start(0.1), 0.2);
    }
}
