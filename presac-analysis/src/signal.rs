//! Small numeric helpers for artifact screening.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Continuous sensor data, one row per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub sfreq: f64,
    /// Index of the first sample since acquisition start
    pub first_sample: i64,
    pub channel_names: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl SensorData {
    pub fn n_samples(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Keeps every `factor`-th sample with no anti-alias filtering. Only
    /// meant for speeding up ICA fits.
    pub fn decimate(&self, factor: usize) -> Result<SensorData, AnalysisError> {
        if factor <= 1 {
            return Err(AnalysisError::DecimationFactor(factor));
        }
        Ok(SensorData {
            sfreq: self.sfreq / factor as f64,
            first_sample: self.first_sample / factor as i64,
            channel_names: self.channel_names.clone(),
            data: self
                .data
                .iter()
                .map(|ch| ch.iter().step_by(factor).copied().collect())
                .collect(),
        })
    }
}

fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Population standard deviation.
pub fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let m = mean(x);
    (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.len() as f64).sqrt()
}

/// Standard scores using the population standard deviation. A constant
/// input has no spread and maps to all zeros.
pub fn zscore(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let m = mean(x);
    let sd = std_dev(x);
    if sd == 0.0 {
        return vec![0.0; x.len()];
    }
    x.iter().map(|v| (v - m) / sd).collect()
}

/// Global field power of one epoch (`[channel][time]`): the spread across
/// channels at every time point.
pub fn global_field_power(epoch: &[Vec<f64>]) -> Vec<f64> {
    let n_times = epoch.first().map_or(0, Vec::len);
    let mut column = Vec::with_capacity(epoch.len());
    (0..n_times)
        .map(|t| {
            column.clear();
            column.extend(epoch.iter().map(|ch| ch[t]));
            std_dev(&column)
        })
        .collect()
}

/// Flags epochs whose peak global field power lies more than `threshold`
/// standard deviations above the mean peak across epochs.
pub fn high_gfp_trials(epochs: &[Vec<Vec<f64>>], threshold: f64) -> Vec<bool> {
    let peaks: Vec<f64> = epochs
        .iter()
        .map(|e| {
            global_field_power(e)
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect();
    zscore(&peaks).into_iter().map(|z| z > threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> SensorData {
        SensorData {
            sfreq: 1000.0,
            first_sample: 12_345,
            channel_names: vec!["MEG0111".into(), "MEG0112".into()],
            data: vec![(0..n).map(|i| i as f64).collect(), vec![1.0; n]],
        }
    }

    #[test]
    fn decimate_keeps_every_nth_sample() {
        let d = data(25).decimate(10).unwrap();
        assert_eq!(d.sfreq, 100.0);
        assert_eq!(d.first_sample, 1234);
        assert_eq!(d.data[0], vec![0.0, 10.0, 20.0]);
        assert_eq!(d.n_samples(), 3);
    }

    #[test]
    fn decimate_rejects_trivial_factors() {
        assert!(matches!(
            data(5).decimate(1),
            Err(AnalysisError::DecimationFactor(1))
        ));
        assert!(data(5).decimate(0).is_err());
    }

    #[test]
    fn zscore_uses_population_sd() {
        let z = zscore(&[1.0, 2.0, 3.0, 4.0]);
        let sd = 1.25f64.sqrt();
        assert!((z[0] + 1.5 / sd).abs() < 1e-12);
        assert!((z[3] - 1.5 / sd).abs() < 1e-12);
        assert_eq!(zscore(&[3.0, 3.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn gfp_is_spread_across_channels() {
        let epoch = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        assert_eq!(global_field_power(&epoch), vec![1.0, 0.0]);
    }

    #[test]
    fn flags_the_noisy_epoch() {
        let quiet = vec![vec![0.1, -0.1], vec![-0.1, 0.1]];
        let loud = vec![vec![50.0, 0.0], vec![-50.0, 0.0]];
        let mut epochs = vec![quiet; 20];
        epochs.push(loud);
        let bad = high_gfp_trials(&epochs, 4.0);
        assert_eq!(bad.iter().filter(|&&b| b).count(), 1);
        assert!(bad[20]);
    }
}
