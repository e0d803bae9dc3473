//! MEG recordings exported as CSV, stimulus-channel event decoding and
//! MNE-style events files.
//!
//! A recording export has a `sample` column, the stimulus channel (named
//! after the configured channel, or `value` in a stimulus-only export) and
//! any number of sensor channels.

use crate::error::AnalysisError;
use crate::signal::SensorData;
use presac_core::MegEvent;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct MegRecording {
    pub stim_channel: String,
    /// Raw stimulus channel values, one per sample
    pub stim: Vec<i32>,
    pub sensors: SensorData,
}

fn invalid(line: u64, message: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Invalid(format!("recording line {line}: {message}"))
}

impl MegRecording {
    pub fn first_sample(&self) -> i64 {
        self.sensors.first_sample
    }

    pub fn last_sample(&self) -> i64 {
        self.first_sample() + self.stim.len() as i64 - 1
    }

    pub fn sfreq(&self) -> f64 {
        self.sensors.sfreq
    }

    pub fn read_csv<R: Read>(
        reader: R,
        stim_channel: &str,
        sfreq: f64,
    ) -> Result<Self, AnalysisError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.get(0) != Some("sample") {
            return Err(AnalysisError::Invalid(
                "recording export must start with a `sample` column".to_string(),
            ));
        }
        let stim_col = headers
            .iter()
            .position(|h| h == stim_channel)
            .or_else(|| headers.iter().position(|h| h == "value"))
            .ok_or_else(|| {
                AnalysisError::Invalid(format!("recording has no {stim_channel:?} column"))
            })?;
        let sensor_cols: Vec<usize> = (1..headers.len()).filter(|&c| c != stim_col).collect();

        let mut first_sample = None;
        let mut stim = Vec::new();
        let mut data: Vec<Vec<f64>> = vec![Vec::new(); sensor_cols.len()];
        for record in rdr.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let sample: i64 = record[0]
                .parse()
                .map_err(|_| invalid(line, format!("invalid sample {:?}", &record[0])))?;
            let expected = *first_sample.get_or_insert(sample) + stim.len() as i64;
            if sample != expected {
                return Err(invalid(line, format!("sample {sample} follows {}", expected - 1)));
            }
            let value: f64 = record[stim_col]
                .parse()
                .map_err(|_| invalid(line, format!("invalid trigger value {:?}", &record[stim_col])))?;
            stim.push(value.round() as i32);
            for (ch, &col) in data.iter_mut().zip(&sensor_cols) {
                let v: f64 = record[col]
                    .parse()
                    .map_err(|_| invalid(line, format!("invalid value {:?}", &record[col])))?;
                ch.push(v);
            }
        }

        Ok(MegRecording {
            stim_channel: stim_channel.to_string(),
            stim,
            sensors: SensorData {
                sfreq,
                first_sample: first_sample.unwrap_or(0),
                channel_names: sensor_cols.iter().map(|&c| headers[c].to_string()).collect(),
                data,
            },
        })
    }

    pub fn load_csv<P: AsRef<Path>>(
        path: P,
        stim_channel: &str,
        sfreq: f64,
    ) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        let rec = Self::read_csv(file, stim_channel, sfreq)?;
        info!(
            path = %path.display(),
            samples = rec.stim.len(),
            sensors = rec.sensors.channel_names.len(),
            first_sample = rec.first_sample(),
            "loaded MEG recording"
        );
        Ok(rec)
    }

    pub fn events(&self, mask: i32) -> Vec<MegEvent> {
        find_events(&self.stim, self.first_sample(), mask)
    }
}

/// Decodes a stimulus channel into events. After masking, every step up to
/// a larger non-zero value is an event, including a non-zero first sample.
pub fn find_events(stim: &[i32], first_sample: i64, mask: i32) -> Vec<MegEvent> {
    let mut events = Vec::new();
    let mut previous = 0;
    for (i, &raw) in stim.iter().enumerate() {
        let value = raw & mask;
        if value != 0 && value > previous {
            events.push(MegEvent {
                sample: first_sample + i as i64,
                previous,
                code: value,
            });
        }
        previous = value;
    }
    debug!(events = events.len(), mask, "decoded stimulus channel");
    events
}

/// Parses an MNE events text file: `sample previous code` rows, optionally
/// with a time column after the sample. `#` starts a comment.
pub fn parse_events(text: &str) -> Result<Vec<MegEvent>, AnalysisError> {
    let mut events = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (sample, previous, code) = match fields.as_slice() {
            [s, p, c] | [s, _, p, c] => (*s, *p, *c),
            _ => {
                return Err(AnalysisError::Invalid(format!(
                    "events line {}: expected 3 or 4 columns, got {}",
                    i + 1,
                    fields.len()
                )));
            }
        };
        let invalid =
            |s: &str| AnalysisError::Invalid(format!("events line {}: invalid integer {s:?}", i + 1));
        events.push(MegEvent {
            sample: sample.parse().map_err(|_| invalid(sample))?,
            previous: previous.parse().map_err(|_| invalid(previous))?,
            code: code.parse().map_err(|_| invalid(code))?,
        });
    }
    Ok(events)
}

pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<MegEvent>, AnalysisError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
    parse_events(&text)
}

pub fn write_events<W: Write>(events: &[MegEvent], mut writer: W) -> std::io::Result<()> {
    for e in events {
        writeln!(writer, "{:>8} {:>3} {:>3}", e.sample, e.previous, e.code)?;
    }
    writer.flush()
}

pub fn save_events<P: AsRef<Path>>(events: &[MegEvent], path: P) -> Result<(), AnalysisError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    write_events(events, BufWriter::new(file)).map_err(|e| AnalysisError::io(path, e))
}
