//! Reader for EyeLink ASCII exports (`.asc`).
//!
//! Only two record types matter here: `EFIX` lines closing a fixation and
//! `MSG` lines carrying a `Trigger` written by the presentation.

use crate::error::AnalysisError;
use presac_core::{Eye, Fixation, Trigger};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const EFIX_FIELDS: usize = 8;
const TRIGGER_FIELDS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyelinkData {
    pub fixations: Vec<Fixation>,
    pub triggers: Vec<Trigger>,
}

struct LineParser<'a> {
    path: &'a Path,
    line: usize,
}

impl LineParser<'_> {
    fn error(&self, message: impl Into<String>) -> AnalysisError {
        AnalysisError::Parse {
            path: self.path.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    fn field<T: FromStr>(&self, fields: &[&str], i: usize, name: &str) -> Result<T, AnalysisError> {
        fields[i]
            .parse()
            .map_err(|_| self.error(format!("invalid {name} {:?}", fields[i])))
    }

    fn fixation(&self, fields: &[&str]) -> Result<Fixation, AnalysisError> {
        if fields.len() != EFIX_FIELDS {
            return Err(self.error(format!(
                "EFIX line has {} fields, expected {EFIX_FIELDS}",
                fields.len()
            )));
        }
        let eye: Eye = fields[1].parse().map_err(|e: String| self.error(e))?;
        Ok(Fixation {
            eye,
            start: self.field(fields, 2, "start")?,
            end: self.field(fields, 3, "end")?,
            duration: self.field(fields, 4, "duration")?,
            x_avg: self.field(fields, 5, "x")?,
            y_avg: self.field(fields, 6, "y")?,
            pupil: self.field(fields, 7, "pupil")?,
        })
    }

    fn trigger(&self, fields: &[&str]) -> Result<Trigger, AnalysisError> {
        if fields.len() != TRIGGER_FIELDS {
            return Err(self.error(format!(
                "trigger message has {} fields, expected {TRIGGER_FIELDS}",
                fields.len()
            )));
        }
        Ok(Trigger {
            sample: self.field(fields, 1, "timestamp")?,
            code: self.field(fields, 3, "trigger value")?,
        })
    }
}

impl EyelinkData {
    /// Parses the text of an export. `path` only labels errors.
    pub fn parse(text: &str, path: &Path) -> Result<Self, AnalysisError> {
        let mut data = EyelinkData::default();
        for (i, line) in text.lines().enumerate() {
            let parser = LineParser { path, line: i + 1 };
            if line.starts_with("EFIX") {
                let fields: Vec<&str> = line.split_whitespace().collect();
                data.fixations.push(parser.fixation(&fields)?);
            } else if line.starts_with("MSG") {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.get(2) == Some(&"Trigger") {
                    data.triggers.push(parser.trigger(&fields)?);
                }
            }
        }
        Ok(data)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let data = Self::parse(&text, path)?;
        info!(
            path = %path.display(),
            fixations = data.fixations.len(),
            triggers = data.triggers.len(),
            "loaded eye-tracker export"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASC: &str = "\
** CONVERTED FROM 19110415.EDF
MSG\t7165000 !CAL VALIDATION HV9 R RIGHT GOOD
MSG\t7166000 Trigger 2
SFIX R   7166100
EFIX R   7166100\t7166400\t301\t  962.5\t  545.3\t   1045
MSG\t7166401 Trigger 4
7166402\t  962.1\t  544.9\t 1044.0\t...
EFIX L   7166500\t7166900\t401\t  610.0\t  540.0\t    998
";

    fn parse(text: &str) -> Result<EyelinkData, AnalysisError> {
        EyelinkData::parse(text, Path::new("test.asc"))
    }

    #[test]
    fn reads_fixations_and_triggers() {
        let data = parse(ASC).unwrap();
        assert_eq!(data.fixations.len(), 2);
        assert_eq!(
            data.fixations[0],
            Fixation {
                eye: Eye::Right,
                start: 7166100,
                end: 7166400,
                duration: 301,
                x_avg: 962.5,
                y_avg: 545.3,
                pupil: 1045,
            }
        );
        assert_eq!(data.fixations[1].eye, Eye::Left);
        assert_eq!(
            data.triggers,
            vec![
                Trigger { sample: 7166000, code: 2 },
                Trigger { sample: 7166401, code: 4 },
            ]
        );
    }

    #[test]
    fn other_messages_are_skipped() {
        let data = parse("MSG 10 DRIFTCORRECT R RIGHT at 960,540\nMSG 11 TRIALID 3\n").unwrap();
        assert!(data.triggers.is_empty());
    }

    #[test]
    fn malformed_fixation_reports_line() {
        let text = "MSG 1 Trigger 2\nEFIX R 100 200 101 960.0 540.0\n";
        match parse(text) {
            Err(AnalysisError::Parse { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("7 fields"), "{message}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = parse("EFIX R 100 200 101 .\t540.0 1000\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { line: 1, .. }));

        let err = parse("MSG 50 Trigger x\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { line: 1, .. }));

        let err = parse("MSG 50 Trigger 4 extra\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { line: 1, .. }));
    }

    #[test]
    fn unknown_eye_is_an_error() {
        let err = parse("EFIX X 100 200 101 960.0 540.0 1000\n").unwrap_err();
        assert!(err.to_string().contains("eye side"));
    }
}
