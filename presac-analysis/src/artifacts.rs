//! Artifact identification for one subject: bad-segment annotations and an
//! ICA decomposition, both persisted next to the raw data.
//!
//! Manual annotation and the ICA fit are done by collaborators behind
//! [`BadSegmentAnnotator`] and [`IcaBackend`].

use crate::annotations::{Annotation, out_of_trial, read_annotations, write_annotations};
use crate::error::AnalysisError;
use crate::meg::MegRecording;
use crate::signal::SensorData;
use presac_core::events::samples_with_code;
use presac_core::{ExptInfo, Trigger, triggers};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// ICA is fitted on data decimated by this factor.
pub const ICA_DECIMATION: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaModel {
    pub n_components: usize,
    pub sfreq: f64,
    pub channel_names: Vec<String>,
    /// One row per component
    pub unmixing: Vec<Vec<f64>>,
    /// One column per component
    pub mixing: Vec<Vec<f64>>,
    /// Components marked as artifacts
    pub exclude: Vec<usize>,
}

impl IcaModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        let model: IcaModel = serde_json::from_reader(io::BufReader::new(file))?;
        info!(path = %path.display(), components = model.n_components, excluded = ?model.exclude, "loaded ICA model");
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AnalysisError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| AnalysisError::io(path, e))?;
        info!(path = %path.display(), "saved ICA model");
        Ok(())
    }
}

/// Lets an operator mark bad segments, starting from `initial`.
pub trait BadSegmentAnnotator {
    fn annotate(
        &mut self,
        recording: &MegRecording,
        initial: &[Annotation],
    ) -> Result<Vec<Annotation>, AnalysisError>;
}

/// Fits ICA on `data`, ignoring the spans in `annotations`, and returns the
/// decomposition with the rejected components marked.
pub trait IcaBackend {
    fn fit(
        &mut self,
        data: &SensorData,
        annotations: &[Annotation],
    ) -> Result<IcaModel, AnalysisError>;
}

/// Line-oriented terminal dialogue.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<io::BufReader<io::Stdin>, io::Stdout> {
    /// Terminal prompt. Stdin is locked per read, so several prompts can
    /// coexist.
    pub fn stdio() -> Self {
        Prompt::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Shows `question` and returns the trimmed answer.
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }

    pub fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{message}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwriteAnswer {
    Keep,
    Overwrite,
    Unrecognized(String),
}

impl OverwriteAnswer {
    /// An empty answer keeps the existing file.
    pub fn parse(answer: &str) -> Self {
        match answer {
            "" | "n" | "N" => OverwriteAnswer::Keep,
            "y" | "Y" => OverwriteAnswer::Overwrite,
            other => OverwriteAnswer::Unrecognized(other.to_string()),
        }
    }
}

pub fn ask_overwrite<R: BufRead, W: Write>(
    prompt: &mut Prompt<R, W>,
    path: &Path,
) -> Result<OverwriteAnswer, AnalysisError> {
    let io_err = |e| AnalysisError::io(path, e);
    prompt
        .say(&format!("Artifact annotations already exist: {}", path.display()))
        .map_err(io_err)?;
    let answer = prompt.ask("Overwrite? (y/n): ").map_err(io_err)?;
    Ok(OverwriteAnswer::parse(&answer))
}

/// Where the artifact definitions of one subject live.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub annotations: PathBuf,
    pub ica: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactOutcome {
    Completed {
        annotations: Vec<Annotation>,
        ica: IcaModel,
    },
    /// The overwrite question got an answer that was neither yes nor no;
    /// nothing was written.
    Aborted,
}

fn ensure_parent(path: &Path) -> Result<(), AnalysisError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))
        }
        _ => Ok(()),
    }
}

pub fn identify_artifacts<A, I, R, W>(
    recording: &MegRecording,
    info: &ExptInfo,
    paths: &ArtifactPaths,
    annotator: &mut A,
    ica: &mut I,
    prompt: &mut Prompt<R, W>,
) -> Result<ArtifactOutcome, AnalysisError>
where
    A: BadSegmentAnnotator + ?Sized,
    I: IcaBackend + ?Sized,
    R: BufRead,
    W: Write,
{
    let events = recording.events(info.stim_mask);
    let onsets = samples_with_code(
        events.iter().copied().map(Trigger::from),
        info.code(triggers::STIMULI)?,
    );
    let initial = out_of_trial(
        &onsets,
        recording.first_sample(),
        recording.last_sample(),
        recording.sfreq(),
        info.pre_stim_dur,
        info.stim_dur,
    );
    info!(trials = onsets.len(), segments = initial.len(), "marked out-of-trial data");

    let annotations = if paths.annotations.is_file() {
        match ask_overwrite(prompt, &paths.annotations)? {
            OverwriteAnswer::Keep => {
                info!("keeping existing artifact annotations");
                read_annotations(&paths.annotations)?
            }
            OverwriteAnswer::Overwrite => {
                info!("creating new artifact annotations");
                let annotations = annotator.annotate(recording, &initial)?;
                write_annotations(&annotations, &paths.annotations)?;
                annotations
            }
            OverwriteAnswer::Unrecognized(answer) => {
                warn!(%answer, "option not recognized, nothing written");
                return Ok(ArtifactOutcome::Aborted);
            }
        }
    } else {
        let annotations = annotator.annotate(recording, &initial)?;
        ensure_parent(&paths.annotations)?;
        write_annotations(&annotations, &paths.annotations)?;
        annotations
    };

    let decimated = recording.sensors.decimate(ICA_DECIMATION)?;
    let model = ica.fit(&decimated, &annotations)?;
    ensure_parent(&paths.ica)?;
    model.save(&paths.ica)?;

    Ok(ArtifactOutcome::Completed {
        annotations,
        ica: model,
    })
}

/// Exchanges annotations with an external viewer through a CSV file: the
/// initial set is written out, the operator edits it and confirms, and the
/// edited file is read back.
pub struct FileAnnotator<R, W> {
    pub scratch: PathBuf,
    pub prompt: Prompt<R, W>,
}

impl<R: BufRead, W: Write> BadSegmentAnnotator for FileAnnotator<R, W> {
    fn annotate(
        &mut self,
        _recording: &MegRecording,
        initial: &[Annotation],
    ) -> Result<Vec<Annotation>, AnalysisError> {
        write_annotations(initial, &self.scratch)?;
        self.prompt
            .ask(&format!(
                "Mark bad segments in {} and press ENTER when finished tagging artifacts",
                self.scratch.display()
            ))
            .map_err(|e| AnalysisError::io(&self.scratch, e))?;
        read_annotations(&self.scratch)
    }
}

#[derive(Serialize)]
struct IcaRequest<'a> {
    data: &'a SensorData,
    annotations: &'a [Annotation],
}

/// Runs an external ICA program as `<program> [args] <request.json>
/// <model.json>`. The request holds the sensor data and annotations; the
/// program writes an [`IcaModel`].
#[derive(Debug, Clone)]
pub struct CommandIca {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl IcaBackend for CommandIca {
    fn fit(
        &mut self,
        data: &SensorData,
        annotations: &[Annotation],
    ) -> Result<IcaModel, AnalysisError> {
        let request = self.work_dir.join("ica-request.json");
        let response = self.work_dir.join("ica-model.json");
        {
            let file = File::create(&request).map_err(|e| AnalysisError::io(&request, e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &IcaRequest { data, annotations })?;
            writer.flush().map_err(|e| AnalysisError::io(&request, e))?;
        }

        info!(program = %self.program.display(), channels = data.channel_names.len(), "fitting ICA");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&request)
            .arg(&response)
            .status()
            .map_err(|e| AnalysisError::Ica(format!("{}: {e}", self.program.display())))?;
        if !status.success() {
            return Err(AnalysisError::Ica(format!(
                "{} exited with {status}",
                self.program.display()
            )));
        }
        IcaModel::load(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_answers() {
        assert_eq!(OverwriteAnswer::parse(""), OverwriteAnswer::Keep);
        assert_eq!(OverwriteAnswer::parse("n"), OverwriteAnswer::Keep);
        assert_eq!(OverwriteAnswer::parse("N"), OverwriteAnswer::Keep);
        assert_eq!(OverwriteAnswer::parse("Y"), OverwriteAnswer::Overwrite);
        assert_eq!(
            OverwriteAnswer::parse("yes"),
            OverwriteAnswer::Unrecognized("yes".into())
        );
    }

    #[test]
    fn prompt_shows_question_and_trims_answer() {
        let mut out = Vec::new();
        let mut prompt = Prompt::new(&b"  y \n"[..], &mut out);
        let answer = ask_overwrite(&mut prompt, Path::new("annotations/s01.csv")).unwrap();
        assert_eq!(answer, OverwriteAnswer::Overwrite);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("already exist: annotations/s01.csv"));
        assert!(shown.ends_with("Overwrite? (y/n): "));
    }

    #[test]
    fn closed_input_keeps_existing() {
        let mut prompt = Prompt::new(&b""[..], Vec::new());
        assert_eq!(
            ask_overwrite(&mut prompt, Path::new("a.csv")).unwrap(),
            OverwriteAnswer::Keep
        );
    }
}
