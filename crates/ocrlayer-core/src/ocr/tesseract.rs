//! Recognition through the `tesseract` command-line tool.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, trace};

use super::Recognizer;
use crate::error::OcrError;
use crate::models::{OcrConfig, PixelBox, WordRecord};

/// TSV level of word rows.
const WORD_LEVEL: &str = "5";

/// Check a language code before it is passed on the command line.
///
/// Accepts codes such as "eng", "chi_sim" or "eng+deu".
pub fn validate_language(lang: &str) -> Result<(), OcrError> {
    if lang.is_empty() || lang.len() > 20 {
        return Err(OcrError::Language(format!(
            "invalid language code length: {:?}",
            lang
        )));
    }
    if let Some(c) = lang
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '+' && *c != '_')
    {
        return Err(OcrError::Language(format!(
            "invalid character {:?} in language code {:?}",
            c, lang
        )));
    }
    Ok(())
}

/// Engine that shells out to tesseract for every page.
///
/// Page runs are killed once they exceed the time limit, so a stuck
/// process never outlives its page.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
    dpi: u32,
    time_limit: Option<Duration>,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig, dpi: u32) -> Result<Self, OcrError> {
        validate_language(&config.language)?;
        Ok(Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            dpi,
            time_limit: None,
        })
    }

    /// Kill page runs that take longer than `limit`.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// The tesseract version string, or `Unavailable` if it cannot be run.
    pub fn version(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| OcrError::Unavailable(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(OcrError::Unavailable(format!(
                "{} --version exited with {}",
                self.binary, output.status
            )));
        }

        // Older releases print the banner on stderr.
        let text = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&text)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Installed language packs.
    pub fn available_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| OcrError::Unavailable(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(OcrError::Unavailable(format!(
                "{} --list-langs exited with {}",
                self.binary, output.status
            )));
        }

        // First line is a header ("List of available languages ...").
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// True when every `+`-separated part of the configured language is installed.
    pub fn language_installed(&self) -> Result<bool, OcrError> {
        let installed = self.available_languages()?;
        Ok(self
            .language
            .split('+')
            .all(|lang| installed.iter().any(|l| l == lang)))
    }
}

impl Recognizer for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<WordRecord>, OcrError> {
        let start = Instant::now();

        let input = tempfile::Builder::new()
            .prefix("ocrlayer-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Recognition(format!("failed to create temp file: {}", e)))?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Recognition(format!("failed to write page image: {}", e)))?;

        let output = self.run_page(input.path())?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "tesseract recognized {} words in {}ms",
            words.len(),
            start.elapsed().as_millis()
        );
        Ok(words)
    }
}

impl TesseractEngine {
    /// Run tesseract on one page image, killing it past the time limit.
    ///
    /// Called from a blocking thread; the child is driven by the ambient
    /// tokio runtime so dropping the wait on timeout kills it.
    fn run_page(&self, image: &Path) -> Result<Output, OcrError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            OcrError::Recognition("tesseract must run inside a tokio runtime".to_string())
        })?;

        runtime.block_on(async {
            let mut command = tokio::process::Command::new(&self.binary);
            command
                .arg(image)
                .arg("stdout")
                .args(["-l", &self.language])
                .args(["--dpi", &self.dpi.to_string()])
                .arg("tsv")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let child = command.spawn().map_err(|e| {
                OcrError::Unavailable(format!("failed to run {}: {}", self.binary, e))
            })?;
            let output = child.wait_with_output();

            let output = match self.time_limit {
                Some(limit) => tokio::time::timeout(limit, output).await.map_err(|_| {
                    OcrError::Recognition(format!(
                        "tesseract killed after {:.1}s",
                        limit.as_secs_f64()
                    ))
                })?,
                None => output.await,
            };
            output.map_err(|e| OcrError::Recognition(format!("failed to wait for tesseract: {}", e)))
        })
    }
}

/// Parse tesseract TSV output into word records.
fn parse_tsv(tsv: &str) -> Result<Vec<WordRecord>, OcrError> {
    let mut lines = tsv.lines();

    let header = lines
        .next()
        .ok_or_else(|| OcrError::Output("empty TSV output".to_string()))?;
    if !header.starts_with("level") {
        return Err(OcrError::Output(format!("unexpected TSV header: {:?}", header)));
    }

    let mut words = Vec::new();
    for (n, line) in lines.enumerate() {
        let fields: Vec<&str> = line.splitn(12, '\t').collect();
        if fields.len() < 11 || fields[0] != WORD_LEVEL {
            continue;
        }

        let text = fields.get(11).map(|t| t.trim()).unwrap_or_default();
        let number = |i: usize| -> Result<f64, OcrError> {
            fields[i].trim().parse::<f64>().map_err(|_| {
                OcrError::Output(format!("line {}: bad numeric field {:?}", n + 2, fields[i]))
            })
        };

        let confidence = number(10)?;
        if confidence < 0.0 || text.is_empty() {
            trace!("Skipping TSV row {}", n + 2);
            continue;
        }

        let bbox = PixelBox::new(number(6)?, number(7)?, number(8)?, number(9)?);
        words.push(WordRecord::new(text, bbox, (confidence / 100.0) as f32));
    }

    Ok(words)
}
