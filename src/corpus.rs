//! Corpus traversal and per-binary evaluation.
//!
//! A corpus is laid out as
//!
//! ```text
//! <root>/bin/<dir>/<file>              binaries under evaluation
//! <root>/gt/<dir>/<file>.sqlite        ground truth
//! <root>/<tool dir>/<dir>/<output>     one output file per tool
//! ```
//!
//! Binaries without ground truth are skipped. Files are evaluated in
//! parallel; each task builds its own decoder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::decoder::CapstoneDecoder;
use crate::diagnostics::{DiagnosticEntry, DiagnosticReporter, ResolutionContext};
use crate::matcher::MatchPass;
use crate::model::{Candidates, FunctionRanges, GroundTruth, MatchOutcome};
use crate::parser::{BinaryImage, ObjectFormat};
use crate::source::{read_candidates, GroundTruthDb};
use crate::tools::ToolSpec;
use crate::{Architecture, EvalResult};

const BIN_DIR: &str = "bin";
const GT_DIR: &str = "gt";
const GT_EXTENSION: &str = "sqlite";

/// Paths inside a corpus root.
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl CorpusLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn binary_path(&self, target: &Target) -> PathBuf {
        self.root.join(BIN_DIR).join(&target.dir).join(&target.file)
    }

    pub fn ground_truth_path(&self, target: &Target) -> PathBuf {
        self.root
            .join(GT_DIR)
            .join(&target.dir)
            .join(format!("{}.{}", target.file, GT_EXTENSION))
    }

    pub fn tool_output_path(&self, tool: &ToolSpec, target: &Target) -> PathBuf {
        self.root
            .join(&tool.dir)
            .join(&target.dir)
            .join(tool.output_name(&target.file))
    }

    /// Sub-directories of `bin/`, sorted by name.
    pub fn dirs(&self) -> EvalResult<Vec<String>> {
        list_entries(&self.root.join(BIN_DIR), true)
    }

    /// Binaries in `bin/<dir>/`, sorted by name.
    pub fn files(&self, dir: &str) -> EvalResult<Vec<String>> {
        list_entries(&self.root.join(BIN_DIR).join(dir), false)
    }

    /// The binaries to evaluate. `single_file` only applies together with
    /// `single_dir`.
    pub fn targets(&self, single_dir: Option<&str>, single_file: Option<&str>) -> EvalResult<Vec<Target>> {
        let dirs = match single_dir {
            Some(dir) => vec![dir.to_string()],
            None => self.dirs()?,
        };

        let mut targets = Vec::new();
        for dir in dirs {
            let files = match (single_dir, single_file) {
                (Some(_), Some(file)) => vec![file.to_string()],
                _ => self.files(&dir)?,
            };
            targets.extend(files.into_iter().map(|file| Target::new(&dir, &file)));
        }
        Ok(targets)
    }
}

fn list_entries(path: &Path, want_dirs: bool) -> EvalResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() != want_dirs {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        } else {
            log::warn!("skipping non UTF-8 name in {}", path.display());
        }
    }
    names.sort();
    Ok(names)
}

/// One binary of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub dir: String,
    pub file: String,
}

impl Target {
    pub fn new(dir: &str, file: &str) -> Self {
        Self {
            dir: dir.to_string(),
            file: file.to_string(),
        }
    }

    /// `<dir>/<file>`, as printed in reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.dir, self.file)
    }
}

/// Settings shared by every evaluated binary.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub tools: Vec<ToolSpec>,
    /// Resolve each mismatch to an instruction
    pub diagnostics: bool,
    /// ISA used to decode mismatches
    pub resolver_arch: Architecture,
    /// Object format the binaries are expected to have
    pub expected_format: Option<ObjectFormat>,
    /// Replaces every tool's own address offset when set
    pub address_offset: Option<i64>,
}

/// Scores of one tool on one binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub tool: String,
    pub column: String,
    pub outcome: MatchOutcome,
    /// Empty unless diagnostics were requested
    pub diagnostics: Vec<DiagnosticEntry>,
}

/// Scores of every tool on one binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub target: Target,
    /// Ground-truth instructions a tool is required to find
    pub mandatory: usize,
    pub tools: Vec<ToolReport>,
}

/// Evaluate every target in parallel, in input order. Targets that cannot be
/// evaluated are logged and left out.
pub fn evaluate_corpus(layout: &CorpusLayout, targets: &[Target], opts: &EvalOptions) -> Vec<FileReport> {
    let start_time = Instant::now();
    let reports: Vec<FileReport> = targets
        .par_iter()
        .filter_map(|target| match evaluate_target(layout, target, opts) {
            Ok(Some(report)) => Some(report),
            Ok(None) => None,
            Err(e) => {
                log::warn!("skipping {}: {}", target.label(), e);
                None
            }
        })
        .collect();
    log::info!(
        "evaluated {} of {} binaries in {:?}",
        reports.len(),
        targets.len(),
        start_time.elapsed()
    );
    reports
}

/// Evaluate one binary against every configured tool. Returns `None` when the
/// binary has no ground truth.
pub fn evaluate_target(layout: &CorpusLayout, target: &Target, opts: &EvalOptions) -> EvalResult<Option<FileReport>> {
    let gt_path = layout.ground_truth_path(target);
    if !gt_path.exists() {
        log::debug!("no ground truth for {}", target.label());
        return Ok(None);
    }
    let (truth, ranges) = GroundTruthDb::open(&gt_path)?.load()?;

    let image = if opts.diagnostics {
        load_image(layout, target, opts)
    } else {
        None
    };
    let decoder = if image.is_some() {
        match CapstoneDecoder::for_architecture(opts.resolver_arch) {
            Ok(decoder) => Some(decoder),
            Err(e) => {
                log::warn!("diagnostics for {} without instruction text: {}", target.label(), e);
                None
            }
        }
    } else {
        None
    };
    let reporter = match (&image, &decoder) {
        (Some(image), Some(decoder)) => DiagnosticReporter::new(ResolutionContext {
            resolver: decoder,
            space: &image.space,
            image: &image.data,
        }),
        _ => DiagnosticReporter::address_only(),
    };

    let tools = opts
        .tools
        .iter()
        .map(|tool| {
            let candidates = load_candidates(layout, tool, target);
            let offset = opts.address_offset.unwrap_or(tool.address_offset);
            score_tool(tool, &truth, &candidates, &ranges, offset, opts.diagnostics.then_some(&reporter))
        })
        .collect();

    Ok(Some(FileReport {
        target: target.clone(),
        mandatory: truth.mandatory_count(),
        tools,
    }))
}

fn score_tool(
    tool: &ToolSpec,
    truth: &GroundTruth,
    candidates: &Candidates,
    ranges: &FunctionRanges,
    address_offset: i64,
    reporter: Option<&DiagnosticReporter<'_>>,
) -> ToolReport {
    let mut pass = MatchPass::new(truth, candidates, ranges, address_offset);
    let diagnostics = match reporter {
        Some(reporter) => reporter.render_all(&mut pass),
        None => {
            pass.by_ref().for_each(drop);
            Vec::new()
        }
    };
    if pass.unscored_candidates() > 0 {
        log::debug!(
            "{}: {} candidates left unscored past the last ground truth or function body",
            tool.name,
            pass.unscored_candidates()
        );
    }
    ToolReport {
        tool: tool.name.clone(),
        column: tool.column.clone(),
        outcome: pass.outcome(),
        diagnostics,
    }
}

/// A tool without output for this binary reported nothing.
fn load_candidates(layout: &CorpusLayout, tool: &ToolSpec, target: &Target) -> Candidates {
    let path = layout.tool_output_path(tool, target);
    if !path.exists() {
        log::warn!("{}: no output for {} at {}", tool.name, target.label(), path.display());
        return Candidates::default();
    }
    match read_candidates(&path, tool.format) {
        Ok(candidates) => candidates,
        Err(e) => {
            log::warn!("{}: unreadable output for {}: {}", tool.name, target.label(), e);
            Candidates::default()
        }
    }
}

fn load_image(layout: &CorpusLayout, target: &Target, opts: &EvalOptions) -> Option<BinaryImage> {
    let path = layout.binary_path(target);
    match BinaryImage::load(&path) {
        Ok(image) => {
            check_architecture(&target.label(), &image, opts.resolver_arch);
            if let Some(expected) = opts.expected_format.filter(|f| *f != image.format) {
                log::warn!(
                    "{} is {} but the target triple expects {}",
                    target.label(),
                    image.format,
                    expected
                );
            }
            Some(image)
        }
        Err(e) => {
            log::warn!("diagnostics for {} without instruction text: {}", target.label(), e);
            None
        }
    }
}

/// Warn when mismatches would be decoded with a different ISA than the
/// binary declares. Returns whether the two agree.
pub fn check_architecture(label: &str, image: &BinaryImage, resolver_arch: Architecture) -> bool {
    if image.architecture == Architecture::Unknown || image.architecture == resolver_arch {
        return true;
    }
    log::warn!(
        "{} is {} but instructions are decoded as {}",
        label,
        image.architecture,
        resolver_arch
    );
    false
}
