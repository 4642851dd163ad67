//! Writing run outputs to disk.
//!
//! Every artifact of a run is first written to a temporary file in the
//! output directory. The files are renamed to their final names only after
//! all of them were written, so a failed run leaves no partial outputs.

mod tables;
mod text;

pub use tables::{write_curve, write_neutral_records, write_outliers, DIFFERENCE_COLUMN};
pub use text::render_report;

use crate::error::Result;
use crate::pipeline::PipelineRun;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Paths of the files written for one run.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub report: PathBuf,
    pub full_non_neutral: PathBuf,
    pub outliers: PathBuf,
    pub occurrence: PathBuf,
    pub curve: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    /// Output paths for a run, `<dir>/<stem><suffix>`.
    pub fn new(dir: &Path, stem: &str) -> Self {
        let path = |suffix: &str| dir.join(format!("{}{}", stem, suffix));
        Self {
            report: path(".txt"),
            full_non_neutral: path("_FullNonNeutral.csv"),
            outliers: path("_NonNeutral_Outliers.csv"),
            occurrence: path("_Occurrence.tsv"),
            curve: path("_NeutralCurve.tsv"),
            summary: path("_summary.json"),
        }
    }

    /// All paths, in write order.
    pub fn all(&self) -> [&Path; 6] {
        [
            &self.report,
            &self.full_non_neutral,
            &self.outliers,
            &self.occurrence,
            &self.curve,
            &self.summary,
        ]
    }
}

fn staged<F>(dir: &Path, write: F) -> Result<NamedTempFile>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut file);
        write(&mut writer)?;
        writer.flush()?;
    }
    Ok(file)
}

/// Write every output of a run into `dir`, creating it if needed.
pub fn write_outputs(run: &PipelineRun, dir: &Path) -> Result<OutputPaths> {
    fs::create_dir_all(dir)?;
    let paths = OutputPaths::new(dir, &run.run_id.file_stem());

    let files = vec![
        staged(dir, |w| {
            w.write_all(render_report(run).as_bytes())?;
            Ok(())
        })?,
        staged(dir, |w| {
            write_neutral_records(w, &run.full_non_neutral, &run.rank_names, b',')
        })?,
        staged(dir, |w| write_outliers(w, &run.outliers, &run.rank_names))?,
        staged(dir, |w| {
            write_neutral_records(w, &run.records, &run.rank_names, b'\t')
        })?,
        staged(dir, |w| write_curve(w, &run.curve))?,
        staged(dir, |w| {
            serde_json::to_writer_pretty(&mut *w, &run.summary())?;
            Ok(())
        })?,
    ];

    let mut persisted: Vec<&Path> = Vec::with_capacity(files.len());
    for (file, path) in files.into_iter().zip(paths.all()) {
        if let Err(e) = file.persist(path) {
            // Undo the renames already done so no partial set is left behind
            for done in &persisted {
                if let Err(remove_err) = fs::remove_file(done) {
                    log::warn!("Could not remove {}: {}", done.display(), remove_err);
                }
            }
            return Err(e.into());
        }
        persisted.push(path);
    }

    log::info!("Wrote outputs for {} to {}", run.run_id, dir.display());
    Ok(paths)
}
