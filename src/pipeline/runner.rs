//! Pipeline runner: ignore level, rarefaction, occurrence, fit, classification.

use crate::classify::{
    annotate_neutral, full_non_neutral, most_non_neutral, neutral_band,
    DEFAULT_OUTLIER_THRESHOLD,
};
use crate::data::{CountMatrix, FeatureTable, TaxonomyTable};
use crate::error::{ComadError, Result};
use crate::filter::filter_ignore_level_with_stats;
use crate::model::{fit_neutral_model, FitConfig};
use crate::normalize::rarefy_to_uniform_depth;
use crate::pipeline::run::{PipelineRun, RunId};
use crate::profile::{profile_library_size, profile_occurrence};
use crate::report::{write_outputs, OutputPaths};
use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of a neutral-model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeufitConfig {
    /// Dataset nickname; prefixes every output file.
    pub name: String,
    /// Taxa with at most this many reads in total are dropped. Must be non-negative.
    pub ignore_level: i64,
    /// Reads per sample after rarefaction; 0 picks the smallest sample total.
    /// Must be non-negative.
    pub rarefaction_level: i64,
    /// Seed for rarefaction. Without one every run draws a fresh subsample.
    pub seed: Option<u64>,
    /// |occurrence − prediction| above which a taxon is an outlier.
    pub outlier_threshold: f64,
    /// Significance level of the Wilson band.
    pub confidence_alpha: f64,
    pub fit: FitConfig,
    /// Grid size of the exported neutral curve.
    pub curve_points: usize,
}

impl Default for NeufitConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            ignore_level: 0,
            rarefaction_level: 0,
            seed: None,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            confidence_alpha: 0.05,
            fit: FitConfig::default(),
            curve_points: 1000,
        }
    }
}

impl NeufitConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ComadError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ComadError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}

fn non_negative(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        ComadError::InvalidParameter(format!("{} must be non-negative, got {}", what, value))
    })
}

/// Builder for configuring and running the neutral-model pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: NeufitConfig,
    timestamp: Option<DateTime<Local>>,
}

impl Pipeline {
    /// Create a pipeline with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a config.
    pub fn from_config(config: &NeufitConfig) -> Self {
        Self {
            config: config.clone(),
            timestamp: None,
        }
    }

    /// Export the current settings.
    pub fn to_config(&self) -> NeufitConfig {
        self.config.clone()
    }

    /// Set the dataset nickname.
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    /// Drop taxa with at most `level` reads before rarefaction.
    pub fn ignore_level(mut self, level: i64) -> Self {
        self.config.ignore_level = level;
        self
    }

    /// Rarefy to `level` reads per sample; 0 picks the smallest sample total.
    pub fn rarefaction_level(mut self, level: i64) -> Self {
        self.config.rarefaction_level = level;
        self
    }

    /// Make rarefaction reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Set the difference a taxon must exceed to count as an outlier.
    pub fn outlier_threshold(mut self, threshold: f64) -> Self {
        self.config.outlier_threshold = threshold;
        self
    }

    /// Set the significance level of the Wilson band (0.05 gives a 95% interval).
    pub fn confidence_alpha(mut self, alpha: f64) -> Self {
        self.config.confidence_alpha = alpha;
        self
    }

    /// Set the starting value and solver settings for the fit.
    pub fn fit_config(mut self, fit: FitConfig) -> Self {
        self.config.fit = fit;
        self
    }

    /// Set the number of grid points in the exported neutral curve.
    pub fn curve_points(mut self, points: usize) -> Self {
        self.config.curve_points = points;
        self
    }

    /// Fix the run timestamp instead of using the current time.
    pub fn timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check the settings, returning the ignore and rarefaction levels.
    ///
    /// Both levels are checked independently; nothing is read or written
    /// before this succeeds.
    pub fn validate(&self) -> Result<(u64, u64)> {
        let ignore_level = non_negative(self.config.ignore_level, "ignore_level")?;
        let rarefaction_level = non_negative(self.config.rarefaction_level, "rarefaction_level")?;

        if self.config.name.is_empty() {
            return Err(ComadError::InvalidParameter(
                "Dataset name must not be empty".to_string(),
            ));
        }
        if !(self.config.outlier_threshold >= 0.0 && self.config.outlier_threshold <= 1.0) {
            return Err(ComadError::InvalidParameter(format!(
                "Outlier threshold must be in [0, 1], got {}",
                self.config.outlier_threshold
            )));
        }
        if !(self.config.confidence_alpha > 0.0 && self.config.confidence_alpha < 1.0) {
            return Err(ComadError::InvalidParameter(format!(
                "Confidence alpha must be in (0, 1), got {}",
                self.config.confidence_alpha
            )));
        }
        if self.config.curve_points < 2 {
            return Err(ComadError::InvalidParameter(format!(
                "Curve needs at least 2 points, got {}",
                self.config.curve_points
            )));
        }

        Ok((ignore_level, rarefaction_level))
    }

    fn run_id(&self) -> RunId {
        match self.timestamp {
            Some(timestamp) => RunId::new(&self.config.name, timestamp),
            None => RunId::now(&self.config.name),
        }
    }

    /// Run on in-memory data, rarefying with the configured seed.
    pub fn run(&self, counts: &CountMatrix, taxonomy: Option<&TaxonomyTable>) -> Result<PipelineRun> {
        match self.config.seed {
            Some(seed) => self.run_with_rng(counts, taxonomy, &mut StdRng::seed_from_u64(seed)),
            None => self.run_with_rng(counts, taxonomy, &mut StdRng::from_entropy()),
        }
    }

    /// Run on in-memory data with an explicit random source for rarefaction.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        counts: &CountMatrix,
        taxonomy: Option<&TaxonomyTable>,
        rng: &mut R,
    ) -> Result<PipelineRun> {
        let (ignore_level, rarefaction_level) = self.validate()?;
        let run_id = self.run_id();
        log::info!("Running dataset: {}", self.config.name);

        let (filtered, ignore_filter) = filter_ignore_level_with_stats(counts, ignore_level)?;
        let library_sizes = profile_library_size(&filtered);

        let rarefied = rarefy_to_uniform_depth(&filtered, rarefaction_level, rng)?;
        let n_reads = rarefied.depth.depth;
        let n_samples = rarefied.counts.n_samples();
        let n_taxa = rarefied.counts.n_taxa();
        log::info!("{}", rarefied.depth);
        log::info!(
            "Fitting neutral expectation to dataset with {} samples and {} otus",
            n_samples,
            n_taxa
        );

        let occurrence = profile_occurrence(&rarefied.counts, n_reads, taxonomy)?;
        let fit = fit_neutral_model(&occurrence, n_reads, &self.config.fit)
            .map_err(|e| e.in_run(&run_id.to_string()))?;
        log::info!("Fitted m = {:.6}, R^2 = {:.2}", fit.m, fit.r_squared);

        let alpha = self.config.confidence_alpha;
        let records = annotate_neutral(&occurrence, &fit, n_samples, alpha)?;
        let full = full_non_neutral(&records);
        let outliers = most_non_neutral(&records, self.config.outlier_threshold);
        log::info!(
            "{} taxa outside the confidence band, {} beyond the outlier threshold",
            full.len(),
            outliers.len()
        );

        let min_abundance = occurrence
            .first()
            .map(|r| r.mean_abundance)
            .ok_or_else(|| ComadError::EmptyData("No taxa after rarefaction".to_string()))?;
        let curve = neutral_band(&fit, n_samples, min_abundance, self.config.curve_points, alpha)
            .map_err(|e| e.in_run(&run_id.to_string()))?;

        Ok(PipelineRun {
            run_id,
            data_file: None,
            ignore_filter,
            library_sizes,
            depth: rarefied.depth,
            resampled: rarefied.resampled,
            n_samples,
            n_taxa,
            rank_names: taxonomy
                .map(|t| t.rank_names().to_vec())
                .unwrap_or_default(),
            records,
            fit,
            full_non_neutral: full,
            outliers,
            outlier_threshold: self.config.outlier_threshold,
            curve,
        })
    }

    /// Run from pre-extracted data and taxonomy tables and write every output
    /// under `<output_dir>/<name>/`.
    pub fn run_files(
        &self,
        data_path: &Path,
        taxonomy_path: Option<&Path>,
        output_dir: &Path,
    ) -> Result<(PipelineRun, OutputPaths)> {
        self.validate()?;

        let counts = CountMatrix::from_tsv(data_path)?;
        let taxonomy = taxonomy_path.map(TaxonomyTable::from_tsv).transpose()?;

        let mut run = self.run(&counts, taxonomy.as_ref())?;
        run.data_file = Some(data_path.to_path_buf());

        let paths = write_outputs(&run, &self.output_folder(output_dir))
            .map_err(|e| e.in_run(&run.run_id.to_string()))?;
        Ok((run, paths))
    }

    /// Ingest a feature table, extract its data and taxonomy tables and run on them.
    pub fn run_feature_table(
        &self,
        feature_table: &Path,
        output_dir: &Path,
    ) -> Result<(PipelineRun, OutputPaths)> {
        self.validate()?;

        let table = FeatureTable::from_tsv(feature_table)?;
        let mut run = self.run(&table.counts, table.taxonomy.as_ref())?;
        let run_id = run.run_id.to_string();

        // The extracted tables are only written once the run has succeeded
        let folder = self.output_folder(output_dir);
        let extracted = table
            .write_data_taxonomy(&folder, &self.config.name)
            .map_err(|e| e.in_run(&run_id))?;
        log::info!("Extracted data table to {}", extracted.data_path.display());
        run.data_file = Some(extracted.data_path.clone());

        match write_outputs(&run, &folder) {
            Ok(paths) => Ok((run, paths)),
            Err(e) => {
                let written = std::iter::once(&extracted.data_path).chain(&extracted.taxonomy_path);
                for path in written {
                    if let Err(remove_err) = std::fs::remove_file(path) {
                        log::warn!("Could not remove {}: {}", path.display(), remove_err);
                    }
                }
                Err(e.in_run(&run_id))
            }
        }
    }

    /// Folder holding every output of this dataset.
    pub fn output_folder(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.config.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Lineage;

    fn create_test_counts() -> CountMatrix {
        // 30 taxa × 12 samples with abundances spread over three orders of magnitude
        let n_taxa = 30;
        let n_samples = 12;
        let rows: Vec<Vec<u64>> = (0..n_taxa)
            .map(|t| {
                (0..n_samples)
                    .map(|s| {
                        let base = (t * t) as u64;
                        if (t + s) % (1 + t / 6) == 0 {
                            base + (s as u64 % 3) + 1
                        } else {
                            0
                        }
                    })
                    .collect()
            })
            .collect();
        let taxon_ids = (0..n_taxa).map(|i| format!("otu_{}", i)).collect();
        let sample_ids = (0..n_samples).map(|i| format!("S{}", i)).collect();
        CountMatrix::from_rows(&rows, taxon_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_pipeline_run() {
        let counts = create_test_counts();
        let run = Pipeline::new().name("test").seed(7).run(&counts, None).unwrap();

        assert_eq!(run.n_samples, 12);
        assert_eq!(run.records.len(), run.n_taxa);
        assert_eq!(run.fit.best_fit.len(), run.n_taxa);
        assert!(run.fit.m > 0.0 && run.fit.m < 1.0);
        assert!(run.r_squared() <= 1.0);
        assert_eq!(run.curve.len(), 1000);
        assert!(run.rank_names.is_empty());

        for pair in run.records.windows(2) {
            assert!(pair[0].record.mean_abundance <= pair[1].record.mean_abundance);
        }
        for r in &run.records {
            assert!(r.lower_conf_int <= r.predicted_occurrence);
            assert!(r.predicted_occurrence <= r.upper_conf_int);
        }
        for o in &run.outliers {
            assert!(o.difference > 0.5);
        }
    }

    #[test]
    fn test_seed_makes_runs_reproducible() {
        let counts = create_test_counts();
        let pipeline = Pipeline::new().name("test").rarefaction_level(20).seed(11);
        let first = pipeline.run(&counts, None).unwrap();
        let second = pipeline.run(&counts, None).unwrap();

        assert_eq!(first.records, second.records);
        assert_eq!(first.fit.m, second.fit.m);
    }

    #[test]
    fn test_negative_levels_rejected_independently() {
        let counts = create_test_counts();

        let err = Pipeline::new().ignore_level(-1).run(&counts, None).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("ignore_level"));

        let err = Pipeline::new().rarefaction_level(-1).run(&counts, None).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("rarefaction_level"));
    }

    #[test]
    fn test_fallback_depth_recorded() {
        let counts = create_test_counts();
        let max_total = *counts.col_sums().iter().max().unwrap();
        let run = Pipeline::new()
            .rarefaction_level(max_total as i64 + 1)
            .seed(3)
            .run(&counts, None)
            .unwrap();

        assert!(run.depth.is_fallback());
        assert_eq!(run.n_reads(), *counts.col_sums().iter().min().unwrap());
    }

    #[test]
    fn test_taxonomy_ranks_carried() {
        let counts = create_test_counts();
        let mut taxonomy = TaxonomyTable::with_default_ranks();
        taxonomy.insert("otu_29", Lineage::parse("k__Bacteria; p__Bacteroidetes", 7));

        let run = Pipeline::new().seed(1).run(&counts, Some(&taxonomy)).unwrap();
        assert_eq!(run.rank_names.len(), 7);
        let annotated = run.records.iter().find(|r| r.record.otu_id == "otu_29").unwrap();
        assert_eq!(annotated.record.lineage.as_ref().unwrap().rank(1), "p__Bacteroidetes");
        let unannotated = run.records.iter().find(|r| r.record.otu_id == "otu_0").unwrap();
        assert!(unannotated.record.lineage.is_none());
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let pipeline = Pipeline::new()
            .name("gut")
            .ignore_level(5)
            .rarefaction_level(1000)
            .seed(42)
            .outlier_threshold(0.4);

        let yaml = pipeline.to_config().to_yaml().unwrap();
        let parsed = NeufitConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.name, "gut");
        assert_eq!(parsed.ignore_level, 5);
        assert_eq!(parsed.rarefaction_level, 1000);
        assert_eq!(parsed.seed, Some(42));
        assert_eq!(parsed.outlier_threshold, 0.4);
        assert_eq!(parsed.fit.initial_m, 0.5);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = NeufitConfig::from_yaml("name: soil\nrarefaction_level: 500\n").unwrap();
        assert_eq!(config.name, "soil");
        assert_eq!(config.rarefaction_level, 500);
        assert_eq!(config.ignore_level, 0);
        assert_eq!(config.curve_points, 1000);
        assert_eq!(config.fit.solver.max_iter, 200);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(Pipeline::new().outlier_threshold(1.5).validate().is_err());
        assert!(Pipeline::new().confidence_alpha(0.0).validate().is_err());
        assert!(Pipeline::new().curve_points(1).validate().is_err());
        assert!(Pipeline::new().name("").validate().is_err());
        assert_eq!(Pipeline::new().ignore_level(3).validate().unwrap(), (3, 0));
    }
}
