//! Human-readable fit report.

use crate::pipeline::PipelineRun;
use std::fmt::Write;

/// Render the report of a run.
///
/// The report lists the input file, the read totals per sample, how the
/// rarefaction depth was chosen, the fit statistics and R².
pub fn render_report(run: &PipelineRun) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, run);
    out
}

fn write_report(out: &mut String, run: &PipelineRun) -> std::fmt::Result {
    if let Some(path) = &run.data_file {
        writeln!(out, "Corresponding csv file: {}", path.display())?;
    }
    if run.ignore_filter.n_removed() > 0 {
        writeln!(
            out,
            "ignoring {} otus with at most {} reads",
            run.ignore_filter.n_removed(),
            run.ignore_filter.ignore_level
        )?;
    }
    write!(out, "{}", run.library_sizes)?;
    writeln!(out)?;

    writeln!(out, "{} ", run.depth)?;
    if let crate::normalize::DepthChoice::FallbackToMinimum { requested } = run.depth.choice {
        writeln!(
            out,
            "requested rarefaction level {} exceeds every sample total; used the smallest sample total instead",
            requested
        )?;
    }

    writeln!(
        out,
        "fitting neutral expectation to dataset with {} samples and {} otus \n ",
        run.n_samples, run.n_taxa
    )?;
    write!(out, "{}", run.fit)?;
    writeln!(out, "\n R^2 = {:.2}", run.fit.r_squared)?;
    Ok(())
}
