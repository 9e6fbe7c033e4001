//! Run a full COCO evaluation for one ground-truth file and one submission file.

use crate::error::{CocoEvalError, Result};
use crate::evaluator::CocoEval;
use crate::index::CocoIndex;
use crate::loader::{is_json_submission, load_results_from_file};
use crate::params::IouType;
use crate::stats::Stats;
use std::path::Path;
use tracing::debug;

/// Evaluate a submission against the ground truth and return the summary statistics.
///
/// The submission must be a `.json` file; anything else is rejected before the
/// file is opened.
pub fn get_precisions<P, Q>(gt_file: P, result_file: Q, metric: IouType) -> Result<Stats>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let gt = CocoIndex::from_file(gt_file.as_ref())?;

    let result_file = result_file.as_ref();
    if !is_json_submission(result_file) {
        return Err(CocoEvalError::UnsupportedSubmissionFormat(
            result_file.display().to_string(),
        ));
    }

    let records = load_results_from_file(result_file)?;
    debug!(records = records.len(), "loaded submission");
    let dt = gt.load_res(records)?;

    let mut eval = CocoEval::new(&gt, &dt, metric);
    eval.evaluate()?;
    eval.accumulate()?;
    eval.summarize()?;
    eval.stats()
}
