//! Phase-aware entry point used by the challenge host.
//!
//! A submission is scored against the ground truth and the summary statistics are
//! reported under the split that belongs to the phase being evaluated.

use crate::error::Result;
use crate::params::IouType;
use crate::precisions::get_precisions;
use crate::stats::Stats;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Challenge phase a submission was made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Dev,
    Test,
}

impl Phase {
    /// Phase for a host codename, `None` when the codename is not recognised.
    pub fn from_codename(codename: &str) -> Option<Self> {
        match codename {
            "dev" => Some(Phase::Dev),
            "test" => Some(Phase::Test),
            _ => None,
        }
    }

    pub fn codename(&self) -> &'static str {
        match self {
            Phase::Dev => "dev",
            Phase::Test => "test",
        }
    }

    /// Key the metrics are reported under.
    pub fn split_key(&self) -> &'static str {
        match self {
            Phase::Dev => "val_split",
            Phase::Test => "test_split",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

/// The metrics reported for one split.
///
/// `AP_easy`, `AP_hard` and `AR` are not computed separately: the leaderboard
/// fills them with the AP at IoU 0.50.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitMetrics {
    #[serde(rename = "AP")]
    pub ap: f64,
    #[serde(rename = "AP50")]
    pub ap50: f64,
    #[serde(rename = "AP75")]
    pub ap75: f64,
    #[serde(rename = "AP_easy")]
    pub ap_easy: f64,
    #[serde(rename = "AP_hard")]
    pub ap_hard: f64,
    #[serde(rename = "AP_small")]
    pub ap_small: f64,
    #[serde(rename = "AP_medium")]
    pub ap_medium: f64,
    #[serde(rename = "AP_large")]
    pub ap_large: f64,
    #[serde(rename = "AR")]
    pub ar: f64,
}

impl From<&Stats> for SplitMetrics {
    fn from(stats: &Stats) -> Self {
        SplitMetrics {
            ap: stats.ap,
            ap50: stats.ap50,
            ap75: stats.ap75,
            ap_easy: stats.ap50,
            ap_hard: stats.ap50,
            ap_small: stats.ap_small,
            ap_medium: stats.ap_medium,
            ap_large: stats.ap_large,
            ar: stats.ap50,
        }
    }
}

/// What the host receives for one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutput {
    Scored { phase: Phase, metrics: SplitMetrics },
    /// The phase codename was not recognised; serializes to an empty object.
    UnsupportedPhase { phase_codename: String },
}

impl EvaluationOutput {
    pub fn is_scored(&self) -> bool {
        matches!(self, EvaluationOutput::Scored { .. })
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for EvaluationOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EvaluationOutput::Scored { phase, metrics } => {
                let mut split = serde_json::Map::new();
                split.insert(
                    phase.split_key().to_string(),
                    serde_json::to_value(metrics).map_err(serde::ser::Error::custom)?,
                );

                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("result", &[split])?;
                map.serialize_entry("submission_result", metrics)?;
                map.end()
            }
            EvaluationOutput::UnsupportedPhase { .. } => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Score a submission for a phase using bounding-box IoU.
pub fn evaluate<P, Q>(
    test_annotation_file: P,
    user_submission_file: Q,
    phase_codename: &str,
    submission_metadata: &serde_json::Value,
) -> Result<EvaluationOutput>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    evaluate_with_metric(
        test_annotation_file,
        user_submission_file,
        phase_codename,
        submission_metadata,
        IouType::default(),
    )
}

/// Like [`evaluate`], with an explicit IoU type.
pub fn evaluate_with_metric<P, Q>(
    test_annotation_file: P,
    user_submission_file: Q,
    phase_codename: &str,
    submission_metadata: &serde_json::Value,
    metric: IouType,
) -> Result<EvaluationOutput>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    info!("Starting Evaluation");
    info!(metadata = %submission_metadata, "Submission metadata");

    let Some(phase) = Phase::from_codename(phase_codename) else {
        warn!(phase = phase_codename, "unsupported phase, no result produced");
        return Ok(EvaluationOutput::UnsupportedPhase {
            phase_codename: phase_codename.to_string(),
        });
    };

    info!(%phase, %metric, "Evaluating for {} Phase", phase);
    let stats = get_precisions(test_annotation_file, user_submission_file, metric)?;
    let metrics = SplitMetrics::from(&stats);
    info!(split = phase.split_key(), "Completed evaluation");

    Ok(EvaluationOutput::Scored { phase, metrics })
}
