use clap::Parser;
use coco_challenge_eval::IouType;
use std::path::PathBuf;

/// Score a COCO detection submission for a challenge phase
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Ground-truth annotation file (COCO JSON)
    #[arg(long, value_name = "FILE")]
    pub annotations: PathBuf,

    /// Submission file, a JSON array of detection records
    #[arg(long, value_name = "FILE")]
    pub submission: PathBuf,

    /// Phase codename: dev or test
    #[arg(long, value_name = "CODENAME")]
    pub phase: String,

    /// JSON file with submission metadata
    #[arg(long, value_name = "FILE")]
    pub metadata: Option<PathBuf>,

    /// IoU type: bbox or segm
    #[arg(long, default_value = "bbox", value_parser = parse_metric)]
    pub metric: IouType,

    /// Write the result here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

fn parse_metric(s: &str) -> Result<IouType, String> {
    s.parse().map_err(|e: coco_challenge_eval::CocoEvalError| e.to_string())
}
