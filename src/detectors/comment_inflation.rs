//! Comment inflation: documentation volume standing in for code change

use super::{DetectionResult, Detector, DetectorError, DetectorThresholds};
use crate::change_set::{ChangeSet, FileChange};
use crate::metrics::MetricDelta;

const NAME: &str = "comment_inflation";

/// Prose files are documentation in their own right, not inflated source
const PROSE_EXTENSIONS: &[&str] = &[".md", ".rst", ".txt", ".adoc"];

pub struct CommentInflationDetector {
    thresholds: DetectorThresholds,
}

impl CommentInflationDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    fn is_prose(change: &FileChange) -> bool {
        let lower = change.path.to_ascii_lowercase();
        PROSE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }
}

impl Detector for CommentInflationDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(
        &self,
        changes: &ChangeSet,
        _delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError> {
        let mut total_comments = 0usize;
        let mut total_code = 0usize;
        let mut files_considered = 0usize;
        let mut flagged = Vec::new();

        for change in changes.iter().filter(|c| !Self::is_prose(c)) {
            let comments = change.added_comment_lines();
            let code = change.added_code_lines();
            if comments + code == 0 {
                continue;
            }
            files_considered += 1;
            total_comments += comments;
            total_code += code;

            let ratio = comments as f64 / code.max(1) as f64;
            if ratio >= self.thresholds.comment_ratio_threshold
                && comments >= self.thresholds.min_comment_lines
            {
                flagged.push((change.path.clone(), comments, code, ratio));
            }
        }

        if files_considered == 0 {
            return Ok(DetectionResult::clean(NAME));
        }

        let comment_fraction = total_comments as f64 / (total_comments + total_code) as f64;
        let flood = total_comments > 0 && comment_fraction > self.thresholds.flood_comment_fraction;
        // A flood flags the change-set as a whole, so every comment line is covered
        let flagged_share = if flood {
            1.0
        } else if total_comments == 0 {
            0.0
        } else {
            flagged.iter().map(|(_, c, _, _)| c).sum::<usize>() as f64 / total_comments as f64
        };
        let overall_ratio = total_comments as f64 / total_code.max(1) as f64;
        let saturation = overall_ratio / (3.0 * self.thresholds.comment_ratio_threshold);

        let fired = flood || flagged.len() >= self.thresholds.min_flagged_files;

        let mut result = DetectionResult::clean(NAME)
            .scored(&[comment_fraction, flagged_share, saturation], comment_fraction)
            .detected(fired)
            .with_metadata("comment_lines", total_comments)
            .with_metadata("code_lines", total_code)
            .with_metadata("flagged_files", flagged.len())
            .with_metadata("files_considered", files_considered)
            .with_metadata("comment_flood", flood);

        for (path, comments, code, ratio) in &flagged {
            result = result.with_evidence(format!(
                "{}: {} comment lines vs {} code lines (ratio {:.1})",
                path, comments, code, ratio
            ));
        }

        if fired {
            result = result
                .with_evidence(format!(
                    "{:.0}% of added lines are comments",
                    comment_fraction * 100.0
                ))
                .with_recommendation(
                    "Keep documentation proportional to the code it explains; \
                     do not count comment volume as a quality improvement.",
                );
        }

        Ok(result)
    }
}
