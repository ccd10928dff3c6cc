//! Large-response shaper
//!
//! Tool output past the threshold is spilled to a per-session temp file and
//! replaced by a short summary referencing the path, so one chatty command
//! cannot blow up the transcript. The loop removes the spill directory on
//! exit.

use std::path::PathBuf;

use tracing::{debug, warn};

/// Default spill threshold in characters
pub const DEFAULT_THRESHOLD: usize = 30_000;

/// Characters of head retained in the inline summary
const SUMMARY_HEAD: usize = 2_000;

/// Shapes oversized tool output into a summary plus spill file
pub struct ResponseShaper {
    threshold: usize,
    spill_dir: PathBuf,
    counter: std::sync::atomic::AtomicU32,
}

impl ResponseShaper {
    /// Create a shaper for one session
    pub fn new(session_id: &str) -> Self {
        Self::with_threshold(session_id, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(session_id: &str, threshold: usize) -> Self {
        let spill_dir = std::env::temp_dir().join("sessiond").join(session_id);
        Self {
            threshold,
            spill_dir,
            counter: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Shape one tool output
    pub fn shape(&self, tool_name: &str, output: String) -> String {
        if output.len() <= self.threshold {
            return output;
        }

        let seq = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let file_name = format!("{}-{:03}.txt", tool_name, seq);
        let path = self.spill_dir.join(&file_name);

        if let Err(e) = std::fs::create_dir_all(&self.spill_dir) {
            warn!(error = %e, "ResponseShaper: could not create spill dir, truncating inline");
            return truncate_inline(&output, self.threshold);
        }
        if let Err(e) = std::fs::write(&path, &output) {
            warn!(error = %e, "ResponseShaper: could not write spill file, truncating inline");
            return truncate_inline(&output, self.threshold);
        }

        debug!(path = %path.display(), total = output.len(), "ResponseShaper: spilled large output");
        let mut head_end = SUMMARY_HEAD.min(output.len());
        while !output.is_char_boundary(head_end) {
            head_end -= 1;
        }
        format!(
            "{}\n\n[output truncated: {} chars total, full output at {}]",
            &output[..head_end],
            output.len(),
            path.display()
        )
    }

    /// Remove the session's spill directory (best effort)
    pub fn cleanup(&self) {
        debug!(dir = %self.spill_dir.display(), "ResponseShaper::cleanup: called");
        if self.spill_dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.spill_dir)
        {
            warn!(error = %e, "ResponseShaper: cleanup failed");
        }
    }

    /// Spill directory path (for tests)
    pub fn spill_dir(&self) -> &std::path::Path {
        &self.spill_dir
    }
}

fn truncate_inline(output: &str, threshold: usize) -> String {
    let mut end = threshold;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...\n[truncated, {} chars total]", &output[..end], output.len())
}
