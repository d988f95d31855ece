// SPDX-License-Identifier: MIT
//
// Background conversion worker.
//
// Runs a conversion on the blocking thread pool and hands the caller a handle
// carrying the job identity, a cancellation token, and a one-shot result
// channel. A cancelled job never delivers a result and leaves no output file:
// the converter cleans up when it observes the token mid-run, and the worker
// removes a finished output when cancellation raced in after the final write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapfolio_core::{
    CancelToken, ConversionJob, ConversionOptions, ConversionResult, DocumentFormat, JobId,
};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use crate::convert::{Converter, numbered_page_path};

/// Handle to a conversion running in the background.
///
/// Dropping the handle without awaiting it cancels the job; an abandoned
/// conversion must not keep writing files nobody will collect.
pub struct ConversionHandle {
    job: ConversionJob,
    cancel: CancelToken,
    result: Option<oneshot::Receiver<ConversionResult>>,
}

impl ConversionHandle {
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn job(&self) -> &ConversionJob {
        &self.job
    }

    /// Request cancellation. The worker observes the token at its next page
    /// boundary; no result is delivered for a cancelled job.
    pub fn cancel(&self) {
        info!(job_id = %self.job.id, "Cancellation requested");
        self.cancel.cancel();
    }

    /// A clone of the job's cancellation token, for wiring into signal
    /// handlers or UI controls that outlive the handle.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the conversion to finish. `None` means the job was cancelled
    /// (or the worker panicked) and no result will arrive.
    pub async fn wait(mut self) -> Option<ConversionResult> {
        let receiver = self.result.take()?;
        receiver.await.ok()
    }
}

impl Drop for ConversionHandle {
    fn drop(&mut self) {
        if self.result.is_some() {
            debug!(job_id = %self.job.id, "Handle abandoned; cancelling job");
            self.cancel.cancel();
        }
    }
}

/// Spawn a conversion onto the blocking thread pool and return its handle.
#[instrument(skip_all, fields(
    source = ?options.source_format,
    target = ?options.target_format,
))]
pub fn spawn_conversion(
    converter: Arc<Converter>,
    input: PathBuf,
    output: PathBuf,
    options: ConversionOptions,
) -> ConversionHandle {
    let job = ConversionJob::new(options.clone());
    let cancel = CancelToken::new();
    let (tx, rx) = oneshot::channel();

    info!(job_id = %job.id, "Conversion job spawned");

    let worker_cancel = cancel.clone();
    let job_id = job.id;
    tokio::task::spawn_blocking(move || {
        let result = converter.convert(&input, &output, &options, &worker_cancel);

        // A cancelled job delivers nothing, even if the conversion raced to
        // completion before the token was observed. In that race the output
        // was already written, so it is removed here — the caller never
        // learns its path and must not be left with an orphan file.
        if worker_cancel.is_cancelled() {
            debug!(job_id = %job_id, "Job cancelled; result discarded");
            discard_completed_output(&result, &output, options.target_format);
            return;
        }
        let _ = tx.send(result);
    });

    ConversionHandle {
        job,
        cancel,
        result: Some(rx),
    }
}

/// Remove the files a raced-to-completion job wrote before its cancellation
/// was observed: the requested output path, plus the numbered page siblings
/// of a multi-page image set (written contiguously from 001, so the scan
/// stops at the first missing one).
fn discard_completed_output(result: &ConversionResult, output: &Path, target: DocumentFormat) {
    if !result.success {
        return;
    }
    let _ = std::fs::remove_file(output);
    if target == DocumentFormat::ImageSet {
        for index in 0.. {
            if std::fs::remove_file(numbered_page_path(output, index)).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;

    use image::{GrayImage, Luma};
    use snapfolio_capture::RasterPage;
    use snapfolio_core::error::Result as SfResult;
    use snapfolio_core::{DocumentFormat, EngineConfig};

    use crate::recognize::{TextBlock, TextRecognizer};

    /// An unsupported pair fails fast without touching the filesystem, which
    /// makes it a convenient way to exercise the worker plumbing.
    #[tokio::test]
    async fn finished_job_delivers_its_result() {
        let converter = Arc::new(Converter::new(EngineConfig::default()));
        let options = ConversionOptions::new(DocumentFormat::Docx, DocumentFormat::Pptx);

        let handle = spawn_conversion(
            converter,
            PathBuf::from("/nonexistent/in.docx"),
            PathBuf::from("/nonexistent/out.pptx"),
            options,
        );
        let result = handle.wait().await.expect("result should be delivered");
        assert!(!result.success);
    }

    /// Recognizer that blocks until the test releases it, so cancellation
    /// can be requested while the job is provably still running.
    struct GatedRecognizer {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl TextRecognizer for GatedRecognizer {
        fn recognize(&self, _page: &RasterPage) -> SfResult<Vec<TextBlock>> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn cancelled_job_delivers_no_result_and_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        GrayImage::from_pixel(40, 40, Luma([200u8]))
            .save(&input)
            .unwrap();
        let output = dir.path().join("out.txt");

        let (release, gate) = mpsc::channel();
        let converter = Arc::new(
            Converter::new(EngineConfig::default()).with_recognizer(Arc::new(GatedRecognizer {
                gate: Mutex::new(gate),
            })),
        );
        let options = ConversionOptions::new(DocumentFormat::ImageSet, DocumentFormat::PlainText);

        let handle = spawn_conversion(converter, input, output.clone(), options);
        handle.cancel();
        release.send(()).unwrap();

        assert!(handle.wait().await.is_none());
        assert!(!output.exists());
    }

    /// A job that finishes writing just before its cancellation is observed
    /// must not leave the finished file behind — the caller is told nothing
    /// about it.
    #[test]
    fn raced_completion_cleanup_removes_single_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"%PDF-1.5").unwrap();

        let result = ConversionResult::ok(output.display().to_string());
        discard_completed_output(&result, &output, DocumentFormat::Pdf);
        assert!(!output.exists());
    }

    #[test]
    fn raced_completion_cleanup_removes_numbered_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("scan.jpg");
        for n in 1..=3 {
            std::fs::write(dir.path().join(format!("scan-{n:03}.jpg")), b"jpeg").unwrap();
        }

        let result = ConversionResult::ok(output.display().to_string());
        discard_completed_output(&result, &output, DocumentFormat::ImageSet);
        for n in 1..=3 {
            assert!(!dir.path().join(format!("scan-{n:03}.jpg")).exists());
        }
    }

    /// Failed conversions already cleaned up after themselves; the raced-
    /// completion cleanup must not touch whatever else sits at the path.
    #[test]
    fn raced_completion_cleanup_ignores_failed_results() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"someone else's file").unwrap();

        let result = ConversionResult::failed("conversion cancelled");
        discard_completed_output(&result, &output, DocumentFormat::Pdf);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_job() {
        let converter = Arc::new(Converter::new(EngineConfig::default()));
        let options = ConversionOptions::new(DocumentFormat::Docx, DocumentFormat::Pptx);

        let handle = spawn_conversion(
            converter,
            PathBuf::from("/nonexistent/in.docx"),
            PathBuf::from("/nonexistent/out.pptx"),
            options,
        );
        let token = handle.cancel_token();
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn handles_expose_a_stable_job_identity() {
        let converter = Arc::new(Converter::new(EngineConfig::default()));
        let options = ConversionOptions::new(DocumentFormat::ImageSet, DocumentFormat::Pdf);

        let handle = spawn_conversion(
            converter,
            PathBuf::from("/nonexistent/scan.jpg"),
            PathBuf::from("/nonexistent/out.pdf"),
            options.clone(),
        );
        assert_eq!(handle.job().options.target_format, DocumentFormat::Pdf);
        assert_eq!(handle.job_id(), handle.job().id);
        // Drain the spawned task so it does not outlive the runtime.
        let _ = handle.wait().await;
    }
}
