use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use super::classifier::{AbstractClassifier, ClassifyError};
use crate::article::Article;

const DEFAULT_PACING: Duration = Duration::from_secs(1);
/// Outer guard per classification; the reasoning client retries inside it.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("classification failed for article {article_id} ({position} of {total}): {cause}")]
    ClassificationFailed {
        article_id: String,
        position: usize,
        total: usize,
        #[source]
        cause: ClassifyError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub classified: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation, observed between batch items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep until `deadline`; returns false if cancelled first.
    async fn sleep_until(&self, deadline: Instant) -> bool {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => true,
            _ = notified => false,
        }
    }
}

/// Sequential, paced classification with abort on first failure.
///
/// Items run strictly one at a time. Successive submissions are spaced by at
/// least `pacing`. Progress is published on a watch channel after each item
/// and reset to zero when the batch ends, whatever the outcome.
pub struct BatchOrchestrator<C> {
    classifier: C,
    pacing: Duration,
    call_timeout: Duration,
    state: BatchState,
    progress: watch::Sender<BatchProgress>,
}

impl<C: AbstractClassifier> BatchOrchestrator<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            pacing: DEFAULT_PACING,
            call_timeout: CLASSIFY_TIMEOUT,
            state: BatchState::Idle,
            progress: watch::Sender::new(BatchProgress::default()),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[cfg(test)]
    fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    /// Classify one article in place. On failure the article is left untouched.
    pub async fn classify_one(&self, article: &mut Article) -> Result<(), ClassifyError> {
        let outcome = tokio::time::timeout(
            self.call_timeout,
            self.classifier.classify(&article.id, &article.abstract_text),
        )
        .await
        .map_err(|_| ClassifyError::Timeout(self.call_timeout))?;

        article.classification = outcome?;
        Ok(())
    }

    /// Classify every unclassified article, in order.
    ///
    /// Already classified articles are skipped, so a failed or cancelled batch
    /// can simply be run again. The first failure stops the batch and is
    /// reported once; later articles stay unclassified.
    pub async fn classify_batch(
        &mut self,
        articles: &mut [Article],
        cancel: &CancelFlag,
    ) -> Result<BatchReport, BatchError> {
        let selection: Vec<usize> = articles
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.is_classified())
            .map(|(i, _)| i)
            .collect();
        let total = selection.len();
        let mut report = BatchReport {
            skipped: articles.len() - total,
            ..BatchReport::default()
        };

        info!(total, skipped = report.skipped, "classification batch started");
        self.state = BatchState::Running;
        self.publish(0, total, total > 0);

        let mut last_submit: Option<Instant> = None;
        for (index, &article_index) in selection.iter().enumerate() {
            if let Some(last) = last_submit
                && !cancel.sleep_until(last + self.pacing).await
            {
                report.cancelled = true;
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            last_submit = Some(Instant::now());
            let article = &mut articles[article_index];
            if let Err(cause) = self.classify_one(article).await {
                warn!(
                    article_id = %article.id,
                    position = index + 1,
                    total,
                    error = %cause,
                    "classification failed, aborting batch"
                );
                self.finish(BatchState::Aborted);
                return Err(BatchError::ClassificationFailed {
                    article_id: article.id.clone(),
                    position: index + 1,
                    total,
                    cause,
                });
            }

            report.classified += 1;
            self.publish(index + 1, total, true);
        }

        if report.cancelled {
            info!(classified = report.classified, total, "classification batch cancelled");
            self.finish(BatchState::Aborted);
        } else {
            info!(classified = report.classified, total, "classification batch complete");
            self.finish(BatchState::Idle);
        }
        Ok(report)
    }

    fn publish(&self, completed: usize, total: usize, running: bool) {
        self.progress.send_replace(BatchProgress {
            completed,
            total,
            running,
        });
    }

    fn finish(&mut self, state: BatchState) {
        self.state = state;
        self.progress.send_replace(BatchProgress::default());
    }
}
