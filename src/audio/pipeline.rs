use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{sink::FrameSink, source::FrameSource};
use crate::error::PipelineError;

/// How a pipeline run ended. Exactly one is reported per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The source reached end of stream.
    Finished,
    /// Cancelled by skip, stop or disconnect.
    ManualStop,
    Failed(PipelineError),
}

/// Moves frames from one source to the sink until the stream ends, fails
/// or is cancelled.
///
/// Cancellation is observed at every frame boundary and while waiting on
/// the source or the sink, so a cancelled run returns within one frame
/// interval.
pub struct Pipeline {
    source: Box<dyn FrameSource>,
    sink: FrameSink,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: FrameSink,
        cancel: CancellationToken,
        paused: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            sink,
            cancel,
            paused,
        }
    }

    pub async fn run(mut self) -> PipelineOutcome {
        let outcome = self.pump().await;
        debug!(
            "Pipeline terminado tras {} frames: {:?}",
            self.sink.frames_sent(),
            outcome
        );
        outcome
    }

    async fn pump(&mut self) -> PipelineOutcome {
        loop {
            if self.cancel.is_cancelled() {
                return PipelineOutcome::ManualStop;
            }

            if *self.paused.borrow_and_update() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return PipelineOutcome::ManualStop,
                    changed = self.paused.changed() => {
                        if changed.is_err() {
                            return PipelineOutcome::ManualStop;
                        }
                        self.sink.reset_cadence();
                    }
                }
                continue;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PipelineOutcome::ManualStop,
                next = self.source.next_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return PipelineOutcome::Finished,
                Err(e) => return PipelineOutcome::Failed(PipelineError::Source(e.to_string())),
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PipelineOutcome::ManualStop,
                written = self.sink.write(&frame) => {
                    if let Err(e) = written {
                        return PipelineOutcome::Failed(e);
                    }
                }
            }
        }
    }
}
