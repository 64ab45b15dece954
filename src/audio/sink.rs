use std::{sync::Arc, time::Duration};
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::transport::VoiceConnection;
use crate::error::PipelineError;

/// Writes frames to the voice connection at a fixed cadence.
///
/// One frame per tick. A late tick delays the schedule instead of bursting
/// to catch up, so the destination never receives faster than real time.
pub struct FrameSink {
    connection: Arc<VoiceConnection>,
    ticker: Interval,
    frames_sent: u64,
}

impl FrameSink {
    pub fn new(connection: Arc<VoiceConnection>, frame_duration: Duration) -> Self {
        let mut ticker = interval(frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            connection,
            ticker,
            frames_sent: 0,
        }
    }

    pub async fn write(&mut self, frame: &[u8]) -> Result<(), PipelineError> {
        self.ticker.tick().await;
        self.connection
            .send_frame(frame)
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Restarts the cadence, e.g. after a pause.
    pub fn reset_cadence(&mut self) {
        self.ticker.reset();
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}
