//! Frame acquisition loop
//!
//! Pulls frames from a camera source at the target rate. Individual reads
//! are bounded by a timeout proportional to the frame interval, so the
//! pipeline never hangs on a single read; transient misses retry with
//! backoff, and a sustained failure escalates to one fatal disconnect.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use perch_core::{Error, Frame, Result};

/// Acquisition timing and failure policy.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub fps: u32,
    /// Consecutive timed-out reads tolerated before the pipeline is declared
    /// dead.
    pub max_retries: u32,
    /// Backoff added per consecutive failure.
    pub backoff: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            max_retries: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Read side of the acquisition loop, wrapping a source's frame channel.
pub struct FrameStream {
    rx: mpsc::Receiver<Frame>,
    read_timeout: Duration,
    max_retries: u32,
    backoff: Duration,
    failures: u32,
    dead: bool,
}

impl FrameStream {
    /// A read may take this many frame intervals before it counts as a miss.
    const TIMEOUT_INTERVALS: u32 = 3;

    pub fn new(rx: mpsc::Receiver<Frame>, config: &AcquisitionConfig) -> Self {
        let interval = Duration::from_micros(1_000_000 / config.fps.max(1) as u64);
        Self {
            rx,
            read_timeout: interval * Self::TIMEOUT_INTERVALS,
            max_retries: config.max_retries,
            backoff: config.backoff,
            failures: 0,
            dead: false,
        }
    }

    /// The next frame, or the fatal [`Error::CameraDisconnected`].
    ///
    /// Once fatal, the stream stays dead; the caller is expected to halt the
    /// pipeline on the first error.
    pub async fn next(&mut self) -> Result<Frame> {
        if self.dead {
            return Err(Error::CameraDisconnected(
                "capture pipeline already halted".into(),
            ));
        }
        loop {
            match timeout(self.read_timeout, self.rx.recv()).await {
                Ok(Some(frame)) => {
                    self.failures = 0;
                    return Ok(frame);
                }
                Ok(None) => {
                    self.dead = true;
                    error!("camera stream closed");
                    return Err(Error::CameraDisconnected(
                        "camera stream closed (device unplugged or capture process exited)".into(),
                    ));
                }
                Err(_) => {
                    self.failures += 1;
                    if self.failures > self.max_retries {
                        self.dead = true;
                        error!(
                            "no frame within {:?} after {} attempts, giving up",
                            self.read_timeout, self.failures
                        );
                        return Err(Error::CameraDisconnected(format!(
                            "no frame within {:?} after {} attempts",
                            self.read_timeout, self.failures
                        )));
                    }
                    warn!(
                        "frame read timed out ({}/{}), backing off",
                        self.failures, self.max_retries
                    );
                    sleep(self.backoff * self.failures).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use perch_core::{PixelFormat, Resolution};

    fn test_frame(seq: u64) -> Frame {
        Frame::new(
            seq,
            Utc::now(),
            Resolution::new(4, 4),
            PixelFormat::Rgb24,
            Bytes::from(vec![0u8; 48]),
        )
    }

    fn test_config() -> AcquisitionConfig {
        AcquisitionConfig {
            fps: 30,
            max_retries: 3,
            backoff: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn delivers_frames_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = FrameStream::new(rx, &test_config());
        tx.send(test_frame(0)).await.unwrap();
        tx.send(test_frame(1)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().seq, 0);
        assert_eq!(stream.next().await.unwrap().seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_silence_is_fatal_exactly_once() {
        let (tx, rx) = mpsc::channel::<Frame>(4);
        let mut stream = FrameStream::new(rx, &test_config());
        // Keep the sender alive so the channel never reads as closed; the
        // stream must still give up after the retry bound.
        let err = stream.next().await.unwrap_err();
        assert!(matches!(err, Error::CameraDisconnected(_)));

        // Already dead: a frame arriving later must not revive the stream.
        tx.send(test_frame(0)).await.unwrap();
        let err = stream.next().await.unwrap_err();
        assert!(matches!(err, Error::CameraDisconnected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_is_fatal() {
        let (tx, rx) = mpsc::channel::<Frame>(4);
        drop(tx);
        let mut stream = FrameStream::new(rx, &test_config());
        let err = stream.next().await.unwrap_err();
        assert!(matches!(err, Error::CameraDisconnected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_miss_recovers() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = FrameStream::new(rx, &test_config());

        // Deliver a frame after one read timeout has elapsed; the stream
        // should retry and succeed rather than go fatal.
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            let _ = tx.send(test_frame(7)).await;
            // Keep the sender alive briefly so recovery is from a timeout,
            // not channel closure.
            sleep(Duration::from_secs(5)).await;
        });

        let frame = stream.next().await.unwrap();
        assert_eq!(frame.seq, 7);
    }
}
