//! Live stream fan-out
//!
//! One producer task pulls frames through the device slot, encodes them and
//! publishes multipart parts on a bounded broadcast channel. Each HTTP client
//! holds its own receiver; a client that falls behind loses the oldest frames
//! instead of holding up the producer or anyone else.

use super::multipart::frame_part;
use crate::camera::CameraDevice;
use crate::encoder::encode_jpeg;
use crate::utils::error::CameraError;
use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Pause after a transient capture failure
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Pause while the device cannot be opened
const DEVICE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Producer counters
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub consumers: usize,
}

pub struct StreamBroadcaster {
    device: CameraDevice,
    sender: broadcast::Sender<Bytes>,
    wake: Notify,
    quality: u8,
    shutdown: CancellationToken,
    frames_sent: AtomicU64,
    frames_skipped: AtomicU64,
}

impl StreamBroadcaster {
    /// `queue_depth` is the number of frames a consumer may fall behind before
    /// it starts losing them.
    pub fn new(device: CameraDevice, quality: u8, queue_depth: usize) -> Self {
        let (sender, _) = broadcast::channel(queue_depth.max(1));
        Self {
            device,
            sender,
            wake: Notify::new(),
            quality,
            shutdown: CancellationToken::new(),
            frames_sent: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        }
    }

    /// Register a consumer. It sees frames produced from now on.
    pub fn subscribe(&self) -> StreamConsumer {
        let receiver = self.sender.subscribe();
        self.wake.notify_one();
        tracing::debug!("Stream consumer connected ({} total)", self.sender.receiver_count());
        StreamConsumer {
            receiver,
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            consumers: self.sender.receiver_count(),
        }
    }

    /// Start the producer loop
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move { broadcaster.run().await })
    }

    /// Stop the producer and end every consumer stream
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run(&self) {
        let shutdown = &self.shutdown;
        tracing::info!("Stream producer started");
        loop {
            if self.sender.receiver_count() == 0 {
                // Nobody watching, leave the device to other users
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.wake.notified() => continue,
                }
            }
            if shutdown.is_cancelled() {
                break;
            }

            match self.produce().await {
                Ok(part) => {
                    self.frames_sent.fetch_add(1, Ordering::Relaxed);
                    // Receivers may all have gone since the check above
                    let _ = self.sender.send(part);
                }
                Err(CameraError::EncodingFailed(e)) => {
                    self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Skipping frame: {}", e);
                }
                Err(CameraError::CaptureFailed(e)) => {
                    self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Capture failed, retrying: {}", e);
                    tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::warn!("Live stream stalled: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(DEVICE_RETRY_DELAY) => {}
                    }
                }
            }
        }
        tracing::info!("Stream producer stopped");
    }

    /// Capture under the device lock, encode after releasing it
    async fn produce(&self) -> Result<Bytes, CameraError> {
        let frame = self.device.with_slot(|slot| slot.capture_live()).await?;
        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality).map(|jpeg| frame_part(&jpeg)))
            .await
            .map_err(|e| CameraError::EncodingFailed(format!("encoder task failed: {e}")))?
    }
}

/// One connected viewer
pub struct StreamConsumer {
    receiver: broadcast::Receiver<Bytes>,
    shutdown: CancellationToken,
}

impl StreamConsumer {
    /// Next multipart part, skipping over frames this consumer was too slow for.
    /// `None` once the broadcaster shuts down.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                received = self.receiver.recv() => received,
            };
            match received {
                Ok(part) => return Some(part),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!("Stream consumer lagged, dropped {} frames", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Response body stream, ending when the broadcaster shuts down
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        BroadcastStream::new(self.receiver)
            .filter_map(|item| {
                future::ready(match item {
                    Ok(part) => Some(Ok(part)),
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        tracing::debug!("Stream consumer lagged, dropped {} frames", missed);
                        None
                    }
                })
            })
            .take_until(self.shutdown.cancelled_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSettings;
    use crate::capture::{Frame, FrameSource, PixelFormat, SimulatedSource};
    use crate::utils::error::CameraResult;

    fn settings() -> CameraSettings {
        CameraSettings {
            width: 32,
            height: 24,
            fps: 30,
            hdr: false,
        }
    }

    fn broadcaster(source: Box<dyn FrameSource>) -> Arc<StreamBroadcaster> {
        Arc::new(StreamBroadcaster::new(
            CameraDevice::new(source, settings()),
            80,
            4,
        ))
    }

    /// Every third frame comes back truncated
    struct GlitchySource {
        inner: SimulatedSource,
        count: u64,
    }

    impl FrameSource for GlitchySource {
        fn name(&self) -> &str {
            "glitchy"
        }

        fn open(&mut self, settings: &CameraSettings) -> CameraResult<()> {
            self.inner.open(settings)
        }

        fn capture_frame(&mut self) -> CameraResult<Frame> {
            self.count += 1;
            if self.count % 3 == 0 {
                return Ok(Frame::new(32, 24, PixelFormat::Rgb24, vec![0; 7], self.count));
            }
            self.inner.capture_frame()
        }

        fn close(&mut self) {
            self.inner.close()
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
    }

    #[tokio::test]
    async fn test_consumers_receive_multipart_jpeg() {
        let broadcaster = broadcaster(Box::new(SimulatedSource::new(false)));
        let handle = broadcaster.spawn();

        let mut consumer = broadcaster.subscribe();
        let part = consumer.next_frame().await.unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
        assert!(part.ends_with(b"\r\n"));

        broadcaster.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_does_not_affect_other_consumers() {
        let broadcaster = broadcaster(Box::new(SimulatedSource::new(false)));
        let handle = broadcaster.spawn();

        let mut stays = broadcaster.subscribe();
        let mut leaves = broadcaster.subscribe();
        assert!(leaves.next_frame().await.is_some());
        assert!(stays.next_frame().await.is_some());
        drop(leaves);

        for _ in 0..10 {
            assert!(stays.next_frame().await.is_some());
        }
        assert_eq!(broadcaster.stats().consumers, 1);

        broadcaster.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let source = GlitchySource {
            inner: SimulatedSource::new(false),
            count: 0,
        };
        let broadcaster = broadcaster(Box::new(source));
        let handle = broadcaster.spawn();

        let mut consumer = broadcaster.subscribe();
        for _ in 0..6 {
            let part = consumer.next_frame().await.unwrap();
            assert!(part.starts_with(b"--frame"));
        }
        assert!(broadcaster.stats().frames_skipped > 0);

        broadcaster.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_body_stream_yields_parts() {
        let broadcaster = broadcaster(Box::new(SimulatedSource::new(false)));
        let handle = broadcaster.spawn();

        let stream = broadcaster.subscribe().into_stream();
        tokio::pin!(stream);
        let part = stream.next().await.unwrap().unwrap();
        assert!(part.starts_with(b"--frame"));

        broadcaster.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_producer_leaves_device_closed() {
        let device = CameraDevice::new(Box::new(SimulatedSource::new(false)), settings());
        let broadcaster = Arc::new(StreamBroadcaster::new(device.clone(), 80, 4));
        let handle = broadcaster.spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.lock().await.opened_with(), None);
        assert_eq!(broadcaster.stats().frames_sent, 0);

        broadcaster.shutdown();
        handle.await.unwrap();
    }
}
