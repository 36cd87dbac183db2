//! Synthetic frame source for machines without camera access.

use super::traits::{Frame, FrameSource, PixelFormat};
use crate::camera::CameraSettings;
use crate::utils::error::{CameraError, CameraResult};
use std::time::{Duration, Instant};

/// Generates a moving test pattern at the configured size.
///
/// When `realtime` is set, `capture_frame` sleeps until the next frame
/// deadline so throughput matches the configured fps like a real sensor.
pub struct SimulatedSource {
    realtime: bool,
    settings: Option<CameraSettings>,
    sequence: u64,
    next_deadline: Option<Instant>,
}

impl SimulatedSource {
    pub fn new(realtime: bool) -> Self {
        Self {
            realtime,
            settings: None,
            sequence: 0,
            next_deadline: None,
        }
    }

    fn pace(&mut self, fps: u32) {
        if !self.realtime {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let now = Instant::now();
        match self.next_deadline {
            Some(deadline) if deadline > now => {
                std::thread::sleep(deadline - now);
                self.next_deadline = Some(deadline + interval);
            }
            _ => self.next_deadline = Some(now + interval),
        }
    }
}

/// Render the test pattern: a diagonal colour gradient drifting with the
/// frame counter, crossed by a white bar sweeping left to right.
fn render_pattern(width: u32, height: u32, sequence: u64, hdr: bool) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut data = vec![0u8; w * h * 3];
    let shift = (sequence * 4) as usize;
    let bar_x = (sequence as usize * 8) % w.max(1);
    let bar_width = (w / 32).max(2);
    // HDR pattern keeps more headroom in the highlights
    let ceiling: usize = if hdr { 235 } else { 255 };

    for y in 0..h {
        let row = &mut data[y * w * 3..(y + 1) * w * 3];
        for x in 0..w {
            let px = &mut row[x * 3..x * 3 + 3];
            if x >= bar_x && x < bar_x + bar_width {
                px.copy_from_slice(&[ceiling as u8; 3]);
                continue;
            }
            px[0] = (((x + shift) * ceiling) / w.max(1) % 256) as u8;
            px[1] = ((y * ceiling) / h.max(1)) as u8;
            px[2] = ((((x + y) / 2 + shift) * ceiling) / w.max(1) % 256) as u8;
        }
    }
    data
}

impl FrameSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&mut self, settings: &CameraSettings) -> CameraResult<()> {
        if self.settings.is_some() {
            return Err(CameraError::DeviceUnavailable(
                "simulated source already open".to_string(),
            ));
        }
        tracing::info!(
            "Simulated camera opened: {}x{} @ {}fps (hdr={})",
            settings.width,
            settings.height,
            settings.fps,
            settings.hdr
        );
        self.settings = Some(*settings);
        self.next_deadline = None;
        Ok(())
    }

    fn capture_frame(&mut self) -> CameraResult<Frame> {
        let settings = self
            .settings
            .ok_or_else(|| CameraError::CaptureFailed("simulated source is not open".to_string()))?;
        self.pace(settings.fps);

        let sequence = self.sequence;
        self.sequence += 1;
        let data = render_pattern(settings.width, settings.height, sequence, settings.hdr);
        Ok(Frame::new(
            settings.width,
            settings.height,
            PixelFormat::Rgb24,
            data,
            sequence,
        ))
    }

    fn close(&mut self) {
        if self.settings.take().is_some() {
            tracing::debug!("Simulated camera closed after {} frames", self.sequence);
        }
    }

    fn is_open(&self) -> bool {
        self.settings.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(width: u32, height: u32, fps: u32) -> CameraSettings {
        CameraSettings {
            width,
            height,
            fps,
            hdr: false,
        }
    }

    #[test]
    fn test_frames_match_configured_size() {
        let mut source = SimulatedSource::new(false);
        source.open(&settings(640, 480, 30)).unwrap();
        let frame = source.capture_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(frame.data().len(), 640 * 480 * 3);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_capture_requires_open() {
        let mut source = SimulatedSource::new(false);
        assert!(matches!(
            source.capture_frame(),
            Err(CameraError::CaptureFailed(_))
        ));
    }

    #[test]
    fn test_pattern_moves_between_frames() {
        let mut source = SimulatedSource::new(false);
        source.open(&settings(64, 48, 30)).unwrap();
        let a = source.capture_frame().unwrap();
        let b = source.capture_frame().unwrap();
        assert_eq!(b.sequence(), a.sequence() + 1);
        assert_ne!(a.data(), b.data());
    }

    #[test]
    fn test_reopen_requires_close() {
        let mut source = SimulatedSource::new(false);
        source.open(&settings(64, 48, 30)).unwrap();
        assert!(source.open(&settings(32, 24, 15)).is_err());
        source.close();
        assert!(!source.is_open());
        source.open(&settings(32, 24, 15)).unwrap();
        assert_eq!(source.capture_frame().unwrap().width(), 32);
    }

    #[test]
    fn test_realtime_pacing_spaces_frames() {
        let mut source = SimulatedSource::new(true);
        source.open(&settings(16, 16, 20)).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            source.capture_frame().unwrap();
        }
        // First frame is immediate, the next three wait ~50ms each
        assert!(start.elapsed() >= Duration::from_millis(140));
    }
}
