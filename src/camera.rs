use anyhow::{anyhow, Context, Result};
use colored::*;
use log::{debug, info, warn};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::CameraConfig;
use crate::types::Frame;

/// A device that yields frames on demand.
pub trait FrameGrabber {
    fn name(&self) -> String;
    fn grab(&mut self) -> Result<Frame>;
}

/// Capture device opened through nokhwa.
pub struct NokhwaGrabber {
    camera: Camera,
}

impl NokhwaGrabber {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let index = CameraIndex::Index(config.index);
        let format = CameraFormat::new_from(config.width, config.height, FrameFormat::MJPEG, config.fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
        let mut camera = Camera::new(index, requested).context("Failed to create camera instance")?;

        camera
            .open_stream()
            .map_err(|e| anyhow!(e))
            .context("Failed to open camera stream")?;

        println!("{}", format!("Opened camera: {}", camera.info().human_name()).green());
        info!("Format: {}", camera.camera_format());
        Ok(Self { camera })
    }
}

impl FrameGrabber for NokhwaGrabber {
    fn name(&self) -> String {
        self.camera.info().human_name()
    }

    fn grab(&mut self) -> Result<Frame> {
        let frame = self.camera.frame().map_err(|e| anyhow!(e)).context("Failed to get frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| anyhow!(e))
            .context("Failed to decode frame")?;
        Ok(decoded)
    }
}

impl Drop for NokhwaGrabber {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("Failed to release camera: {}", e);
        }
    }
}

type Slot = Arc<Mutex<Option<Arc<Frame>>>>;

/// Background capture loop publishing the newest frame into a single slot.
/// Slow consumers simply miss frames.
pub struct CameraSource {
    latest: Slot,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl CameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let config_for_thread = config.clone();
        Self::spawn(
            move || NokhwaGrabber::open(&config_for_thread),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Starts the capture thread. `open` runs on that thread, so the grabber
    /// never has to cross threads; its error is returned here.
    pub fn spawn<F, G>(open: F, poll_interval: Duration) -> Result<Self>
    where
        F: FnOnce() -> Result<G> + Send + 'static,
        G: FrameGrabber,
    {
        let latest: Slot = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String>>(1);

        let slot = latest.clone();
        let stop_flag = stopped.clone();
        let handle = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut grabber = match open() {
                    Ok(g) => {
                        let _ = ready_tx.send(Ok(g.name()));
                        g
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(&mut grabber, &slot, &stop_flag, poll_interval);
            })
            .context("Failed to spawn camera thread")?;

        let name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(anyhow!("Camera thread exited before opening the device"));
            }
        };

        Ok(Self {
            latest,
            stopped,
            handle: Some(handle),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recent frame, or `None` before the first successful capture.
    pub fn get_frame(&self) -> Option<Arc<Frame>> {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stops the capture loop and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Camera thread panicked");
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<G: FrameGrabber>(grabber: &mut G, slot: &Slot, stopped: &AtomicBool, poll: Duration) {
    while !stopped.load(Ordering::SeqCst) {
        match grabber.grab() {
            Ok(frame) => {
                let frame = Arc::new(frame);
                match slot.lock() {
                    Ok(mut guard) => *guard = Some(frame),
                    Err(poisoned) => *poisoned.into_inner() = Some(frame),
                }
            }
            Err(e) => debug!("Frame capture failed: {:#}", e),
        }
        thread::sleep(poll);
    }
}

/// A capture device visible to the native backend.
#[derive(Debug, Clone)]
pub struct CameraEntry {
    pub index: String,
    pub name: String,
    pub misc: String,
}

pub fn list_cameras() -> Result<Vec<CameraEntry>> {
    let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| anyhow!(e))?;
    Ok(cameras
        .into_iter()
        .map(|cam| CameraEntry {
            index: cam.index().to_string(),
            name: cam.human_name(),
            misc: cam.misc(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use image::Rgb;
    use std::time::Instant;

    /// Emits frames whose red channel counts captures; every third grab
    /// fails.
    struct CountingGrabber {
        grabs: u8,
    }

    impl FrameGrabber for CountingGrabber {
        fn name(&self) -> String {
            "counting".into()
        }

        fn grab(&mut self) -> Result<Frame> {
            self.grabs = self.grabs.wrapping_add(1);
            if self.grabs % 3 == 0 {
                bail!("transient read failure");
            }
            Ok(Frame::from_pixel(4, 4, Rgb([self.grabs, 0, 0])))
        }
    }

    fn wait_for_frame(source: &CameraSource) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(f) = source.get_frame() {
                return Some(f);
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_latest_frame_wins() {
        let mut source =
            CameraSource::spawn(|| Ok(CountingGrabber { grabs: 0 }), Duration::from_millis(1)).unwrap();
        assert_eq!(source.name(), "counting");

        let first = wait_for_frame(&source).expect("no frame captured");
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut newer = first.clone();
        while Instant::now() < deadline && newer.get_pixel(0, 0)[0] == first.get_pixel(0, 0)[0] {
            thread::sleep(Duration::from_millis(2));
            newer = source.get_frame().unwrap();
        }
        assert_ne!(newer.get_pixel(0, 0)[0] % 3, 0);
        assert_ne!(newer.get_pixel(0, 0)[0], first.get_pixel(0, 0)[0]);

        source.stop();
        let after_stop = source.get_frame().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(source.get_frame().unwrap(), after_stop);
    }

    #[test]
    fn test_no_frame_before_first_capture() {
        struct NeverGrabber;
        impl FrameGrabber for NeverGrabber {
            fn name(&self) -> String {
                "never".into()
            }
            fn grab(&mut self) -> Result<Frame> {
                bail!("no signal")
            }
        }

        let source = CameraSource::spawn(|| Ok(NeverGrabber), Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(source.get_frame().is_none());
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let result = CameraSource::spawn(
            || -> Result<CountingGrabber> { bail!("device busy") },
            Duration::from_millis(1),
        );
        let err = result.err().expect("open should fail");
        assert!(err.to_string().contains("device busy"));
    }
}
