//! Offline backend - self-paced cycles for rendering and tests
//!
//! Drives the engine from an ordinary thread instead of an audio
//! callback. Paced mode sleeps out the remainder of each cycle's budget
//! (and reports an xrun when processing overruns it); freewheel mode
//! drops the pacing and runs cycles back to back, which is the export
//! path's as-fast-as-possible contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::backend::AudioBackend;
use crate::audio::error::{AudioError, AudioResult};
use crate::engine::driver::{CycleOutcome, EngineDriver};

pub struct OfflineBackend {
    driver: Weak<EngineDriver>,
    sample_rate: u32,
    buffer_size: u32,
    freewheel: Arc<AtomicBool>,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OfflineBackend {
    pub fn new(driver: &Arc<EngineDriver>, sample_rate: u32, buffer_size: u32) -> Box<Self> {
        Box::new(Self {
            driver: Arc::downgrade(driver),
            sample_rate,
            buffer_size,
            freewheel: Arc::new(AtomicBool::new(false)),
            run: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    fn start(&mut self) -> AudioResult<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.run.store(true, Ordering::Relaxed);

        let driver = self.driver.clone();
        let run = Arc::clone(&self.run);
        let freewheel = Arc::clone(&self.freewheel);
        let frames = self.buffer_size as usize;
        let budget = Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64);

        let thread = thread::Builder::new()
            .name("cadence-offline".to_string())
            .spawn(move || {
                log::info!("offline cycle thread started ({} frames/cycle)", frames);
                while run.load(Ordering::Relaxed) {
                    let Some(driver) = driver.upgrade() else {
                        break;
                    };
                    let began = Instant::now();
                    if driver.cycle(frames) == CycleOutcome::Halted {
                        break;
                    }

                    if !freewheel.load(Ordering::Relaxed) {
                        let spent = began.elapsed();
                        if spent < budget {
                            thread::sleep(budget - spent);
                        } else {
                            driver.on_xrun();
                        }
                    }
                }
                log::info!("offline cycle thread stopped");
            })
            .map_err(|e| AudioError::Activation(e.to_string()))?;

        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self, _forever: bool) -> AudioResult<()> {
        self.run.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }

    fn set_freewheel(&mut self, on: bool) -> AudioResult<()> {
        self.freewheel.store(on, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for OfflineBackend {
    fn drop(&mut self) {
        let _ = self.stop(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_offline_backend_drives_cycles() {
        let driver = EngineDriver::new(EngineConfig::new("offline-test"));
        driver.set_backend(OfflineBackend::new(&driver, 48000, 64));
        driver.start().unwrap();

        // Freewheel so the test doesn't wait out real-time pacing
        driver.freewheel(true).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while driver.processed_frames() < 64 * 10 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(driver.processed_frames() >= 64 * 10);

        driver.stop(true).unwrap();
        let frames = driver.processed_frames();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(driver.processed_frames(), frames);
    }

    #[test]
    fn test_halt_stops_the_cycle_thread() {
        let driver = EngineDriver::new(EngineConfig::new("halt-test"));
        driver.set_backend(OfflineBackend::new(&driver, 48000, 64));
        driver.start().unwrap();
        driver.freewheel(true).unwrap();

        driver.handle_halt("test halt");
        thread::sleep(Duration::from_millis(20));
        let frames = driver.processed_frames();
        thread::sleep(Duration::from_millis(20));
        // No further cycles ran against the dead connection
        assert_eq!(driver.processed_frames(), frames);

        driver.stop(true).unwrap();
    }
}
