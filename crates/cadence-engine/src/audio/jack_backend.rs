//! Native JACK audio backend for Linux
//!
//! Bridges the engine to a JACK server: a fixed set of physical I/O
//! ports on the JACK side is mirrored by engine ports in the registry,
//! and the process handler copies in, runs one engine cycle, and copies
//! out. All server notifications (xrun, shutdown, rate/buffer changes,
//! graph reorder) are forwarded into the driver's hooks and come back out
//! as engine signals - nothing JACK-specific escapes this module.
//!
//! Works against a real jackd as well as PipeWire's JACK compatibility
//! layer.

use std::sync::{Arc, Weak};

use jack::{AudioIn, AudioOut, Client, ClientOptions, Control, ProcessScope};

use basedrop::Shared;

use crate::audio::backend::AudioBackend;
use crate::audio::error::{AudioError, AudioResult};
use crate::config::EngineConfig;
use crate::engine::driver::{CycleOutcome, EngineDriver, EngineSignal};
use crate::engine::ports::Port;
use crate::types::{DataType, PortDirection};

/// JACK process handler
///
/// Owns the JACK port handles; the engine is reached through a weak
/// handle so a dropped driver ends the callback instead of keeping it
/// alive.
struct JackProcessor {
    driver: Weak<EngineDriver>,
    inputs: Vec<(jack::Port<AudioIn>, Shared<Port>)>,
    outputs: Vec<(jack::Port<AudioOut>, Shared<Port>)>,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let Some(driver) = self.driver.upgrade() else {
            return Control::Quit;
        };
        let n_frames = ps.n_frames() as usize;

        for (jack_port, engine_port) in &self.inputs {
            engine_port.write_cycle(jack_port.as_slice(ps));
        }

        let outcome = driver.cycle(n_frames);

        for (jack_port, engine_port) in &mut self.outputs {
            let out = jack_port.as_mut_slice(ps);
            match outcome {
                CycleOutcome::Processed => {
                    engine_port.read_cycle(out);
                }
                CycleOutcome::Silent | CycleOutcome::Halted => out.fill(0.0),
            }
        }

        if outcome == CycleOutcome::Halted {
            Control::Quit
        } else {
            Control::Continue
        }
    }
}

/// JACK notification handler forwarding into the driver's hooks
struct JackNotifications {
    driver: Weak<EngineDriver>,
}

impl jack::NotificationHandler for JackNotifications {
    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        if let Some(driver) = self.driver.upgrade() {
            driver.handle_halt(reason);
        }
    }

    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        if let Some(driver) = self.driver.upgrade() {
            driver.on_sample_rate_changed(srate);
        }
        Control::Continue
    }

    fn buffer_size(&mut self, _client: &Client, size: jack::Frames) -> Control {
        if let Some(driver) = self.driver.upgrade() {
            driver.on_buffer_size_changed(size);
        }
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        if let Some(driver) = self.driver.upgrade() {
            driver.on_xrun();
        }
        Control::Continue
    }

    fn graph_reorder(&mut self, _client: &Client) -> Control {
        if let Some(driver) = self.driver.upgrade() {
            driver.on_graph_reordered();
        }
        Control::Continue
    }
}

/// The JACK backend's control surface
pub struct JackBackend {
    driver: Weak<EngineDriver>,
    n_inputs: usize,
    n_outputs: usize,
    sample_rate: u32,
    buffer_size: u32,
    /// Client waiting to be (re)activated
    idle: Option<Client>,
    active: Option<jack::AsyncClient<JackNotifications, JackProcessor>>,
}

impl JackBackend {
    /// Connect to the JACK server and mirror `n_inputs`/`n_outputs`
    /// physical channels as engine ports
    ///
    /// The client is created but not activated; install the returned
    /// backend with `EngineDriver::set_backend` and call
    /// `EngineDriver::start`.
    pub fn connect(
        driver: &Arc<EngineDriver>,
        config: &EngineConfig,
        n_inputs: usize,
        n_outputs: usize,
    ) -> AudioResult<Box<Self>> {
        let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| AudioError::ClientCreation(e.to_string()))?;

        let sample_rate = client.sample_rate() as u32;
        let buffer_size = client.buffer_size();

        log::info!(
            "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
            client.name(),
            sample_rate,
            buffer_size,
            EngineConfig::cycle_latency_ms(buffer_size, sample_rate)
        );

        Ok(Box::new(Self {
            driver: Arc::downgrade(driver),
            n_inputs,
            n_outputs,
            sample_rate,
            buffer_size,
            idle: Some(client),
            active: None,
        }))
    }

    fn activate(&mut self) -> AudioResult<()> {
        let client = self
            .idle
            .take()
            .ok_or_else(|| AudioError::NoBackend("jack client released".to_string()))?;
        let driver = self
            .driver
            .upgrade()
            .ok_or_else(|| AudioError::NoBackend("engine driver gone".to_string()))?;

        // Engine ports go straight through the registry: this runs under
        // the driver's backend lock, so the driver-level facade (which
        // would consult this very backend) cannot be used here.
        let mut inputs = Vec::with_capacity(self.n_inputs);
        for i in 0..self.n_inputs {
            let name = format!("capture_{}", i + 1);
            let jack_port = client
                .register_port(&name, AudioIn::default())
                .map_err(|e| AudioError::ClientCreation(e.to_string()))?;
            let engine_port = driver
                .ports()
                .register(DataType::Audio, &format!("physical/{}", name), PortDirection::Input)
                .map_err(|e| AudioError::ClientCreation(e.to_string()))?;
            inputs.push((jack_port, engine_port));
        }

        let mut outputs = Vec::with_capacity(self.n_outputs);
        for i in 0..self.n_outputs {
            let name = format!("playback_{}", i + 1);
            let jack_port = client
                .register_port(&name, AudioOut::default())
                .map_err(|e| AudioError::ClientCreation(e.to_string()))?;
            let engine_port = driver
                .ports()
                .register(DataType::Audio, &format!("physical/{}", name), PortDirection::Output)
                .map_err(|e| AudioError::ClientCreation(e.to_string()))?;
            outputs.push((jack_port, engine_port));
        }
        driver.emit(EngineSignal::PortsChanged);

        let processor = JackProcessor {
            driver: self.driver.clone(),
            inputs,
            outputs,
        };
        let notifications = JackNotifications {
            driver: self.driver.clone(),
        };

        let active = client
            .activate_async(notifications, processor)
            .map_err(|e| AudioError::Activation(e.to_string()))?;
        self.active = Some(active);

        log::info!("JACK client activated");
        Ok(())
    }

    fn deactivate(&mut self) -> AudioResult<()> {
        if let Some(active) = self.active.take() {
            match active.deactivate() {
                Ok((client, _notifications, _processor)) => {
                    // JACK ports died with deactivation; mirror that in
                    // the registry
                    if let Some(driver) = self.driver.upgrade() {
                        let snapshot = driver.ports().current();
                        for port in snapshot.iter() {
                            if port.name().starts_with("physical/") {
                                let _ = driver.ports().unregister(port);
                            }
                        }
                        driver.emit(EngineSignal::PortsChanged);
                    }
                    self.idle = Some(client);
                }
                Err(e) => {
                    return Err(AudioError::RequestRefused(e.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl AudioBackend for JackBackend {
    fn name(&self) -> &str {
        "jack"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    fn start(&mut self) -> AudioResult<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.activate()
    }

    fn stop(&mut self, forever: bool) -> AudioResult<()> {
        self.deactivate()?;
        if forever {
            self.idle = None;
        }
        Ok(())
    }

    fn set_freewheel(&mut self, on: bool) -> AudioResult<()> {
        let active = self
            .active
            .as_ref()
            .ok_or(AudioError::NotRunning)?;
        active
            .as_client()
            .set_freewheel(on)
            .map_err(|e| AudioError::RequestRefused(e.to_string()))
    }

    fn request_buffer_size(&mut self, frames: u32) -> AudioResult<()> {
        let active = self
            .active
            .as_ref()
            .ok_or(AudioError::NotRunning)?;
        active
            .as_client()
            .set_buffer_size(frames)
            .map_err(|e| AudioError::RequestRefused(e.to_string()))
    }
}
