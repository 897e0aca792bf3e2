//! Engine driver - the real-time cycle and its control surface
//!
//! One `EngineDriver` owns the port registry, the event queue, the
//! transport and the published route list. The audio backend calls
//! `cycle()` once per buffer; everything else talks to the driver from
//! non-real-time threads through copy-on-write snapshots, the event ring,
//! and a bounded signal channel flowing the other way.
//!
//! There is no process-wide engine singleton: the driver is an explicit
//! object owned by the application, with an optional "active engine"
//! registry holding at most one weak handle for code that genuinely needs
//! a rendezvous point.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use basedrop::{Shared, SharedCell};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::{AudioBackend, AudioError, AudioResult};
use crate::config::{EngineConfig, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use crate::engine::event::{EventKind, EventQueue, PendingEvents, SessionEvent, IMMEDIATE};
use crate::engine::gc::gc_handle;
use crate::engine::pool::EventPools;
use crate::engine::ports::{Port, PortRegistrationError, PortRegistry};
use crate::engine::transport::{Transport, TransportAtomics};
use crate::graph::mute::SessionSoloState;
use crate::graph::route::Route;
use crate::types::{ChanCount, DataType, FrameCount, FramePos, PortDirection};

/// Notifications flowing from the engine to observer threads
///
/// Sent over a bounded channel with `try_send`; the real-time side never
/// blocks on a slow observer, it drops and counts instead.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// The engine connected to its backend and is processing
    Running,
    /// Processing stopped (the connection may still exist)
    Stopped,
    /// Freewheel (offline-render) mode toggled
    Freewheel(bool),
    /// A cycle deadline was missed; reported, not fatal
    Xrun,
    /// The backend is gone; fatal for this engine session
    Halted(String),
    /// The backend reordered its processing graph
    GraphReordered,
    SampleRateChanged(u32),
    BufferSizeChanged(u32),
    /// A port was registered or unregistered
    PortsChanged,
    /// Some route's aggregate latency changed
    LatencyChanged,
}

/// What one invocation of `cycle` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Routes processed; output port buffers hold the cycle's audio
    Processed,
    /// The cycle degraded to silence (lock contention, not running)
    Silent,
    /// The engine is halted; the backend should stop calling
    Halted,
}

/// The published process-order list of routes
pub struct RouteList {
    routes: Vec<Arc<Route>>,
}

impl RouteList {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// State owned by the real-time thread, behind the process try-lock
struct RtState {
    transport: Transport,
    pending: PendingEvents,
    scratch: Vec<Box<SessionEvent>>,
}

pub struct EngineDriver {
    config: EngineConfig,
    ports: PortRegistry,
    events: EventQueue,
    session_solo: Arc<SessionSoloState>,

    /// The process lock: the real-time thread only ever try-locks it
    rt: Mutex<RtState>,
    transport_atomics: Arc<TransportAtomics>,
    routes: SharedCell<RouteList>,

    backend: Mutex<Option<Box<dyn AudioBackend>>>,

    signal_tx: Sender<EngineSignal>,
    signal_rx: Receiver<EngineSignal>,

    running: AtomicBool,
    freewheeling: AtomicBool,
    halted: AtomicBool,
    need_butler: AtomicBool,

    sample_rate: AtomicU32,
    buffer_size: AtomicU32,
    processed_frames: AtomicU64,
    xruns: AtomicU64,
    contended_cycles: AtomicU64,
    dropped_signals: AtomicU64,
}

impl EngineDriver {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let pools = Arc::new(EventPools::new(config.event_pool_size));
        let (events, pending) = EventQueue::with_capacity(config.event_queue_capacity, pools);
        let (signal_tx, signal_rx) = bounded(config.signal_capacity);

        let transport = Transport::new();
        let transport_atomics = transport.atomics();
        let scratch = Vec::with_capacity(config.event_queue_capacity);

        let handle = gc_handle();
        Arc::new(Self {
            sample_rate: AtomicU32::new(config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)),
            buffer_size: AtomicU32::new(config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)),
            config,
            ports: PortRegistry::new(),
            events,
            session_solo: Arc::new(SessionSoloState::new()),
            rt: Mutex::new(RtState {
                transport,
                pending,
                scratch,
            }),
            transport_atomics,
            routes: SharedCell::new(Shared::new(&handle, RouteList { routes: Vec::new() })),
            backend: Mutex::new(None),
            signal_tx,
            signal_rx,
            running: AtomicBool::new(false),
            freewheeling: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            need_butler: AtomicBool::new(false),
            processed_frames: AtomicU64::new(0),
            xruns: AtomicU64::new(0),
            contended_cycles: AtomicU64::new(0),
            dropped_signals: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// The raw event submission surface (typed helpers below cover the
    /// common requests)
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Receiver for engine notifications; hand this to one observer loop
    pub fn signals(&self) -> Receiver<EngineSignal> {
        self.signal_rx.clone()
    }

    /// Lock-free transport position/state for observer threads
    pub fn transport(&self) -> Arc<TransportAtomics> {
        Arc::clone(&self.transport_atomics)
    }

    pub(crate) fn emit(&self, signal: EngineSignal) {
        if self.signal_tx.try_send(signal).is_err() {
            self.dropped_signals.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ── backend lifecycle ────────────────────────────────────────────

    /// Install the backend this engine will run against
    pub fn set_backend(&self, backend: Box<dyn AudioBackend>) {
        let mut slot = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(backend);
    }

    pub fn connected(&self) -> bool {
        self.backend
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Connect to the backend and begin processing
    pub fn start(&self) -> AudioResult<()> {
        let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        let b = backend
            .as_mut()
            .ok_or_else(|| AudioError::NoBackend("no backend installed".to_string()))?;
        b.start()?;

        let rate = b.sample_rate();
        let frames = b.buffer_size();
        self.sample_rate.store(rate, Ordering::Relaxed);
        self.buffer_size.store(frames, Ordering::Relaxed);
        if frames as usize > MAX_BUFFER_SIZE {
            self.ports.reserve_buffers(frames as usize);
        }

        self.halted.store(false, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        self.emit(EngineSignal::Running);
        log::info!(
            "engine '{}' running ({} Hz, {} frames/cycle)",
            self.config.client_name,
            rate,
            frames
        );
        Ok(())
    }

    /// Stop processing; `forever` also releases the backend
    pub fn stop(&self, forever: bool) -> AudioResult<()> {
        let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(b) = backend.as_mut() {
            b.stop(forever)?;
        }
        if forever {
            *backend = None;
        }
        self.running.store(false, Ordering::Relaxed);
        self.emit(EngineSignal::Stopped);
        log::info!("engine '{}' stopped", self.config.client_name);
        Ok(())
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Switch between backend-paced and as-fast-as-possible rendering
    pub fn freewheel(&self, onoff: bool) -> AudioResult<()> {
        {
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            let b = backend
                .as_mut()
                .ok_or_else(|| AudioError::NoBackend("no backend installed".to_string()))?;
            b.set_freewheel(onoff)?;
        }
        self.freewheeling.store(onoff, Ordering::Relaxed);
        self.emit(EngineSignal::Freewheel(onoff));
        Ok(())
    }

    pub fn freewheeling(&self) -> bool {
        self.freewheeling.load(Ordering::Relaxed)
    }

    /// Ask the backend for a different cycle size
    ///
    /// The change lands asynchronously through the buffer-size-changed
    /// notification, never mid-cycle.
    pub fn request_buffer_size(&self, frames: u32) -> AudioResult<()> {
        let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        let b = backend
            .as_mut()
            .ok_or_else(|| AudioError::NoBackend("no backend installed".to_string()))?;
        b.request_buffer_size(frames)
    }

    // ── backend notification hooks ───────────────────────────────────

    /// The backend missed a cycle deadline
    pub fn on_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
        self.emit(EngineSignal::Xrun);
    }

    /// The backend connection died; terminal for this engine session
    ///
    /// The next `cycle` short-circuits before touching any buffers. The
    /// owning application decides between reconnect (`start` again after
    /// installing a fresh backend) and teardown.
    pub fn handle_halt(&self, reason: &str) {
        self.halted.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        self.emit(EngineSignal::Halted(reason.to_string()));
        log::error!("backend halted: {}", reason);
    }

    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    pub fn on_sample_rate_changed(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
        self.emit(EngineSignal::SampleRateChanged(rate));
    }

    pub fn on_buffer_size_changed(&self, frames: u32) {
        self.buffer_size.store(frames, Ordering::Relaxed);
        if frames as usize > MAX_BUFFER_SIZE {
            self.ports.reserve_buffers(frames as usize);
        }
        self.emit(EngineSignal::BufferSizeChanged(frames));
    }

    pub fn on_graph_reordered(&self) {
        self.emit(EngineSignal::GraphReordered);
    }

    // ── ports ────────────────────────────────────────────────────────

    /// Register a port with the backend and publish a new snapshot
    pub fn register_port(
        &self,
        data_type: DataType,
        name: &str,
        direction: PortDirection,
    ) -> Result<Shared<Port>, PortRegistrationError> {
        {
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(b) = backend.as_mut() {
                b.register_port(data_type, name, direction).map_err(|reason| {
                    PortRegistrationError::BackendRefused {
                        name: name.to_string(),
                        reason,
                    }
                })?;
            }
        }
        let port = self.ports.register(data_type, name, direction)?;
        self.emit(EngineSignal::PortsChanged);
        Ok(port)
    }

    pub fn unregister_port(&self, port: &Port) -> Result<(), PortRegistrationError> {
        {
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(b) = backend.as_mut() {
                if let Err(reason) = b.unregister_port(port.name()) {
                    log::warn!("backend kept port '{}': {}", port.name(), reason);
                }
            }
        }
        self.ports.unregister(port)?;
        self.emit(EngineSignal::PortsChanged);
        Ok(())
    }

    // ── routes ───────────────────────────────────────────────────────

    /// Session-level factory hook: a route wired to this engine's solo
    /// model and signal channel
    pub fn new_route(&self, name: impl Into<String>, channels: ChanCount) -> Arc<Route> {
        let route = Route::new(
            name,
            channels,
            Arc::clone(&self.session_solo),
            self.signal_tx.clone(),
        );
        route.set_denormal_protection(self.config.denormal_protection);
        route
    }

    /// Publish a new process-order route list
    pub fn set_routes(&self, routes: Vec<Arc<Route>>) {
        let handle = gc_handle();
        self.routes.set(Shared::new(&handle, RouteList { routes }));
        self.emit(EngineSignal::GraphReordered);
    }

    pub fn route_count(&self) -> usize {
        self.routes.get().len()
    }

    /// Solo a route under this engine's exclusive-solo policy
    pub fn set_route_solo(&self, route: &Arc<Route>, yn: bool) {
        route.set_solo(yn, self.config.exclusive_solo);
    }

    /// Re-derive every route's aggregate latency
    ///
    /// Called after anything that shifts processing delay wholesale
    /// (buffer-size change, graph rewire); each changed route raises its
    /// own latency-changed signal.
    pub fn update_total_latencies(&self) {
        for route in self.routes.get().iter() {
            route.update_total_latency();
        }
    }

    // ── transport requests (non-real-time submission API) ────────────

    fn submit(
        &self,
        kind: EventKind,
        action_frame: FramePos,
        target_frame: FramePos,
        fill: impl FnOnce(&mut SessionEvent),
    ) -> bool {
        let mut ev = self.events.alloc(kind, action_frame, target_frame);
        fill(&mut ev);
        self.events.queue_event(ev)
    }

    pub fn request_locate(&self, target: FramePos, with_roll: bool) {
        self.submit(EventKind::Locate, IMMEDIATE, target, |ev| {
            ev.yes_or_no = with_roll;
        });
    }

    pub fn request_transport_speed(&self, speed: f64) {
        self.submit(EventKind::SetTransportSpeed, IMMEDIATE, 0, |ev| {
            ev.speed = speed;
        });
    }

    pub fn request_roll(&self) {
        self.request_transport_speed(1.0);
    }

    pub fn request_stop(&self) {
        self.request_transport_speed(0.0);
    }

    /// Stop when the playhead reaches `frame`; re-requesting moves the
    /// single outstanding stop
    pub fn request_stop_at(&self, frame: FramePos) {
        self.events.replace_event(EventKind::StopOnce, frame, 0);
    }

    /// Define the loop range and arm or disarm the auto-loop wrap
    pub fn set_play_loop(&self, start: FramePos, end: FramePos, enabled: bool) {
        self.submit(EventKind::SetLoop, IMMEDIATE, start, |ev| {
            ev.second_target = end;
            ev.yes_or_no = enabled;
        });
        if enabled {
            self.events.replace_event(EventKind::AutoLoop, end, start);
        } else {
            self.events.clear_events(EventKind::AutoLoop);
        }
    }

    /// Schedule punch-in/punch-out; each replaces its outstanding request
    pub fn set_punch_range(&self, punch_in: FramePos, punch_out: FramePos) {
        self.events.replace_event(EventKind::PunchIn, punch_in, 0);
        self.events.replace_event(EventKind::PunchOut, punch_out, 0);
    }

    /// Ask the disk layer to rebuild its buffers (via the butler flag)
    pub fn request_overwrite(&self) {
        self.submit(EventKind::Overwrite, IMMEDIATE, 0, |_| {});
    }

    /// Whether the disk butler should run, cleared by the asking
    pub fn take_butler_request(&self) -> bool {
        self.need_butler.swap(false, Ordering::Relaxed)
    }

    // ── the real-time entry point ────────────────────────────────────

    /// Process one cycle of `n_frames`
    ///
    /// Called by the backend's process callback (or the offline driver
    /// while freewheeling). No allocation, no blocking locks: a contended
    /// process lock yields a silent cycle, a halted backend short-circuits
    /// before any buffer is touched.
    pub fn cycle(&self, n_frames: FrameCount) -> CycleOutcome {
        if self.halted.load(Ordering::Relaxed) {
            return CycleOutcome::Halted;
        }
        let Ok(mut rt) = self.rt.try_lock() else {
            self.contended_cycles.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::Silent;
        };
        let n = n_frames.min(MAX_BUFFER_SIZE);

        // Output ports start silent; deliveries mix their routes in
        let snapshot = self.ports.current();
        for port in snapshot.iter() {
            if port.data_type() == DataType::Audio && port.direction() == PortDirection::Output {
                if let Some(mut buf) = port.cycle_buffer() {
                    buf.set_len_from_capacity(n);
                    buf.fill_silence();
                }
            }
        }

        let RtState {
            transport,
            pending,
            scratch,
        } = &mut *rt;

        let cycle_start = transport.position();
        let cycle_end = transport.cycle_end(n);
        transport.dispatch(pending, scratch, cycle_end);

        let declick = transport.take_pending_declick();
        let mut need_butler = transport.take_overwrite_requested();

        let routes = self.routes.get();
        for route in routes.iter() {
            let outcome = route.roll(cycle_start, cycle_end, n, declick);
            need_butler |= outcome.need_butler;
        }

        transport.advance(n);

        if need_butler {
            self.need_butler.store(true, Ordering::Relaxed);
        }
        self.processed_frames.fetch_add(n as u64, Ordering::Relaxed);
        CycleOutcome::Processed
    }

    // ── introspection ────────────────────────────────────────────────

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn frames_per_cycle(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    /// Frames processed since the engine was created
    pub fn processed_frames(&self) -> u64 {
        self.processed_frames.load(Ordering::Relaxed)
    }

    pub fn xrun_count(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    /// Cycles lost to process-lock contention
    pub fn contended_cycles(&self) -> u64 {
        self.contended_cycles.load(Ordering::Relaxed)
    }

    pub fn dropped_signals(&self) -> u64 {
        self.dropped_signals.load(Ordering::Relaxed)
    }

    // ── the active-engine registry ───────────────────────────────────

    /// Mark this engine as the process's active one
    pub fn set_active(engine: &Arc<EngineDriver>) {
        *active_registry().lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(engine);
    }

    /// The active engine, if one was marked and still lives
    pub fn active() -> Option<Arc<EngineDriver>> {
        active_registry()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
    }

    pub fn clear_active() {
        *active_registry().lock().unwrap_or_else(|e| e.into_inner()) = Weak::new();
    }
}

fn active_registry() -> &'static Mutex<Weak<EngineDriver>> {
    static ACTIVE: OnceLock<Mutex<Weak<EngineDriver>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(Weak::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Arc<EngineDriver> {
        EngineDriver::new(EngineConfig::new("test"))
    }

    /// Minimal backend standing in for a real connection
    struct StubBackend {
        started: bool,
        refuse_ports: bool,
    }

    impl AudioBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        fn sample_rate(&self) -> u32 {
            48000
        }

        fn buffer_size(&self) -> u32 {
            256
        }

        fn start(&mut self) -> AudioResult<()> {
            self.started = true;
            Ok(())
        }

        fn stop(&mut self, _forever: bool) -> AudioResult<()> {
            self.started = false;
            Ok(())
        }

        fn set_freewheel(&mut self, _on: bool) -> AudioResult<()> {
            Ok(())
        }

        fn register_port(
            &mut self,
            _data_type: DataType,
            name: &str,
            _direction: PortDirection,
        ) -> Result<(), String> {
            if self.refuse_ports {
                Err(format!("no room for '{}'", name))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_start_requires_backend() {
        let d = driver();
        assert!(matches!(d.start(), Err(AudioError::NoBackend(_))));

        d.set_backend(Box::new(StubBackend {
            started: false,
            refuse_ports: false,
        }));
        d.start().unwrap();
        assert!(d.running());
        assert_eq!(d.sample_rate(), 48000);
        assert_eq!(d.frames_per_cycle(), 256);

        let signals = d.signals();
        assert_eq!(signals.try_recv().unwrap(), EngineSignal::Running);

        d.stop(true).unwrap();
        assert!(!d.running());
        assert!(!d.connected());
    }

    #[test]
    fn test_backend_port_refusal_is_reported() {
        let d = driver();
        d.set_backend(Box::new(StubBackend {
            started: false,
            refuse_ports: true,
        }));

        let err = d
            .register_port(DataType::Audio, "out", PortDirection::Output)
            .err()
            .unwrap();
        assert!(matches!(err, PortRegistrationError::BackendRefused { .. }));
        // Nothing was published
        assert_eq!(d.ports().current().len(), 0);
    }

    #[test]
    fn test_cycle_processes_route_end_to_end() {
        let d = driver();
        let input = d
            .register_port(DataType::Audio, "track/in", PortDirection::Input)
            .unwrap();
        let output = d
            .register_port(DataType::Audio, "master/out", PortDirection::Output)
            .unwrap();

        let route = d.new_route("track", ChanCount::audio(1));
        route.set_denormal_protection(false);
        route.set_input_ports(vec![input.clone()]).unwrap();
        route.set_output_ports(vec![output.clone()]);
        d.set_routes(vec![route]);

        input.write_cycle(&[0.5; 128]);
        assert_eq!(d.cycle(128), CycleOutcome::Processed);

        let mut out = [0.0f32; 128];
        assert!(output.read_cycle(&mut out));
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert_eq!(d.processed_frames(), 128);
    }

    #[test]
    fn test_halted_cycle_short_circuits() {
        let d = driver();
        d.handle_halt("server died");

        assert_eq!(d.cycle(256), CycleOutcome::Halted);
        assert_eq!(d.processed_frames(), 0);

        let signals = d.signals();
        assert!(matches!(
            signals.try_recv().unwrap(),
            EngineSignal::Halted(_)
        ));
    }

    #[test]
    fn test_contended_process_lock_yields_silence() {
        let d = driver();
        let guard = d.rt.lock().unwrap();
        assert_eq!(d.cycle(64), CycleOutcome::Silent);
        drop(guard);
        assert_eq!(d.contended_cycles(), 1);
        assert_eq!(d.cycle(64), CycleOutcome::Processed);
    }

    #[test]
    fn test_locate_applies_within_cycle() {
        let d = driver();
        d.request_locate(96000, false);
        d.cycle(256);
        assert_eq!(d.transport().position(), 96000);
    }

    #[test]
    fn test_transport_rolls_across_cycles() {
        let d = driver();
        d.request_roll();
        d.cycle(256);
        d.cycle(256);
        assert_eq!(d.transport().position(), 512);
        assert!(d.transport().rolling());

        d.request_stop();
        d.cycle(256);
        assert!(!d.transport().rolling());
    }

    #[test]
    fn test_butler_flag_via_overwrite() {
        let d = driver();
        assert!(!d.take_butler_request());
        d.request_overwrite();
        d.cycle(64);
        assert!(d.take_butler_request());
        assert!(!d.take_butler_request());
    }

    #[test]
    fn test_xrun_counted_and_signaled() {
        let d = driver();
        let signals = d.signals();
        d.on_xrun();
        assert_eq!(d.xrun_count(), 1);
        assert_eq!(signals.try_recv().unwrap(), EngineSignal::Xrun);
    }

    #[test]
    fn test_active_engine_registry() {
        let d = driver();
        EngineDriver::set_active(&d);
        assert!(EngineDriver::active().is_some());
        EngineDriver::clear_active();
        assert!(EngineDriver::active().is_none());

        let d2 = driver();
        EngineDriver::set_active(&d2);
        drop(d2);
        // A dead engine is no longer active
        assert!(EngineDriver::active().is_none());
    }

    #[test]
    fn test_solo_uses_engine_policy() {
        let d = driver();
        let a = d.new_route("a", ChanCount::audio(2));
        let b = d.new_route("b", ChanCount::audio(2));
        d.set_routes(vec![Arc::clone(&a), Arc::clone(&b)]);

        d.set_route_solo(&a, true);
        assert!(!a.effectively_muted());
        assert!(b.effectively_muted());
    }
}
