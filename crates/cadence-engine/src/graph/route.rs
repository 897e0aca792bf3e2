//! Route - one track or bus worth of per-cycle processing
//!
//! A route owns an ordered processor chain (always containing the amp,
//! meter and main delivery stages), gain/mute/solo state, port bundles and
//! latency accounting. The real-time thread only ever try-locks the chain:
//! structural editors block each other, never the cycle - a contended
//! cycle is silent, not late.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use basedrop::Shared;
use crossbeam_channel::Sender;
use thiserror::Error;

use crate::config::MAX_BUFFER_SIZE;
use crate::engine::driver::EngineSignal;
use crate::engine::ports::Port;
use crate::graph::amp::{Amp, GainControl};
use crate::graph::delivery::MainDelivery;
use crate::graph::meter::{MeterLevels, PeakMeter};
use crate::graph::mute::{MuteMaster, SessionSoloState};
use crate::graph::processor::{ConfigurationError, Processor, ProcessorKind};
use crate::types::{BufferSet, ChanCount, Declick, FrameCount, FramePos};

/// Sentinel for "no user latency override"
const USER_LATENCY_UNSET: u64 = u64::MAX;

/// Offset added to every sample while denormal protection is on
const DENORMAL_OFFSET: f32 = 1.0e-27;

/// Where a processor sits relative to the fader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    PreFader,
    PostFader,
}

/// Structural chain edit failures
#[derive(Error, Debug)]
pub enum ProcessorEditError {
    /// The amp, meter and delivery stages can be repositioned, not removed
    #[error("the {0:?} stage cannot be removed")]
    FixedStage(ProcessorKind),

    #[error("no processor at index {0}")]
    NoSuchProcessor(usize),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// What one route did with one cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct RollOutcome {
    /// The route could not process and contributed silence
    pub silenced: bool,
    /// Disk buffers want a non-real-time refill
    pub need_butler: bool,
}

impl RollOutcome {
    fn silenced() -> Self {
        Self {
            silenced: true,
            need_butler: false,
        }
    }
}

/// A chain entry: the fixed stages by tag, anything else boxed
///
/// The closed variant set is what lets the route address "the amp" or
/// "the delivery" directly instead of scanning and downcasting.
pub enum ChainProcessor {
    Amp(Amp),
    Meter(PeakMeter),
    Delivery(MainDelivery),
    Custom(Box<dyn Processor>),
}

impl ChainProcessor {
    pub fn kind(&self) -> ProcessorKind {
        match self {
            ChainProcessor::Amp(_) => ProcessorKind::Amp,
            ChainProcessor::Meter(_) => ProcessorKind::Meter,
            ChainProcessor::Delivery(_) => ProcessorKind::MainDelivery,
            ChainProcessor::Custom(_) => ProcessorKind::Custom,
        }
    }

    fn as_processor(&mut self) -> &mut dyn Processor {
        match self {
            ChainProcessor::Amp(p) => p,
            ChainProcessor::Meter(p) => p,
            ChainProcessor::Delivery(p) => p,
            ChainProcessor::Custom(p) => p.as_mut(),
        }
    }

    fn as_processor_ref(&self) -> &dyn Processor {
        match self {
            ChainProcessor::Amp(p) => p,
            ChainProcessor::Meter(p) => p,
            ChainProcessor::Delivery(p) => p,
            ChainProcessor::Custom(p) => p.as_ref(),
        }
    }
}

/// The processor list and everything processed under its lock
struct ProcessorChain {
    slots: Vec<ChainProcessor>,
    bufs: BufferSet,
    inputs: Vec<Shared<Port>>,
    /// Negotiation entry width when no input ports are bound
    base_channels: ChanCount,
    max_streams: ChanCount,
    configured: bool,
}

impl ProcessorChain {
    /// Channel count entering the chain
    fn input_streams(&self) -> ChanCount {
        if self.inputs.is_empty() {
            self.base_channels
        } else {
            ChanCount::audio(self.inputs.len() as u32)
        }
    }

    fn index_of(&self, kind: ProcessorKind) -> Option<usize> {
        self.slots.iter().position(|s| s.kind() == kind)
    }
}

/// A named processing unit (track or bus)
pub struct Route {
    name: String,
    chain: Mutex<ProcessorChain>,
    gain: Arc<GainControl>,
    mute_master: Arc<MuteMaster>,
    session_solo: Arc<SessionSoloState>,
    meter_levels: Arc<MeterLevels>,

    self_solo: AtomicBool,
    soloed_by_upstream: AtomicU32,
    soloed_by_downstream: AtomicU32,
    solo_isolated: AtomicU32,
    solo_safe: AtomicBool,

    fed_by: Mutex<Vec<Weak<Route>>>,
    feeds: Mutex<Vec<Weak<Route>>>,

    user_latency: AtomicU64,
    signal_latency: AtomicU64,

    phase_invert: AtomicU32,
    denormal_protection: AtomicBool,
    /// Re-entrancy guard around renegotiation
    in_configure: AtomicBool,
    /// Cycles degraded to silence by a mid-cycle count mismatch
    count_mismatches: AtomicU64,

    signals: Sender<EngineSignal>,
}

impl Route {
    /// Create a route with the default chain: amp, meter (post-fader),
    /// main delivery.
    pub fn new(
        name: impl Into<String>,
        channels: ChanCount,
        session_solo: Arc<SessionSoloState>,
        signals: Sender<EngineSignal>,
    ) -> Arc<Self> {
        let gain = Arc::new(GainControl::new(1.0));
        let mute_master = Arc::new(MuteMaster::new());

        let amp = Amp::new(
            Arc::clone(&gain),
            Arc::clone(&mute_master),
            Arc::clone(&session_solo),
        );
        let meter = PeakMeter::new(channels.n_audio().max(8) as usize);
        let meter_levels = meter.levels();

        let chain = ProcessorChain {
            slots: vec![
                ChainProcessor::Amp(amp),
                ChainProcessor::Meter(meter),
                ChainProcessor::Delivery(MainDelivery::new()),
            ],
            bufs: BufferSet::with_capacity(channels.n_audio().max(2) as usize, MAX_BUFFER_SIZE),
            inputs: Vec::new(),
            base_channels: channels,
            max_streams: channels,
            configured: false,
        };

        let route = Arc::new(Self {
            name: name.into(),
            chain: Mutex::new(chain),
            gain,
            mute_master,
            session_solo,
            meter_levels,
            self_solo: AtomicBool::new(false),
            soloed_by_upstream: AtomicU32::new(0),
            soloed_by_downstream: AtomicU32::new(0),
            solo_isolated: AtomicU32::new(0),
            solo_safe: AtomicBool::new(false),
            fed_by: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
            user_latency: AtomicU64::new(USER_LATENCY_UNSET),
            signal_latency: AtomicU64::new(0),
            phase_invert: AtomicU32::new(0),
            denormal_protection: AtomicBool::new(true),
            in_configure: AtomicBool::new(false),
            count_mismatches: AtomicU64::new(0),
            signals,
        });

        // The default chain is all pass-through stages, this cannot fail
        route
            .configure_processors()
            .expect("default chain must configure");
        route
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── gain / mute ──────────────────────────────────────────────────

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain);
    }

    /// Relative fader move
    pub fn inc_gain(&self, factor: f32) {
        self.gain.scale(factor);
    }

    pub fn set_mute(&self, yn: bool) {
        self.mute_master.set_muted_by_self(yn);
    }

    pub fn muted_by_self(&self) -> bool {
        self.mute_master.muted_by_self()
    }

    /// The single effective-mute decision consumed by the amp stage
    pub fn effectively_muted(&self) -> bool {
        self.mute_master.muted(self.session_solo.soloing())
    }

    /// Meter levels handle for observer threads
    pub fn meter_levels(&self) -> Arc<MeterLevels> {
        Arc::clone(&self.meter_levels)
    }

    pub fn set_phase_invert(&self, channel_mask: u32) {
        self.phase_invert.store(channel_mask, Ordering::Relaxed);
    }

    pub fn phase_invert(&self) -> u32 {
        self.phase_invert.load(Ordering::Relaxed)
    }

    pub fn set_denormal_protection(&self, yn: bool) {
        self.denormal_protection.store(yn, Ordering::Relaxed);
    }

    // ── solo state machine ───────────────────────────────────────────

    pub fn self_soloed(&self) -> bool {
        self.self_solo.load(Ordering::Relaxed)
    }

    pub fn soloed_by_others_upstream(&self) -> u32 {
        self.soloed_by_upstream.load(Ordering::Relaxed)
    }

    pub fn soloed_by_others_downstream(&self) -> u32 {
        self.soloed_by_downstream.load(Ordering::Relaxed)
    }

    pub fn solo_isolated(&self) -> bool {
        self.solo_isolated.load(Ordering::Relaxed) > 0
    }

    pub fn set_solo_safe(&self, yn: bool) {
        self.solo_safe.store(yn, Ordering::Relaxed);
    }

    pub fn solo_safe(&self) -> bool {
        self.solo_safe.load(Ordering::Relaxed)
    }

    /// Audible with respect to solo: part of a solo from any direction
    pub fn solo_audible(&self) -> bool {
        self.self_soloed()
            || self.soloed_by_others_upstream() > 0
            || self.soloed_by_others_downstream() > 0
    }

    fn set_mute_master_solo(&self) {
        self.mute_master.set_soloed(self.solo_audible());
    }

    /// Solo or un-solo this route, propagating the change along the feed
    /// graph: +1/-1 soloed-by-upstream to everything it feeds, +1/-1
    /// soloed-by-downstream to everything feeding it, recursively.
    pub fn set_solo(self: &Arc<Self>, yn: bool, exclusive: bool) {
        if self.solo_safe() {
            return;
        }
        if self.self_soloed() == yn {
            return;
        }

        self.self_solo.store(yn, Ordering::Relaxed);
        self.session_solo.modify(if yn { 1 } else { -1 });
        let delta: i32 = if yn { 1 } else { -1 };

        let mut visited = vec![Arc::as_ptr(self)];
        push_solo_downstream(self, delta, exclusive, &mut visited);

        let mut visited = vec![Arc::as_ptr(self)];
        push_solo_upstream(self, delta, &mut visited);

        self.set_mute_master_solo();
        log::debug!("route '{}' solo -> {}", self.name, yn);
    }

    /// Adjust the count of soloed routes upstream of this one
    ///
    /// When this route is already audible on its own account (self-soloed
    /// or soloed from downstream) and the upstream count crosses zero, the
    /// downstream grants it handed out to its feeders are inverted so a
    /// solo inside a bus group doesn't keep sibling tracks audible. The
    /// inverse push happens only on the increase side under exclusive
    /// solo.
    pub fn mod_solo_by_others_upstream(self: &Arc<Self>, delta: i32, exclusive: bool) {
        if self.solo_safe() {
            return;
        }

        let old = self.soloed_by_upstream.load(Ordering::Relaxed);
        let new = if delta < 0 {
            old.saturating_sub(delta.unsigned_abs())
        } else {
            old + delta as u32
        };
        self.soloed_by_upstream.store(new, Ordering::Relaxed);

        if (self.self_soloed() || self.soloed_by_others_downstream() > 0)
            && ((old == 0 && new > 0) || (old > 0 && new == 0))
            && (delta > 0 || !exclusive)
        {
            for feeder in self.fed_by_strong() {
                feeder.mod_solo_by_others_downstream(-delta);
            }
        }

        self.set_mute_master_solo();
    }

    /// Adjust the count of soloed routes downstream of this one
    pub fn mod_solo_by_others_downstream(&self, delta: i32) {
        if self.solo_safe() {
            return;
        }

        let old = self.soloed_by_downstream.load(Ordering::Relaxed);
        let new = if delta < 0 {
            old.saturating_sub(delta.unsigned_abs())
        } else {
            old + delta as u32
        };
        self.soloed_by_downstream.store(new, Ordering::Relaxed);
        self.set_mute_master_solo();
    }

    /// Isolate this route (and everything it feeds) from solo elsewhere
    ///
    /// Isolation is a count so overlapping isolation requests unwind in
    /// any order. Propagation is forward-only: feeders are not isolated
    /// on behalf of what they feed.
    pub fn set_solo_isolated(self: &Arc<Self>, yn: bool) {
        self.apply_solo_isolate(yn);
        let mut visited = vec![Arc::as_ptr(self)];
        let mut stack = self.feeds_strong();
        while let Some(next) = stack.pop() {
            if visited.contains(&Arc::as_ptr(&next)) {
                continue;
            }
            visited.push(Arc::as_ptr(&next));
            next.apply_solo_isolate(yn);
            stack.extend(next.feeds_strong());
        }
    }

    fn apply_solo_isolate(&self, yn: bool) {
        if yn {
            if self.solo_isolated.fetch_add(1, Ordering::Relaxed) == 0 {
                self.mute_master.set_solo_ignore(true);
            }
        } else {
            let old = self.solo_isolated.load(Ordering::Relaxed);
            if old > 0 {
                if self.solo_isolated.fetch_sub(1, Ordering::Relaxed) == 1 {
                    self.mute_master.set_solo_ignore(false);
                }
            }
        }
    }

    // ── feed graph ───────────────────────────────────────────────────

    /// Record that `upstream` feeds `downstream`
    pub fn add_feed(upstream: &Arc<Route>, downstream: &Arc<Route>) {
        upstream
            .feeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(downstream));
        downstream
            .fed_by
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(upstream));
    }

    fn feeds_strong(&self) -> Vec<Arc<Route>> {
        self.feeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn fed_by_strong(&self) -> Vec<Arc<Route>> {
        self.fed_by
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    // ── structural chain edits (non-real-time) ───────────────────────

    /// Bind input ports and renegotiate channel counts
    pub fn set_input_ports(&self, ports: Vec<Shared<Port>>) -> Result<(), ConfigurationError> {
        {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            chain.inputs = ports;
            Self::configure_unlocked(&mut chain)?;
        }
        self.update_total_latency();
        Ok(())
    }

    /// Bind output ports (consumed by the delivery stage)
    pub fn set_output_ports(&self, ports: Vec<Shared<Port>>) {
        {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(idx) = chain.index_of(ProcessorKind::MainDelivery) {
                if let ChainProcessor::Delivery(d) = &mut chain.slots[idx] {
                    d.set_outputs(ports);
                }
            }
        }
        self.update_total_latency();
    }

    /// Insert a processor before the fader or before the delivery stage
    pub fn add_processor(
        &self,
        processor: Box<dyn Processor>,
        placement: Placement,
    ) -> Result<(), ProcessorEditError> {
        {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            let idx = match placement {
                Placement::PreFader => chain.index_of(ProcessorKind::Amp).unwrap_or(0),
                Placement::PostFader => chain
                    .index_of(ProcessorKind::MainDelivery)
                    .unwrap_or(chain.slots.len()),
            };
            chain.slots.insert(idx, ChainProcessor::Custom(processor));

            if let Err(e) = Self::configure_unlocked(&mut chain) {
                // Back out the insert and restore the known-good config
                chain.slots.remove(idx);
                Self::configure_unlocked(&mut chain).ok();
                return Err(e.into());
            }
        }
        self.update_total_latency();
        Ok(())
    }

    /// Remove the processor at `index`; the fixed stages refuse
    pub fn remove_processor(&self, index: usize) -> Result<(), ProcessorEditError> {
        {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            let slot = chain
                .slots
                .get(index)
                .ok_or(ProcessorEditError::NoSuchProcessor(index))?;
            if slot.kind() != ProcessorKind::Custom {
                return Err(ProcessorEditError::FixedStage(slot.kind()));
            }

            let removed = chain.slots.remove(index);
            if let Err(e) = Self::configure_unlocked(&mut chain) {
                chain.slots.insert(index, removed);
                Self::configure_unlocked(&mut chain).ok();
                return Err(e.into());
            }
        }
        self.update_total_latency();
        Ok(())
    }

    /// Move the meter stage to the pre- or post-fader slot
    pub fn set_meter_position(&self, placement: Placement) -> Result<(), ProcessorEditError> {
        {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            let meter_idx = chain
                .index_of(ProcessorKind::Meter)
                .expect("meter stage always present");
            let meter = chain.slots.remove(meter_idx);

            let amp_idx = chain
                .index_of(ProcessorKind::Amp)
                .expect("amp stage always present");
            let new_idx = match placement {
                Placement::PreFader => amp_idx,
                Placement::PostFader => amp_idx + 1,
            };
            chain.slots.insert(new_idx, meter);

            if let Err(e) = Self::configure_unlocked(&mut chain) {
                let meter = chain.slots.remove(new_idx);
                let restore_idx = meter_idx.min(chain.slots.len());
                chain.slots.insert(restore_idx, meter);
                Self::configure_unlocked(&mut chain).ok();
                return Err(e.into());
            }
        }
        self.update_total_latency();
        Ok(())
    }

    /// Kinds in chain order (for inspection and tests)
    pub fn processor_kinds(&self) -> Vec<ProcessorKind> {
        self.chain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .slots
            .iter()
            .map(|s| s.kind())
            .collect()
    }

    /// Cycles this route degraded to silence on a count mismatch
    pub fn count_mismatches(&self) -> u64 {
        self.count_mismatches.load(Ordering::Relaxed)
    }

    /// Widest channel count anywhere in the configured chain
    pub fn max_streams(&self) -> ChanCount {
        self.chain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .max_streams
    }

    // ── channel-count negotiation ────────────────────────────────────

    /// Renegotiate channel counts front-to-back
    ///
    /// Greedy forward propagation: each processor is offered the previous
    /// one's output count. All-or-nothing - on the first refusal nothing
    /// has been committed and the route keeps running its last known-good
    /// configuration.
    pub fn configure_processors(&self) -> Result<(), ConfigurationError> {
        // Re-entrant calls (processor callbacks asking for another pass)
        // are absorbed; the outer call finishes the job.
        if self.in_configure.swap(true, Ordering::Acquire) {
            return Ok(());
        }
        let result = {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            Self::configure_unlocked(&mut chain)
        };
        self.in_configure.store(false, Ordering::Release);
        if result.is_ok() {
            self.update_total_latency();
        }
        result
    }

    fn configure_unlocked(chain: &mut ProcessorChain) -> Result<(), ConfigurationError> {
        // Pass 1: ask, commit nothing
        let mut count = chain.input_streams();
        let mut plan: Vec<(ChanCount, ChanCount)> = Vec::with_capacity(chain.slots.len());
        for (index, slot) in chain.slots.iter().enumerate() {
            let p = slot.as_processor_ref();
            match p.can_support_io_configuration(count) {
                Some(out) => {
                    plan.push((count, out));
                    count = out;
                }
                None => {
                    return Err(ConfigurationError {
                        name: p.name().to_string(),
                        index,
                        input: count,
                    });
                }
            }
        }

        // Pass 2: commit the approved plan
        let mut max_streams = chain.input_streams();
        for (index, (slot, (input, output))) in
            chain.slots.iter_mut().zip(plan.into_iter()).enumerate()
        {
            let p = slot.as_processor();
            if !p.configure_io(input, output) {
                chain.configured = false;
                return Err(ConfigurationError {
                    name: p.name().to_string(),
                    index,
                    input,
                });
            }
            max_streams = ChanCount::max(max_streams, input);
            max_streams = ChanCount::max(max_streams, output);
        }

        chain.max_streams = max_streams;
        chain
            .bufs
            .ensure_channels(max_streams.n_audio() as usize, MAX_BUFFER_SIZE);
        chain.configured = true;
        Ok(())
    }

    // ── latency accounting ───────────────────────────────────────────

    /// Explicit latency override; None returns to derived input latency
    pub fn set_user_latency(&self, frames: Option<u64>) {
        self.user_latency
            .store(frames.unwrap_or(USER_LATENCY_UNSET), Ordering::Relaxed);
        self.update_total_latency();
    }

    /// Current aggregate signal latency in frames
    pub fn signal_latency(&self) -> u64 {
        self.signal_latency.load(Ordering::Relaxed)
    }

    /// Recompute and republish aggregate latency
    ///
    /// Sum of every active processor's latency, plus the input side's
    /// accumulated latency unless a user override replaces it. A change
    /// raises a latency-changed signal so dependents re-derive their
    /// delay compensation.
    pub fn update_total_latency(&self) -> u64 {
        let total = {
            let chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            let mut total: u64 = chain
                .slots
                .iter()
                .map(|s| s.as_processor_ref())
                .filter(|p| p.active())
                .map(|p| p.signal_latency())
                .sum();

            let user = self.user_latency.load(Ordering::Relaxed);
            if user == USER_LATENCY_UNSET {
                total += chain.inputs.iter().map(|p| p.latency()).max().unwrap_or(0);
            } else {
                total += user;
            }

            // Republish on the output side
            if let Some(idx) = chain.index_of(ProcessorKind::MainDelivery) {
                if let ChainProcessor::Delivery(d) = &chain.slots[idx] {
                    for port in d.outputs() {
                        port.set_latency(total);
                    }
                }
            }
            total
        };

        let old = self.signal_latency.swap(total, Ordering::Relaxed);
        if old != total {
            let _ = self.signals.try_send(EngineSignal::LatencyChanged);
        }
        total
    }

    // ── the real-time path ───────────────────────────────────────────

    /// Process one cycle: fill from input ports, run the chain, deliver
    ///
    /// Never blocks. A contended chain or port lock degrades to silence
    /// for this cycle and the caller retries next cycle.
    pub fn roll(
        &self,
        start_frame: FramePos,
        end_frame: FramePos,
        n_frames: FrameCount,
        declick: Declick,
    ) -> RollOutcome {
        let Ok(mut chain) = self.chain.try_lock() else {
            return RollOutcome::silenced();
        };
        if !chain.configured {
            return RollOutcome::silenced();
        }

        let entry = chain.input_streams().n_audio() as usize;
        chain.bufs.set_frame_len(n_frames);
        if !chain.bufs.set_count(entry) {
            return RollOutcome::silenced();
        }

        // Pull input port buffers into the working set
        let ProcessorChain { bufs, inputs, .. } = &mut *chain;
        for (ch, buf) in bufs.iter_mut().enumerate() {
            match inputs.get(ch).and_then(|p| p.cycle_buffer()) {
                Some(src) if src.len() >= n_frames => {
                    buf.as_mut_slice().copy_from_slice(&src.as_slice()[..n_frames]);
                }
                _ => buf.fill_silence(),
            }
        }

        self.process_buffers(&mut chain, start_frame, end_frame, n_frames, declick);
        RollOutcome::default()
    }

    /// A cycle with no signal: keep the meters honest, deliver nothing
    pub fn silence(&self, n_frames: FrameCount) {
        let Ok(mut chain) = self.chain.try_lock() else {
            return;
        };
        let entry = chain.input_streams().n_audio() as usize;
        chain.bufs.set_frame_len(n_frames);
        if !chain.bufs.set_count(entry) {
            return;
        }
        chain.bufs.fill_silence();

        let ProcessorChain { slots, bufs, .. } = &mut *chain;
        for slot in slots.iter_mut() {
            if slot.kind() == ProcessorKind::Meter {
                slot.as_processor().run(bufs, 0, n_frames as FramePos, n_frames, false);
            }
        }
    }

    /// Transform the working buffers in the fixed order: declick ramp,
    /// denormal/phase correction, then each processor front to back with
    /// channel-count handoff.
    fn process_buffers(
        &self,
        chain: &mut ProcessorChain,
        start_frame: FramePos,
        end_frame: FramePos,
        n_frames: FrameCount,
        declick: Declick,
    ) {
        let ProcessorChain { slots, bufs, .. } = &mut *chain;

        match declick {
            Declick::FadeIn => Amp::apply_gain_ramp(bufs, n_frames, 0.0, 1.0),
            Declick::FadeOut => Amp::apply_gain_ramp(bufs, n_frames, 1.0, 0.0),
            Declick::None => {}
        }

        let phase = self.phase_invert.load(Ordering::Relaxed);
        let denormal = self.denormal_protection.load(Ordering::Relaxed);
        if phase != 0 || denormal {
            for (ch, buf) in bufs.iter_mut().enumerate() {
                let invert = phase & (1u32 << ch.min(31)) != 0;
                let offset = if denormal { DENORMAL_OFFSET } else { 0.0 };
                for s in buf.as_mut_slice() {
                    if invert {
                        *s = -*s + offset;
                    } else {
                        *s += offset;
                    }
                }
            }
        }

        let last = slots.len().saturating_sub(1);
        for (idx, slot) in slots.iter_mut().enumerate() {
            let p = slot.as_processor();

            // A mismatched handoff means a structural edit raced ahead of
            // renegotiation: fail safe with silence, never index past the
            // allocation.
            if bufs.count() != p.input_streams().n_audio() as usize {
                bufs.fill_silence();
                self.count_mismatches.fetch_add(1, Ordering::Relaxed);
                return;
            }

            p.run(bufs, start_frame, end_frame, n_frames, idx != last);

            if !bufs.set_count(p.output_streams().n_audio() as usize) {
                bufs.fill_silence();
                self.count_mismatches.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }
}

/// Walk everything `route` feeds, applying the upstream-solo delta
fn push_solo_downstream(
    route: &Arc<Route>,
    delta: i32,
    exclusive: bool,
    visited: &mut Vec<*const Route>,
) {
    for next in route.feeds_strong() {
        if visited.contains(&Arc::as_ptr(&next)) {
            continue;
        }
        visited.push(Arc::as_ptr(&next));
        next.mod_solo_by_others_upstream(delta, exclusive);
        push_solo_downstream(&next, delta, exclusive, visited);
    }
}

/// Walk everything feeding `route`, applying the downstream-solo delta
fn push_solo_upstream(route: &Arc<Route>, delta: i32, visited: &mut Vec<*const Route>) {
    for next in route.fed_by_strong() {
        if visited.contains(&Arc::as_ptr(&next)) {
            continue;
        }
        visited.push(Arc::as_ptr(&next));
        next.mod_solo_by_others_downstream(delta);
        push_solo_upstream(&next, delta, visited);
    }
}
