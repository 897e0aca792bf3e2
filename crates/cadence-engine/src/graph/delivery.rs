//! Main delivery stage
//!
//! The final, always-present chain stage: it hands the processed buffer
//! set to the route's output ports. Output port buffers are zeroed by the
//! driver at cycle start, so delivery mixes - several routes feeding the
//! same port sum naturally, which is what makes a port a bus input.

use basedrop::Shared;

use crate::engine::ports::Port;
use crate::graph::processor::Processor;
use crate::types::{BufferSet, ChanCount, FrameCount, FramePos};

/// The delivery stage at the end of a route's chain
pub struct MainDelivery {
    outputs: Vec<Shared<Port>>,
    streams: ChanCount,
    active: bool,
}

impl MainDelivery {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            streams: ChanCount::ZERO,
            active: true,
        }
    }

    /// Replace the output port bundle (structural, under the chain lock)
    pub fn set_outputs(&mut self, outputs: Vec<Shared<Port>>) {
        self.outputs = outputs;
    }

    pub fn outputs(&self) -> &[Shared<Port>] {
        &self.outputs
    }
}

impl Default for MainDelivery {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MainDelivery {
    fn name(&self) -> &str {
        "main outs"
    }

    fn can_support_io_configuration(&self, input: ChanCount) -> Option<ChanCount> {
        Some(input)
    }

    fn configure_io(&mut self, input: ChanCount, output: ChanCount) -> bool {
        if input != output {
            return false;
        }
        self.streams = input;
        true
    }

    fn run(
        &mut self,
        bufs: &mut BufferSet,
        _start_frame: FramePos,
        _end_frame: FramePos,
        n_frames: FrameCount,
        replace: bool,
    ) {
        if !self.active {
            return;
        }
        for (ch, port) in self.outputs.iter().enumerate() {
            let Some(src) = bufs.get(ch) else {
                break;
            };
            // try-lock only: a contended port just misses this route's
            // contribution for one cycle
            if let Some(mut dst) = port.cycle_buffer() {
                if dst.len() < n_frames {
                    dst.set_len_from_capacity(n_frames);
                }
                if replace {
                    dst.copy_from(src);
                } else {
                    dst.mix_from(src);
                }
            }
        }
    }

    fn input_streams(&self) -> ChanCount {
        self.streams
    }

    fn output_streams(&self) -> ChanCount {
        self.streams
    }

    fn active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, yn: bool) {
        self.active = yn;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ports::PortRegistry;
    use crate::types::{DataType, PortDirection};

    fn signal(bufs: &mut BufferSet, value: f32) {
        for buf in bufs.iter_mut() {
            for s in buf.as_mut_slice() {
                *s = value;
            }
        }
    }

    #[test]
    fn test_delivery_mixes_into_ports() {
        let registry = PortRegistry::new();
        let out = registry
            .register(DataType::Audio, "bus/in 1", PortDirection::Output)
            .unwrap();

        // Cycle start: driver zeroes the port buffer
        assert!(out.write_cycle(&[0.0; 16]));

        let mut delivery = MainDelivery::new();
        delivery.configure_io(ChanCount::audio(1), ChanCount::audio(1));
        delivery.set_outputs(vec![out.clone()]);

        let mut bufs = BufferSet::with_capacity(1, 16);
        bufs.set_frame_len(16);
        signal(&mut bufs, 0.25);

        // Two routes delivering to the same port sum
        delivery.run(&mut bufs, 0, 16, 16, false);
        delivery.run(&mut bufs, 0, 16, 16, false);

        let mut result = [0.0f32; 16];
        assert!(out.read_cycle(&mut result));
        assert!(result.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_replace_overwrites() {
        let registry = PortRegistry::new();
        let out = registry
            .register(DataType::Audio, "out", PortDirection::Output)
            .unwrap();
        out.write_cycle(&[0.9; 8]);

        let mut delivery = MainDelivery::new();
        delivery.configure_io(ChanCount::audio(1), ChanCount::audio(1));
        delivery.set_outputs(vec![out.clone()]);

        let mut bufs = BufferSet::with_capacity(1, 8);
        bufs.set_frame_len(8);
        signal(&mut bufs, 0.25);
        delivery.run(&mut bufs, 0, 8, 8, true);

        let mut result = [0.0f32; 8];
        out.read_cycle(&mut result);
        assert!(result.iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_more_ports_than_channels_is_safe() {
        let registry = PortRegistry::new();
        let a = registry
            .register(DataType::Audio, "a", PortDirection::Output)
            .unwrap();
        let b = registry
            .register(DataType::Audio, "b", PortDirection::Output)
            .unwrap();
        a.write_cycle(&[0.0; 8]);
        b.write_cycle(&[0.0; 8]);

        let mut delivery = MainDelivery::new();
        delivery.configure_io(ChanCount::audio(1), ChanCount::audio(1));
        delivery.set_outputs(vec![a, b]);

        let mut bufs = BufferSet::with_capacity(1, 8);
        bufs.set_frame_len(8);
        signal(&mut bufs, 1.0);
        delivery.run(&mut bufs, 0, 8, 8, false);
    }
}
