//! Engine infrastructure - driver, ports, events, transport
//!
//! This module contains the driver side of the core:
//! - EngineDriver: the real-time cycle and its control surface
//! - PortRegistry: copy-on-write port snapshots (RCU)
//! - EventQueue / per-thread pools: cross-thread transport scheduling
//! - Transport: position/speed state and event dispatch

pub mod driver;
pub mod event;
pub mod gc;
pub mod pool;
pub mod ports;
pub mod transport;

pub use driver::{CycleOutcome, EngineDriver, EngineSignal, RouteList};
pub use event::{EventAction, EventKind, EventQueue, PendingEvents, SessionEvent, IMMEDIATE};
pub use pool::{EventPool, EventPools};
pub use ports::{Port, PortRegistrationError, PortRegistry, PortSet};
pub use transport::{Transport, TransportAtomics};
