//! Port registry - versioned, copy-on-write port set
//!
//! Ports are named, typed endpoints registered from non-real-time threads.
//! The registry publishes immutable `PortSet` snapshots through a
//! `basedrop::SharedCell`: the real-time thread reads the current snapshot
//! lock-free and in its entirety, while writers serialize among themselves
//! behind a mutex and republish wholesale. A reader never observes a
//! half-applied registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use basedrop::{Shared, SharedCell};
use thiserror::Error;

use crate::config::MAX_BUFFER_SIZE;
use crate::engine::gc::gc_handle;
use crate::types::{AudioBuffer, DataType, PortDirection, Sample};

/// Errors surfaced by port registration and removal
///
/// These are recoverable: the registry is left exactly as it was.
#[derive(Error, Debug)]
pub enum PortRegistrationError {
    /// A port with this name is already registered
    #[error("a port named '{0}' already exists")]
    NameCollision(String),

    /// Port names must be non-empty
    #[error("port name may not be empty")]
    EmptyName,

    /// The audio backend refused to create the port
    #[error("backend refused to register port '{name}': {reason}")]
    BackendRefused { name: String, reason: String },

    /// The port being removed is not in the registry
    #[error("port '{0}' is not registered")]
    NotRegistered(String),
}

/// A typed, named endpoint owned by the port registry
///
/// The cycle buffer is pre-allocated at registration time (non-real-time)
/// and only ever touched through `try_lock` afterwards: the real-time
/// thread is the sole locker in steady state, so the try always succeeds;
/// a failed try means that port contributes silence for one cycle.
pub struct Port {
    name: String,
    data_type: DataType,
    direction: PortDirection,
    latency: AtomicU64,
    buffer: Mutex<AudioBuffer>,
}

impl Port {
    fn new(name: String, data_type: DataType, direction: PortDirection, capacity: usize) -> Self {
        Self {
            name,
            data_type,
            direction,
            latency: AtomicU64::new(0),
            buffer: Mutex::new(AudioBuffer::silence(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Aggregate signal latency at this port, in frames
    pub fn latency(&self) -> u64 {
        self.latency.load(Ordering::Relaxed)
    }

    pub fn set_latency(&self, frames: u64) {
        self.latency.store(frames, Ordering::Relaxed);
    }

    /// Borrow the cycle buffer without blocking
    ///
    /// Returns None if someone else holds it right now; real-time callers
    /// treat that as silence for the cycle.
    pub fn cycle_buffer(&self) -> Option<MutexGuard<'_, AudioBuffer>> {
        self.buffer.try_lock().ok()
    }

    /// Copy `src` into the port's cycle buffer (input ports, cycle start)
    ///
    /// Non-blocking; returns false if the buffer was contended.
    pub fn write_cycle(&self, src: &[Sample]) -> bool {
        match self.buffer.try_lock() {
            Ok(mut buf) => {
                let n = src.len().min(buf.capacity());
                buf.set_len_from_capacity(n);
                buf.as_mut_slice().copy_from_slice(&src[..n]);
                true
            }
            Err(_) => false,
        }
    }

    /// Copy the port's cycle buffer into `dst` (output ports, cycle end)
    ///
    /// Frames beyond the buffer's working length are zeroed. Returns false
    /// (zeroing all of `dst`) if the buffer was contended.
    pub fn read_cycle(&self, dst: &mut [Sample]) -> bool {
        match self.buffer.try_lock() {
            Ok(buf) => {
                let n = buf.len().min(dst.len());
                dst[..n].copy_from_slice(&buf.as_slice()[..n]);
                dst[n..].fill(0.0);
                true
            }
            Err(_) => {
                dst.fill(0.0);
                false
            }
        }
    }

    /// Grow the cycle buffer for a new backend buffer size (non-real-time)
    fn reserve_buffer(&self, capacity: usize) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.reserve_capacity(capacity);
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("direction", &self.direction)
            .finish()
    }
}

/// An immutable snapshot of the registered ports
///
/// Readers get the whole set or nothing; the vec is never mutated after
/// publication.
pub struct PortSet {
    ports: Vec<Shared<Port>>,
}

impl PortSet {
    fn empty() -> Self {
        Self { ports: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shared<Port>> {
        self.ports.iter()
    }

    pub fn port_by_name(&self, name: &str) -> Option<&Shared<Port>> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Count ports matching a type and direction
    pub fn count(&self, data_type: DataType, direction: PortDirection) -> usize {
        self.ports
            .iter()
            .filter(|p| p.data_type() == data_type && p.direction() == direction)
            .count()
    }
}

/// The copy-on-write port registry
///
/// `current()` is O(1) and lock-free, safe from the real-time thread.
/// `register`/`unregister` run on non-real-time threads, serialize through
/// the writer mutex, and publish a fresh snapshot; retired snapshots are
/// reclaimed by the gc thread so the swap never frees on the reader side.
pub struct PortRegistry {
    current: SharedCell<PortSet>,
    writer: Mutex<()>,
    buffer_capacity: AtomicU64,
}

impl PortRegistry {
    pub fn new() -> Self {
        let handle = gc_handle();
        Self {
            current: SharedCell::new(Shared::new(&handle, PortSet::empty())),
            writer: Mutex::new(()),
            buffer_capacity: AtomicU64::new(MAX_BUFFER_SIZE as u64),
        }
    }

    /// The current snapshot (lock-free, real-time safe)
    pub fn current(&self) -> Shared<PortSet> {
        self.current.get()
    }

    /// Register a new port and publish a new snapshot
    pub fn register(
        &self,
        data_type: DataType,
        name: &str,
        direction: PortDirection,
    ) -> Result<Shared<Port>, PortRegistrationError> {
        if name.is_empty() {
            return Err(PortRegistrationError::EmptyName);
        }

        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let old = self.current.get();

        if old.port_by_name(name).is_some() {
            return Err(PortRegistrationError::NameCollision(name.to_string()));
        }

        let handle = gc_handle();
        let capacity = self.buffer_capacity.load(Ordering::Relaxed) as usize;
        let port = Shared::new(
            &handle,
            Port::new(name.to_string(), data_type, direction, capacity),
        );

        let mut ports: Vec<Shared<Port>> = old.ports.clone();
        ports.push(Shared::clone(&port));
        self.current.set(Shared::new(&handle, PortSet { ports }));

        log::debug!("registered {} port '{}'", data_type.name(), name);
        Ok(port)
    }

    /// Remove a port and publish a new snapshot
    pub fn unregister(&self, port: &Port) -> Result<(), PortRegistrationError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let old = self.current.get();

        if old.port_by_name(port.name()).is_none() {
            return Err(PortRegistrationError::NotRegistered(port.name().to_string()));
        }

        let handle = gc_handle();
        let ports: Vec<Shared<Port>> = old
            .ports
            .iter()
            .filter(|p| p.name() != port.name())
            .cloned()
            .collect();
        self.current.set(Shared::new(&handle, PortSet { ports }));

        log::debug!("unregistered port '{}'", port.name());
        Ok(())
    }

    /// Look up a port in the current snapshot
    pub fn port_by_name(&self, name: &str) -> Option<Shared<Port>> {
        self.current.get().port_by_name(name).cloned()
    }

    /// Grow every port's cycle buffer for a new backend buffer size
    ///
    /// Called off the real-time path when the backend renegotiates its
    /// buffer size past what was pre-allocated.
    pub fn reserve_buffers(&self, capacity: usize) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.buffer_capacity
            .fetch_max(capacity as u64, Ordering::Relaxed);
        for port in self.current.get().iter() {
            port.reserve_buffer(capacity);
        }
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = PortRegistry::new();
        let port = registry
            .register(DataType::Audio, "master/out 1", PortDirection::Output)
            .unwrap();

        assert_eq!(port.name(), "master/out 1");
        assert_eq!(registry.current().len(), 1);
        assert!(registry.port_by_name("master/out 1").is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = PortRegistry::new();
        registry
            .register(DataType::Audio, "in", PortDirection::Input)
            .unwrap();

        let err = registry
            .register(DataType::Midi, "in", PortDirection::Input)
            .err()
            .unwrap();
        assert!(matches!(err, PortRegistrationError::NameCollision(_)));
        // Prior state intact
        assert_eq!(registry.current().len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = PortRegistry::new();
        let err = registry
            .register(DataType::Audio, "", PortDirection::Input)
            .err()
            .unwrap();
        assert!(matches!(err, PortRegistrationError::EmptyName));
    }

    #[test]
    fn test_snapshot_isolation() {
        let registry = PortRegistry::new();
        registry
            .register(DataType::Audio, "a", PortDirection::Output)
            .unwrap();

        // A reader holding the old snapshot keeps seeing the old world
        let before = registry.current();
        registry
            .register(DataType::Audio, "b", PortDirection::Output)
            .unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(registry.current().len(), 2);
    }

    #[test]
    fn test_unregister() {
        let registry = PortRegistry::new();
        let port = registry
            .register(DataType::Audio, "gone", PortDirection::Input)
            .unwrap();

        registry.unregister(&port).unwrap();
        assert!(registry.port_by_name("gone").is_none());
        assert!(matches!(
            registry.unregister(&port),
            Err(PortRegistrationError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_cycle_buffer_roundtrip() {
        let registry = PortRegistry::new();
        let port = registry
            .register(DataType::Audio, "io", PortDirection::Output)
            .unwrap();

        let src = [0.25f32; 16];
        assert!(port.write_cycle(&src));

        let mut dst = [1.0f32; 32];
        assert!(port.read_cycle(&mut dst));
        assert_eq!(&dst[..16], &src);
        // Tail beyond the working length is zeroed
        assert!(dst[16..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_concurrent_reader_never_blocks() {
        use std::sync::Arc;

        let registry = Arc::new(PortRegistry::new());
        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let snap = registry.current();
                    // Whole snapshot or nothing: every port in it resolves
                    for port in snap.iter() {
                        assert!(!port.name().is_empty());
                    }
                }
            })
        };

        for i in 0..100 {
            registry
                .register(DataType::Audio, &format!("p{}", i), PortDirection::Output)
                .unwrap();
        }
        reader.join().unwrap();
    }
}
