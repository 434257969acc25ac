//! Fixed-size pool of transfer buffers
//!
//! All slots are allocated once when the pool is built and cycle through
//! `SlotState` for the pool's lifetime. Slots are addressed by generational
//! `SlotHandle`s, so a handle kept past its release is caught instead of
//! aliasing whatever block reuses the slot next.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use super::slot::{BufferSlot, SlotBuffers, SlotHandle, SlotState};
use crate::error::{PipelineError, PipelineResult};

/// Bounded set of transfer buffers with free and busy queues
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<BufferSlot>,

    /// Free slots, most recently released at the back
    free: VecDeque<u32>,

    /// Slots handed to the accelerator, in submission order
    busy: VecDeque<u32>,

    slot_capacity: usize,
}

impl BufferPool {
    /// Allocate `slot_count` slots of `slot_capacity` bytes each
    ///
    /// # Errors
    /// Returns `ConfigError` for an empty pool
    pub fn new(slot_count: usize, slot_capacity: usize) -> PipelineResult<Self> {
        if slot_count == 0 {
            return Err(PipelineError::ConfigError(
                "buffer pool needs at least one slot".to_string(),
            ));
        }
        let slots = (0..slot_count).map(|_| BufferSlot::new(slot_capacity)).collect();
        debug!(slot_count, slot_capacity, "buffer pool allocated");
        Ok(Self {
            slots,
            free: (0..slot_count as u32).collect(),
            busy: VecDeque::with_capacity(slot_count),
            slot_capacity,
        })
    }

    /// Take a free slot with at least `min_capacity` bytes
    ///
    /// Returns `None` when no slot is free; that is the backpressure signal.
    pub fn acquire(&mut self, min_capacity: usize) -> Option<SlotHandle> {
        if min_capacity > self.slot_capacity {
            warn!(min_capacity, slot_capacity = self.slot_capacity, "no slot is large enough");
            return None;
        }
        // Warmest buffer first
        let index = self.free.pop_back()?;
        let slot = &mut self.slots[index as usize];
        slot.state = SlotState::Writing;
        slot.valid_len = 0;
        slot.result_len = 0;
        trace!(slot = index, "slot acquired");
        Some(SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Copy `bytes` into the slot's input buffer
    ///
    /// # Errors
    /// Returns `InputValidationError` if `bytes` exceeds the slot capacity
    pub fn stage(&mut self, handle: SlotHandle, bytes: &[u8]) -> PipelineResult<()> {
        let slot = self.slot_mut(handle);
        assert_eq!(slot.state, SlotState::Writing, "staging into slot in state {:?}", slot.state);
        if bytes.len() > slot.capacity {
            return Err(PipelineError::InputValidationError(format!(
                "{} bytes do not fit a {} byte slot",
                bytes.len(),
                slot.capacity
            )));
        }
        slot.buffers.input[..bytes.len()].copy_from_slice(bytes);
        slot.valid_len = bytes.len();
        Ok(())
    }

    /// Hand the slot's buffers over for a submission
    pub fn submit(&mut self, handle: SlotHandle) -> SlotBuffers {
        let slot = self.slot_mut(handle);
        assert_eq!(slot.state, SlotState::Writing, "submitting slot in state {:?}", slot.state);
        slot.state = SlotState::Submitted;
        let buffers = std::mem::take(&mut slot.buffers);
        self.busy.push_back(handle.index);
        trace!(slot = handle.index, "slot submitted");
        buffers
    }

    /// Note that the accelerator is still working on the slot
    pub fn mark_computing(&mut self, handle: SlotHandle) {
        let slot = self.slot_mut(handle);
        if slot.state == SlotState::Submitted {
            slot.state = SlotState::Computing;
        }
    }

    /// Return the buffers of a finished submission with `result_len` bytes
    /// of output
    pub fn complete(&mut self, handle: SlotHandle, mut buffers: SlotBuffers, result_len: usize) {
        let capacity = self.slot_capacity;
        let slot = self.slot_mut(handle);
        assert!(
            matches!(slot.state, SlotState::Submitted | SlotState::Computing),
            "completing slot in state {:?}",
            slot.state
        );
        assert!(result_len <= capacity, "result of {} bytes overflows slot", result_len);

        // Buffers must come back whole, whatever the accelerator did to them
        if buffers.input.len() < capacity {
            buffers.input.resize(capacity, 0);
        }
        if buffers.output.len() < capacity {
            buffers.output.resize(capacity, 0);
        }
        slot.buffers = buffers;
        slot.result_len = result_len;
        slot.state = SlotState::ReadyToRead;
        trace!(slot = handle.index, result_len, "slot ready to read");
    }

    /// Start copying the result out; returns the result bytes
    pub fn begin_drain(&mut self, handle: SlotHandle) -> &[u8] {
        {
            let slot = self.slot_mut(handle);
            assert_eq!(slot.state, SlotState::ReadyToRead, "draining slot in state {:?}", slot.state);
            slot.state = SlotState::Draining;
        }
        self.remove_busy(handle.index);
        self.slot(handle).result()
    }

    /// Return a slot to the free queue
    ///
    /// # Panics
    /// Panics on a double release, on a stale handle, or while the
    /// accelerator still holds the slot's buffers (use `abandon` for that).
    pub fn release(&mut self, handle: SlotHandle) {
        let slot = &self.slots[handle.index as usize];
        if slot.state == SlotState::Free && slot.generation == handle.generation.wrapping_add(1) {
            panic!("double release of slot {}", handle.index);
        }
        let slot = self.slot_mut(handle);
        assert!(
            !matches!(slot.state, SlotState::Submitted | SlotState::Computing),
            "releasing slot {} while the accelerator owns its buffers",
            handle.index
        );
        self.recycle(handle.index);
        trace!(slot = handle.index, "slot released");
    }

    /// Reclaim a slot whose buffers never came back from the accelerator
    pub fn abandon(&mut self, handle: SlotHandle) {
        let capacity = self.slot_capacity;
        let slot = self.slot_mut(handle);
        if matches!(slot.state, SlotState::Submitted | SlotState::Computing) {
            slot.buffers = BufferSlot::allocate(capacity);
            warn!(slot = handle.index, "slot abandoned, buffers reallocated");
        }
        self.recycle(handle.index);
    }

    /// Access a slot through a live handle
    ///
    /// # Panics
    /// Panics if the handle is stale.
    pub fn slot(&self, handle: SlotHandle) -> &BufferSlot {
        let slot = &self.slots[handle.index as usize];
        assert_eq!(
            slot.generation, handle.generation,
            "use after release of slot {}",
            handle.index
        );
        slot
    }

    fn slot_mut(&mut self, handle: SlotHandle) -> &mut BufferSlot {
        let slot = &mut self.slots[handle.index as usize];
        assert_eq!(
            slot.generation, handle.generation,
            "use after release of slot {}",
            handle.index
        );
        slot
    }

    fn recycle(&mut self, index: u32) {
        self.remove_busy(index);
        let slot = &mut self.slots[index as usize];
        slot.state = SlotState::Free;
        slot.generation = slot.generation.wrapping_add(1);
        slot.valid_len = 0;
        slot.result_len = 0;
        self.free.push_back(index);
    }

    fn remove_busy(&mut self, index: u32) {
        if let Some(pos) = self.busy.iter().position(|&i| i == index) {
            self.busy.remove(pos);
        }
    }

    /// Number of slots in the pool
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Capacity of each slot
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Slots in the free queue
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Slots in the busy queue
    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    /// Slots held by the caller (staging or draining)
    pub fn held_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Writing | SlotState::Draining))
            .count()
    }

    /// Whether every slot is accounted for exactly once
    pub fn is_conserved(&self) -> bool {
        self.free_count() + self.busy_count() + self.held_count() == self.total()
    }

    /// Whether every slot is free
    pub fn is_idle(&self) -> bool {
        self.free_count() == self.total()
    }
}

struct SharedInner {
    pool: Mutex<BufferPool>,
    freed: Condvar,
}

/// Thread-safe pool whose `acquire_blocking` waits for a release
#[derive(Clone)]
pub struct SharedBufferPool {
    inner: Arc<SharedInner>,
}

impl SharedBufferPool {
    /// Allocate a shared pool
    ///
    /// # Errors
    /// Returns `ConfigError` for an empty pool
    pub fn new(slot_count: usize, slot_capacity: usize) -> PipelineResult<Self> {
        Ok(Self {
            inner: Arc::new(SharedInner {
                pool: Mutex::new(BufferPool::new(slot_count, slot_capacity)?),
                freed: Condvar::new(),
            }),
        })
    }

    /// Non-blocking acquire
    pub fn acquire(&self, min_capacity: usize) -> Option<SlotHandle> {
        self.inner.pool.lock().acquire(min_capacity)
    }

    /// Acquire, suspending until a slot is released or `timeout` elapses
    ///
    /// # Errors
    /// Returns `PoolExhausted` on timeout and `InputValidationError` if no
    /// slot could ever satisfy `min_capacity`
    pub fn acquire_blocking(
        &self,
        min_capacity: usize,
        timeout: Option<Duration>,
    ) -> PipelineResult<SlotHandle> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pool = self.inner.pool.lock();
        if min_capacity > pool.slot_capacity() {
            return Err(PipelineError::InputValidationError(format!(
                "no slot holds {} bytes",
                min_capacity
            )));
        }
        loop {
            if let Some(handle) = pool.acquire(min_capacity) {
                return Ok(handle);
            }
            match deadline {
                Some(deadline) => {
                    if self.inner.freed.wait_until(&mut pool, deadline).timed_out() {
                        return pool.acquire(min_capacity).ok_or(PipelineError::PoolExhausted);
                    }
                }
                None => self.inner.freed.wait(&mut pool),
            }
        }
    }

    /// Release a slot and wake one waiter
    pub fn release(&self, handle: SlotHandle) {
        self.inner.pool.lock().release(handle);
        self.inner.freed.notify_one();
    }

    /// Run `f` with exclusive access to the pool
    pub fn with<R>(&self, f: impl FnOnce(&mut BufferPool) -> R) -> R {
        f(&mut self.inner.pool.lock())
    }
}
