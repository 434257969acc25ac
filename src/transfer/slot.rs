//! Transfer buffer slots

/// Lifecycle of a transfer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// In the free queue
    Free,

    /// Held by the scheduler while a block is staged into it
    Writing,

    /// Buffers handed to the accelerator
    Submitted,

    /// Accelerator observed still working on it
    Computing,

    /// Accelerator result is back in the slot
    ReadyToRead,

    /// Held by the scheduler while the result is copied out
    Draining,
}

/// Generational reference to a slot in a `BufferPool`
///
/// A handle goes stale when its slot is released; using a stale handle is
/// detected by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SlotHandle {
    /// Index of the slot in its pool
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Buffers lent to the accelerator for the duration of one submission
#[derive(Debug, Default)]
pub struct SlotBuffers {
    /// Staged input bytes (`input_len` of them are valid)
    pub input: Vec<u8>,

    /// Output area, sized to the slot capacity
    pub output: Vec<u8>,
}

/// A reusable fixed-capacity transfer buffer pair
#[derive(Debug)]
pub struct BufferSlot {
    pub(crate) generation: u32,
    pub(crate) state: SlotState,
    pub(crate) buffers: SlotBuffers,
    pub(crate) capacity: usize,
    pub(crate) valid_len: usize,
    pub(crate) result_len: usize,
}

impl BufferSlot {
    /// Allocate a slot with `capacity` bytes of input and output space
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            generation: 0,
            state: SlotState::Free,
            buffers: Self::allocate(capacity),
            capacity,
            valid_len: 0,
            result_len: 0,
        }
    }

    pub(crate) fn allocate(capacity: usize) -> SlotBuffers {
        SlotBuffers {
            input: vec![0u8; capacity],
            output: vec![0u8; capacity],
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Capacity of each buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of staged input bytes
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Staged input bytes
    pub fn input(&self) -> &[u8] {
        &self.buffers.input[..self.valid_len]
    }

    /// Result bytes produced by the accelerator
    pub fn result(&self) -> &[u8] {
        &self.buffers.output[..self.result_len]
    }
}
