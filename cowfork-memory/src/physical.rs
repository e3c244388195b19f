//! Physical memory management module
//!
//! Frames are handed out zeroed with a reference count of zero; the count
//! tracks how many page-table entries point at the frame, and the frame
//! returns to the pool when the last entry goes away.

use alloc::boxed::Box;
use alloc::vec::Vec;

use cowfork_api::{PhysAddr, SysError, SysResult, PAGE_SHIFT, PAGE_SIZE};

struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    refs: u32,
}

/// Frame pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that may ever be allocated
    pub capacity: usize,
    /// Frames currently allocated
    pub in_use: usize,
    /// Allocations served since creation
    pub total_allocations: u64,
    /// Allocations refused for lack of frames
    pub failed_allocations: u64,
}

/// Reference-counted pool of physical frames
pub struct FramePool {
    // slot 0 is never handed out, so physical address 0 is never valid
    slots: Vec<Option<Frame>>,
    free: Vec<usize>,
    capacity: usize,
    stats: FrameStats,
}

impl FramePool {
    /// Create a pool that can hold `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.push(None);
        Self {
            slots,
            free: Vec::new(),
            capacity,
            stats: FrameStats {
                capacity,
                ..FrameStats::default()
            },
        }
    }

    /// Allocate a zeroed frame with no references
    pub fn alloc_zeroed(&mut self) -> SysResult<PhysAddr> {
        let frame = Frame {
            data: Box::new([0u8; PAGE_SIZE]),
            refs: 0,
        };
        let pfn = if let Some(pfn) = self.free.pop() {
            self.slots[pfn] = Some(frame);
            pfn
        } else if self.slots.len() <= self.capacity {
            self.slots.push(Some(frame));
            self.slots.len() - 1
        } else {
            self.stats.failed_allocations += 1;
            log::warn!("frame pool exhausted ({} frames)", self.capacity);
            return Err(SysError::NoMem);
        };
        self.stats.in_use += 1;
        self.stats.total_allocations += 1;
        Ok(PhysAddr::new(pfn << PAGE_SHIFT))
    }

    fn slot(&self, pa: PhysAddr) -> Option<&Frame> {
        self.slots.get(pa.frame_number()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, pa: PhysAddr) -> Option<&mut Frame> {
        self.slots.get_mut(pa.frame_number()).and_then(Option::as_mut)
    }

    /// Record one more page-table entry pointing at `pa`
    pub fn incref(&mut self, pa: PhysAddr) {
        if let Some(frame) = self.slot_mut(pa) {
            frame.refs = frame.refs.saturating_add(1);
        }
    }

    /// Drop one reference; frees the frame when none remain.
    ///
    /// Returns true if the frame was freed.
    pub fn decref(&mut self, pa: PhysAddr) -> bool {
        let Some(frame) = self.slot_mut(pa) else {
            return false;
        };
        frame.refs = frame.refs.saturating_sub(1);
        if frame.refs == 0 {
            self.release(pa);
            return true;
        }
        false
    }

    /// Free `pa` if nothing references it (an allocation that was never installed)
    pub fn release_if_unused(&mut self, pa: PhysAddr) {
        if self.slot(pa).is_some_and(|frame| frame.refs == 0) {
            self.release(pa);
        }
    }

    fn release(&mut self, pa: PhysAddr) {
        let pfn = pa.frame_number();
        if let Some(slot) = self.slots.get_mut(pfn) {
            if slot.take().is_some() {
                self.free.push(pfn);
                self.stats.in_use -= 1;
            }
        }
    }

    /// Number of page-table entries referencing `pa`, zero if unallocated
    pub fn refcount(&self, pa: PhysAddr) -> u32 {
        self.slot(pa).map_or(0, |frame| frame.refs)
    }

    /// Whether `pa` lies in an allocated frame
    pub fn is_allocated(&self, pa: PhysAddr) -> bool {
        self.slot(pa).is_some()
    }

    /// Contents of the frame holding `pa`
    pub fn bytes(&self, pa: PhysAddr) -> Option<&[u8; PAGE_SIZE]> {
        self.slot(pa).map(|frame| &*frame.data)
    }

    /// Mutable contents of the frame holding `pa`
    pub fn bytes_mut(&mut self, pa: PhysAddr) -> Option<&mut [u8; PAGE_SIZE]> {
        self.slot_mut(pa).map(|frame| &mut *frame.data)
    }

    /// Frames currently allocated
    pub fn in_use(&self) -> usize {
        self.stats.in_use
    }

    /// Pool statistics
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}
