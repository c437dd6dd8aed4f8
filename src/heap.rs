//! Array heap.
//!
//! Owns every allocated platter array, keyed by a 32-bit identifier.
//! Identifier 0 is always mapped and denotes the program array.
//!
//! Array identifiers are opaque 32-bit values backed by an arena + index
//! rather than a reinterpreted heap pointer (see DESIGN.md for why the
//! reference C implementation's pointer-as-id trick is unsound on 64-bit
//! hosts). Allocation draws from a freelist of abandoned ids before
//! falling back to a monotonically increasing counter, which is enough
//! to satisfy the uniqueness invariant: no two concurrently-live ids are
//! ever equal, and 0 is never handed out.

use crate::error::UmError;
use crate::platter::Platter;

pub const PROGRAM_ARRAY: u32 = 0;

/// Owns every live array and the bookkeeping needed to hand out fresh,
/// reusable 32-bit identifiers.
#[derive(Debug, Default)]
pub struct ArrayHeap {
    arrays: std::collections::HashMap<u32, Vec<Platter>>,
    freelist: Vec<u32>,
    next_fresh: u32,
}

impl ArrayHeap {
    /// Creates a heap with array 0 present and empty.
    pub fn new() -> Self {
        let mut arrays = std::collections::HashMap::new();
        arrays.insert(PROGRAM_ARRAY, Vec::new());
        Self {
            arrays,
            freelist: Vec::new(),
            // id 0 is reserved, so fresh ids start at 1.
            next_fresh: 1,
        }
    }

    /// Replaces array 0 wholesale with the given platters. Used by the
    /// program loader, which bypasses the general allocation path.
    pub fn install_program(&mut self, platters: Vec<Platter>) {
        self.arrays.insert(PROGRAM_ARRAY, platters);
    }

    pub fn program_len(&self) -> u32 {
        self.arrays[&PROGRAM_ARRAY].len() as u32
    }

    pub fn program_word(&self, offset: u32) -> Option<Platter> {
        self.arrays[&PROGRAM_ARRAY].get(offset as usize).copied()
    }

    fn fresh_id(&mut self) -> u32 {
        if let Some(id) = self.freelist.pop() {
            return id;
        }
        let id = self.next_fresh;
        self.next_fresh = self.next_fresh.wrapping_add(1);
        id
    }

    /// Allocates a fresh array of `len` zeroed platters and returns its id.
    pub fn allocate(&mut self, len: u32) -> Result<u32, UmError> {
        let id = self.fresh_id();
        if id == PROGRAM_ARRAY {
            // next_fresh wrapped all the way back to 0; cannot happen in
            // any realistic run (4 billion live arrays), but guarding
            // keeps the "id 0 never allocated" invariant absolute.
            return Err(UmError::FailAlloc(len));
        }
        self.arrays.insert(id, vec![0u32; len as usize]);
        Ok(id)
    }

    /// Abandons `id`, making it eligible for reuse by a later `allocate`.
    pub fn free(&mut self, id: u32) -> Result<(), UmError> {
        if id == PROGRAM_ARRAY {
            return Err(UmError::FatalFreeReservedArray);
        }
        if self.arrays.remove(&id).is_none() {
            return Err(UmError::FatalFreeUnmappedArray { id });
        }
        self.freelist.push(id);
        Ok(())
    }

    pub fn read(&self, id: u32, offset: u32) -> Result<Platter, UmError> {
        let array = self
            .arrays
            .get(&id)
            .ok_or(UmError::FatalUnmappedArray { id })?;
        array
            .get(offset as usize)
            .copied()
            .ok_or(UmError::FatalOutOfRangeOffset {
                id,
                offset,
                len: array.len() as u32,
            })
    }

    pub fn write(&mut self, id: u32, offset: u32, value: Platter) -> Result<(), UmError> {
        let array = self
            .arrays
            .get_mut(&id)
            .ok_or(UmError::FatalUnmappedArray { id })?;
        let len = array.len() as u32;
        let slot = array
            .get_mut(offset as usize)
            .ok_or(UmError::FatalOutOfRangeOffset { id, offset, len })?;
        *slot = value;
        Ok(())
    }

    /// Replaces array 0's contents with a deep copy of `heap[id]`. A
    /// no-op on content when `id == 0` (duplicating the program array
    /// into itself).
    pub fn replace_zero_from(&mut self, id: u32) -> Result<(), UmError> {
        if id == PROGRAM_ARRAY {
            return Ok(());
        }
        let source = self
            .arrays
            .get(&id)
            .ok_or(UmError::FatalUnmappedArray { id })?
            .clone();
        self.arrays.insert(PROGRAM_ARRAY, source);
        Ok(())
    }

    /// Number of arrays currently mapped, including the program array.
    /// Exposed for the id-uniqueness property test.
    #[cfg(test)]
    pub fn live_ids(&self) -> Vec<u32> {
        self.arrays.keys().copied().collect()
    }
}
