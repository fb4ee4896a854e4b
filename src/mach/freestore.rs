use super::Address;
use crate::error;
use crate::lang::Error;
use std::collections::{BTreeMap, HashMap};

type Result<T> = std::result::Result<T, Error>;

/// ## The free store
///
/// A best-fit allocator over the data segment tail,
/// `[stackSize, stackSize + heapSize)`. Free blocks are kept by address
/// so that adjacent blocks coalesce on free; allocated blocks remember
/// their size, since DISPOSE supplies only the address. Address 0 is
/// never a heap address, so it serves as the allocation-failure (and
/// `nil`) value. No compaction.
#[derive(Debug)]
pub struct FreeStore {
    free: BTreeMap<Address, usize>,
    allocated: HashMap<Address, usize>,
}

impl FreeStore {
    pub fn new(start: Address, size: usize) -> FreeStore {
        let mut free = BTreeMap::new();
        if size > 0 {
            free.insert(start, size);
        }
        FreeStore {
            free,
            allocated: HashMap::new(),
        }
    }

    /// Allocate a run of `n` Datums. Returns the starting address, or 0
    /// when no free block is large enough.
    pub fn alloc(&mut self, n: usize) -> Address {
        if n == 0 {
            return 0;
        }
        let mut best: Option<(Address, usize)> = None;
        for (&addr, &len) in &self.free {
            if len >= n && best.map(|(_, blen)| len < blen).unwrap_or(true) {
                best = Some((addr, len));
            }
        }
        let (addr, len) = match best {
            Some(found) => found,
            None => return 0,
        };
        self.free.remove(&addr);
        if len > n {
            self.free.insert(addr + n, len - n);
        }
        self.allocated.insert(addr, n);
        addr
    }

    /// Return a previously allocated block, coalescing with free
    /// neighbors.
    pub fn free(&mut self, addr: Address) -> Result<()> {
        let mut len = match self.allocated.remove(&addr) {
            Some(len) => len,
            None => return Err(error!(FreeStoreError; "disposing address {}", addr)),
        };
        let mut start = addr;
        if let Some((&prev, &prev_len)) = self.free.range(..addr).next_back() {
            if prev + prev_len == addr {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        let next = start + len;
        if let Some(&next_len) = self.free.get(&next) {
            self.free.remove(&next);
            len += next_len;
        }
        self.free.insert(start, len);
        Ok(())
    }

    /// The free blocks, in address order, as (address, length) pairs.
    pub fn free_list(&self) -> Vec<(Address, usize)> {
        self.free.iter().map(|(&a, &l)| (a, l)).collect()
    }
}
