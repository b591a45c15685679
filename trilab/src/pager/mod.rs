//! Demand paging manager cooperating with an external MMU collaborator.
//!
//! A single mutex serializes every entry point; none of them suspend while
//! holding it, so no reentrancy or blocking is possible across calls.

pub mod error;
pub mod mmu;

pub use error::{PagerError, PagerResult};
pub use mmu::{Mmu, Pid, Protection};

use std::collections::HashMap;
use std::sync::Mutex;

/// Stand-ins for the host-defined `UVM_BASEADDR`/page size this pager was
/// designed against.
pub const PAGE_SIZE: u64 = 4096;
pub const UVM_BASEADDR: u64 = 0x0000_6000_0000;

#[derive(Debug, Clone, Copy)]
struct PageDescriptor {
    block: usize,
    frame: Option<usize>,
    dirty_used: bool,
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    owner: Option<(Pid, usize)>,
    accessed: bool,
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    allocated: bool,
    on_disk: bool,
}

#[derive(Default)]
struct PageTable {
    pages: Vec<PageDescriptor>,
}

struct State {
    frames: Vec<FrameEntry>,
    blocks: Vec<BlockEntry>,
    tables: HashMap<Pid, PageTable>,
    clock: usize,
}

/// Owns every table the pager needs plus the MMU collaborator and the
/// physical memory it backs. Generic over `M` so the host supplies its own
/// MMU; `'p` is the lifetime of the borrowed `pmem` array.
pub struct Pager<'p, M: Mmu> {
    state: Mutex<State>,
    mmu: Mutex<M>,
    pmem: Mutex<&'p mut [u8]>,
}

impl<'p, M: Mmu> Pager<'p, M> {
    /// `pager_init`: size and zero the frame and block tables.
    pub fn new(nframes: usize, nblocks: usize, mmu: M, pmem: &'p mut [u8]) -> Self {
        let frames = vec![FrameEntry { owner: None, accessed: false }; nframes];
        let blocks = vec![BlockEntry { allocated: false, on_disk: false }; nblocks];
        Pager {
            state: Mutex::new(State { frames, blocks, tables: HashMap::new(), clock: 0 }),
            mmu: Mutex::new(mmu),
            pmem: Mutex::new(pmem),
        }
    }

    /// `pager_create`: register a new, empty page table for `pid`.
    pub fn create(&self, pid: Pid) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(pid, PageTable::default());
        log::debug!("pager: created table for pid {pid}");
    }

    /// `pager_extend`: allocate one backing block and append a page
    /// descriptor. Returns `None` iff no free block exists.
    pub fn extend(&self, pid: Pid) -> Option<u64> {
        let mut state = self.state.lock().unwrap();
        let block = state.blocks.iter().position(|b| !b.allocated)?;
        state.blocks[block].allocated = true;

        let table = state.tables.get_mut(&pid).expect("pager_extend on unknown pid");
        let page_index = table.pages.len();
        table.pages.push(PageDescriptor { block, frame: None, dirty_used: false });

        Some(UVM_BASEADDR + (page_index as u64) * PAGE_SIZE)
    }

    /// `None` iff `addr` lies below `UVM_BASEADDR`, where the subtraction
    /// this is built on would otherwise underflow.
    fn page_index(addr: u64) -> Option<usize> {
        addr.checked_sub(UVM_BASEADDR).map(|off| (off / PAGE_SIZE) as usize)
    }

    /// `pager_fault`: service a page fault for an address previously
    /// returned by [`Pager::extend`]. `addr` need not be page-aligned.
    pub fn fault(&self, pid: Pid, addr: u64) {
        let aligned = addr - (addr % PAGE_SIZE);
        let page_idx = Self::page_index(aligned).expect("fault on an address below UVM_BASEADDR");

        let mut state = self.state.lock().unwrap();
        let mut mmu = self.mmu.lock().unwrap();

        let already_resident = state.tables[&pid].pages[page_idx].frame;
        if let Some(frame) = already_resident {
            mmu.chprot(pid, aligned, Protection::READ | Protection::WRITE);
            state.frames[frame].accessed = true;
            state.tables.get_mut(&pid).unwrap().pages[page_idx].dirty_used = true;
            return;
        }

        let nframes = state.frames.len();
        let frame = match state.frames.iter().position(|f| f.owner.is_none()) {
            Some(free) => free,
            None => Self::evict(&mut state, &mut mmu, nframes),
        };

        let block = state.tables[&pid].pages[page_idx].block;
        if state.blocks[block].on_disk {
            mmu.disk_read(block, frame);
        } else {
            mmu.zero_fill(frame);
        }

        state.frames[frame] = FrameEntry { owner: Some((pid, page_idx)), accessed: true };
        let page = &mut state.tables.get_mut(&pid).unwrap().pages[page_idx];
        page.frame = Some(frame);
        page.dirty_used = false;

        mmu.resident(pid, aligned, frame, Protection::READ);
        log::trace!("pager: faulted pid {pid} page {page_idx} into frame {frame}");
    }

    /// Second-chance victim selection, then the swap-out protocol: revokes
    /// write access across all resident frames on a full cycle, evicts the
    /// chosen frame, and writes it back if dirty.
    fn evict(state: &mut State, mmu: &mut M, nframes: usize) -> usize {
        let victim = loop {
            let c = state.clock;
            let next = (c + 1) % nframes;
            if !state.frames[c].accessed {
                state.clock = next;
                break c;
            }
            state.frames[c].accessed = false;
            state.clock = next;
        };

        if victim == 0 {
            for frame in state.frames.iter() {
                if let Some((owner_pid, owner_page)) = frame.owner {
                    let vaddr = UVM_BASEADDR + (owner_page as u64) * PAGE_SIZE;
                    mmu.chprot(owner_pid, vaddr, Protection::empty());
                }
            }
        }

        let (owner_pid, owner_page) = state.frames[victim].owner.expect("evicting a free frame");
        let vaddr = UVM_BASEADDR + (owner_page as u64) * PAGE_SIZE;
        let descriptor = &mut state.tables.get_mut(&owner_pid).unwrap().pages[owner_page];
        descriptor.frame = None;
        mmu.nonresident(owner_pid, vaddr);

        if descriptor.dirty_used {
            state.blocks[descriptor.block].on_disk = true;
            mmu.disk_write(victim, descriptor.block);
        }

        victim
    }

    /// `pager_syslog`: read `len` bytes starting at `addr` through physical
    /// memory, faulting in anything non-resident, and print them as
    /// lowercase hex followed by a newline.
    pub fn syslog(&self, pid: Pid, addr: u64, len: usize) -> PagerResult<()> {
        if len == 0 {
            return Ok(());
        }

        let last_addr = addr + len as u64 - 1;
        let first_page = Self::page_index(addr - (addr % PAGE_SIZE)).ok_or(PagerError::InvalidRange)?;
        let last_page =
            Self::page_index(last_addr - (last_addr % PAGE_SIZE)).ok_or(PagerError::InvalidRange)?;

        {
            let state = self.state.lock().unwrap();
            let table = state.tables.get(&pid).ok_or(PagerError::UnknownPid(pid))?;
            if first_page >= table.pages.len() || last_page >= table.pages.len() {
                return Err(PagerError::InvalidRange);
            }
        }

        for page_idx in first_page..=last_page {
            self.fault(pid, UVM_BASEADDR + (page_idx as u64) * PAGE_SIZE);
        }

        let state = self.state.lock().unwrap();
        let pmem = self.pmem.lock().unwrap();
        let mut hex = String::with_capacity(len * 2);
        for i in 0..len {
            let byte_addr = addr + i as u64;
            let page_idx = Self::page_index(byte_addr - (byte_addr % PAGE_SIZE))
                .expect("already validated above");
            let frame = state.tables[&pid].pages[page_idx]
                .frame
                .expect("just faulted in above");
            let offset_in_page = (byte_addr % PAGE_SIZE) as usize;
            let byte = pmem[frame * PAGE_SIZE as usize + offset_in_page];
            hex.push_str(&format!("{byte:02x}"));
        }
        println!("{hex}");
        Ok(())
    }

    /// `pager_destroy`: release all frames and blocks held by `pid`.
    /// Must not invoke any MMU primitive.
    pub fn destroy(&self, pid: Pid) {
        let mut state = self.state.lock().unwrap();
        if let Some(table) = state.tables.remove(&pid) {
            for page in &table.pages {
                if let Some(frame) = page.frame {
                    state.frames[frame] = FrameEntry { owner: None, accessed: false };
                }
                state.blocks[page.block] = BlockEntry { allocated: false, on_disk: false };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullMmu;
    impl Mmu for NullMmu {
        fn resident(&mut self, _pid: Pid, _vaddr: u64, _frame: usize, _prot: Protection) {}
        fn nonresident(&mut self, _pid: Pid, _vaddr: u64) {}
        fn chprot(&mut self, _pid: Pid, _vaddr: u64, _prot: Protection) {}
        fn disk_read(&mut self, _block: usize, _frame: usize) {}
        fn disk_write(&mut self, _frame: usize, _block: usize) {}
        fn zero_fill(&mut self, _frame: usize) {}
    }

    #[test]
    fn extend_returns_none_once_blocks_exhausted() {
        let mut pmem = vec![0u8; (2 * PAGE_SIZE) as usize];
        let pager = Pager::new(2, 1, NullMmu, &mut pmem);
        pager.create(1);
        assert!(pager.extend(1).is_some());
        assert!(pager.extend(1).is_none());
    }

    #[test]
    fn clock_eviction_wraps_and_terminates() {
        let mut pmem = vec![0u8; (3 * PAGE_SIZE) as usize];
        let pager = Pager::new(3, 5, NullMmu, &mut pmem);
        pager.create(1);
        for _ in 0..5 {
            pager.extend(1);
        }
        for i in 0..3 {
            pager.fault(1, UVM_BASEADDR + i * PAGE_SIZE);
        }
        // all three frames are now accessed; the next fault must evict.
        pager.fault(1, UVM_BASEADDR + 3 * PAGE_SIZE);
        let state = pager.state.lock().unwrap();
        assert!(state.tables[&1].pages[3].frame.is_some());
    }

    #[test]
    fn syslog_rejects_unallocated_range() {
        let mut pmem = vec![0u8; PAGE_SIZE as usize];
        let pager = Pager::new(1, 1, NullMmu, &mut pmem);
        pager.create(1);
        pager.extend(1);
        assert!(pager.syslog(1, UVM_BASEADDR - 1, 1).is_err());
    }
}
