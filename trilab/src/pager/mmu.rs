//! The externally supplied MMU collaborator this pager drives.
//!
//! Not implemented here — the host (whatever owns `pmem` and the real
//! page tables) provides it. This trait is this crate's concrete
//! expression of that boundary.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u32 {
        const READ = 0b001;
        const WRITE = 0b010;
    }
}

pub type Pid = i32;

/// Installs/revokes mappings and performs backing-store I/O on behalf of
/// the pager. `frame` and `block` indices are the pager's own, not raw
/// addresses; `vaddr` is a page-aligned logical address in
/// `[UVM_BASEADDR, UVM_MAXADDR]`.
pub trait Mmu {
    fn resident(&mut self, pid: Pid, vaddr: u64, frame: usize, prot: Protection);
    fn nonresident(&mut self, pid: Pid, vaddr: u64);
    fn chprot(&mut self, pid: Pid, vaddr: u64, prot: Protection);
    fn disk_read(&mut self, block: usize, frame: usize);
    fn disk_write(&mut self, frame: usize, block: usize);
    fn zero_fill(&mut self, frame: usize);
}
