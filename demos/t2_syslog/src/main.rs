//! Reproduces the syslog scenario: a range spanning two pages is read and
//! printed as hex, then an out-of-range address is rejected.

use trilab::pager::{Mmu, Pager, Pid, Protection, PAGE_SIZE};

struct QuietMmu;

impl Mmu for QuietMmu {
    fn resident(&mut self, _pid: Pid, _vaddr: u64, _frame: usize, _prot: Protection) {}
    fn nonresident(&mut self, _pid: Pid, _vaddr: u64) {}
    fn chprot(&mut self, _pid: Pid, _vaddr: u64, _prot: Protection) {}
    fn disk_read(&mut self, _block: usize, _frame: usize) {}
    fn disk_write(&mut self, _frame: usize, _block: usize) {}
    fn zero_fill(&mut self, _frame: usize) {}
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut pmem = vec![0u8; (2 * PAGE_SIZE) as usize];
    let pager = Pager::new(2, 2, QuietMmu, &mut pmem);

    let pid: Pid = 1;
    pager.create(pid);
    let p0 = pager.extend(pid).expect("block for P0");
    let _p1 = pager.extend(pid).expect("block for P1");

    println!("syslog spanning the P0/P1 boundary:");
    pager
        .syslog(pid, p0 + PAGE_SIZE - 2, 4)
        .expect("range fully covered by P0 and P1");

    println!("syslog one byte before P0:");
    match pager.syslog(pid, p0 - 1, 1) {
        Ok(()) => println!("unexpectedly succeeded"),
        Err(e) => println!("rejected as expected: {e}"),
    }

    Ok(())
}
