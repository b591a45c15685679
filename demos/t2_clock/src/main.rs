//! Reproduces the clock-eviction scenario: 3 frames, 5 backing blocks.
//! Touching pages 0, 1, and 2 fills every frame and marks it accessed;
//! touching page 3 then forces the clock hand to sweep past every frame
//! once (clearing each accessed bit) before landing back on frame 0.

use clap::Parser;
use trilab::pager::{Mmu, Pager, Pid, Protection, PAGE_SIZE};

/// Replays the clock-eviction walk with a configurable frame/block count.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 3)]
    nframes: usize,
    #[arg(long, default_value_t = 5)]
    nblocks: usize,
}

struct LoggingMmu;

impl Mmu for LoggingMmu {
    fn resident(&mut self, pid: Pid, vaddr: u64, frame: usize, prot: Protection) {
        println!("resident pid={pid} vaddr={vaddr:#x} frame={frame} prot={prot:?}");
    }
    fn nonresident(&mut self, pid: Pid, vaddr: u64) {
        println!("nonresident pid={pid} vaddr={vaddr:#x}");
    }
    fn chprot(&mut self, pid: Pid, vaddr: u64, prot: Protection) {
        println!("chprot pid={pid} vaddr={vaddr:#x} prot={prot:?}");
    }
    fn disk_read(&mut self, block: usize, frame: usize) {
        println!("disk_read block={block} frame={frame}");
    }
    fn disk_write(&mut self, frame: usize, block: usize) {
        println!("disk_write frame={frame} block={block}");
    }
    fn zero_fill(&mut self, frame: usize) {
        println!("zero_fill frame={frame}");
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let Args { nframes, nblocks } = Args::parse();

    let mut pmem = vec![0u8; nframes * PAGE_SIZE as usize];
    let pager = Pager::new(nframes, nblocks, LoggingMmu, &mut pmem);

    let pid: Pid = 1;
    pager.create(pid);
    let mut addrs = Vec::new();
    for _ in 0..5 {
        let addr = pager.extend(pid).expect("5 blocks available");
        addrs.push(addr);
    }

    println!("-- touching P0, P1, P2 (fills all 3 frames) --");
    for &addr in &addrs[0..3] {
        pager.fault(pid, addr);
    }

    println!("-- touching P3 (forces clock eviction) --");
    pager.fault(pid, addrs[3]);

    Ok(())
}
