//! Reproduces the format scenario: a 2 MiB image with a 4096-byte
//! blocksize formats to 512 blocks, 509 of them free, root at block 2 and
//! the free list starting at block 3; closing and reopening preserves it.

use std::io::Write;
use clap::Parser;
use trilab::fs::FileSystem;

/// Formats a fresh image and reopens it, confirming the free-block count
/// survives the round trip.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    size_bytes: usize,
    #[arg(long, default_value_t = 4096)]
    blocksize: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut image = tempfile::NamedTempFile::new()?;
    image.write_all(&vec![0u8; args.size_bytes])?;
    image.flush()?;

    let sb = FileSystem::format(image.path(), args.blocksize)?;
    println!(
        "formatted: blocks={} blocksize={} freeblks={} root={} freelist={}",
        sb.blocks, sb.blocksize, sb.freeblks, sb.root, sb.freelist
    );
    if args.size_bytes == 2 * 1024 * 1024 && args.blocksize == 4096 {
        assert_eq!(sb.blocks, 512);
        assert_eq!(sb.freeblks, 509);
        assert_eq!(sb.root, 2);
        assert_eq!(sb.freelist, 3);
    }

    let fs = FileSystem::open(image.path())?;
    let reopened = fs.superblock();
    println!("reopened: freeblks={}", reopened.freeblks);
    assert_eq!(reopened.freeblks, sb.freeblks);
    fs.close()?;

    Ok(())
}
