//! Reproduces the directory-lifecycle scenario: create nested directories,
//! write and read a file, then tear everything back down and confirm the
//! free-block count returns to where it started.

use std::io::Write;
use trilab::fs::FileSystem;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut image = tempfile::NamedTempFile::new()?;
    image.write_all(&vec![0u8; 64 * 512])?;
    image.flush()?;

    let formatted = FileSystem::format(image.path(), 512)?;
    let mut fs = FileSystem::open(image.path())?;

    fs.mkdir("/a")?;
    fs.mkdir("/a/b")?;
    fs.write_file("/a/b/hello", b"hi")?;

    println!("list /a/b -> {}", fs.list_dir("/a/b"));
    let contents = fs.read_file("/a/b/hello", 2)?;
    println!("read /a/b/hello -> {} {:?}", contents.len(), String::from_utf8_lossy(&contents));

    fs.unlink("/a/b/hello")?;
    fs.rmdir("/a/b")?;
    fs.rmdir("/a")?;

    let final_sb = fs.superblock();
    println!("freeblks restored: {} (started at {})", final_sb.freeblks, formatted.freeblks);
    assert_eq!(final_sb.freeblks, formatted.freeblks);
    fs.close()?;

    Ok(())
}
