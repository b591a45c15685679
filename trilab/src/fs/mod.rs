//! On-disk filesystem image: superblock, inode chains, nodeinfo metadata,
//! a free-block list, and hierarchical directories, behind a small
//! POSIX-like file/directory API.

pub mod error;
pub mod layout;

pub use error::{FsError, FsResult};
pub use layout::Superblock;

use layout::{
    file_payload_per_inode, links_per_inode, Inode, NodeInfo, Freepage, MAGIC, MODE_CHILD,
    MODE_DIRECTORY, MODE_REGULAR_HEAD, ROOT_INODE_BLOCK, ROOT_NODEINFO_BLOCK,
};

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

static FS_OPEN: AtomicBool = AtomicBool::new(false);

pub struct FileSystem {
    file: File,
    sb: Superblock,
    blocksize: usize,
}

fn write_block(file: &mut File, blocksize: usize, block: u64, data: &[u8]) -> FsResult<()> {
    debug_assert_eq!(data.len(), blocksize);
    file.seek(SeekFrom::Start(block * blocksize as u64))?;
    file.write_all(data)?;
    Ok(())
}

fn read_block(file: &mut File, blocksize: usize, block: u64) -> FsResult<Vec<u8>> {
    let mut buf = vec![0u8; blocksize];
    file.seek(SeekFrom::Start(block * blocksize as u64))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

impl FileSystem {
    /// `fs_format`: write a fresh superblock, root nodeinfo, root inode,
    /// and a free list linking blocks `3..blocks-1`.
    pub fn format(path: &Path, blocksize: usize) -> FsResult<Superblock> {
        if blocksize < layout::MIN_BLOCK_SIZE {
            return Err(FsError::InvalidBlockSize);
        }
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let blocks = len / blocksize as u64;
        if blocks < layout::MIN_BLOCK_COUNT {
            return Err(FsError::NoSpaceOnFormat);
        }

        let freeblks = blocks - 3;
        let freelist = if freeblks > 0 { 3 } else { 0 };
        let sb = Superblock {
            magic: MAGIC,
            blocks,
            blocksize: blocksize as u32,
            freeblks,
            root: ROOT_INODE_BLOCK,
            freelist,
        };
        write_block(&mut file, blocksize, 0, &sb.to_bytes(blocksize))?;

        let root_info = NodeInfo { size: 0, name: "/".to_string() };
        write_block(&mut file, blocksize, ROOT_NODEINFO_BLOCK, &root_info.to_bytes(blocksize))?;

        let root_inode = Inode::empty(MODE_DIRECTORY, ROOT_INODE_BLOCK, ROOT_NODEINFO_BLOCK, blocksize);
        write_block(&mut file, blocksize, ROOT_INODE_BLOCK, &root_inode.to_bytes(blocksize))?;

        for b in 3..blocks {
            let next = if b + 1 < blocks { b + 1 } else { 0 };
            write_block(&mut file, blocksize, b, &Freepage { next }.to_bytes(blocksize))?;
        }

        log::info!("fs: formatted {:?} with {blocks} blocks of {blocksize} bytes", path);
        Ok(sb)
    }

    /// `fs_open`: read and verify the superblock. Only one filesystem may
    /// be open at a time within this process.
    pub fn open(path: &Path) -> FsResult<FileSystem> {
        if FS_OPEN.swap(true, Ordering::SeqCst) {
            return Err(FsError::AlreadyOpen);
        }
        let result = (|| -> FsResult<FileSystem> {
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut header = vec![0u8; layout::MIN_BLOCK_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let sb = Superblock::from_bytes(&header);
            if sb.magic != MAGIC {
                return Err(FsError::BadMagic);
            }
            Ok(FileSystem { file, sb, blocksize: sb.blocksize as usize })
        })();
        if result.is_err() {
            FS_OPEN.store(false, Ordering::SeqCst);
        }
        result
    }

    /// `fs_close`: validate magic, release the handle.
    pub fn close(self) -> FsResult<()> {
        if self.sb.magic != MAGIC {
            return Err(FsError::BadMagic);
        }
        FS_OPEN.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn superblock(&self) -> Superblock {
        self.sb
    }

    fn persist_superblock(&mut self) -> FsResult<()> {
        let blocksize = self.blocksize;
        write_block(&mut self.file, blocksize, 0, &self.sb.to_bytes(blocksize))
    }

    /// `fs_get_block`: pop the head of the free list.
    pub fn get_block(&mut self) -> FsResult<u64> {
        if self.sb.freelist == 0 {
            return Err(FsError::NoSpace);
        }
        let block = self.sb.freelist;
        let raw = read_block(&mut self.file, self.blocksize, block)?;
        let fp = Freepage::from_bytes(&raw);
        self.sb.freelist = fp.next;
        self.sb.freeblks -= 1;
        self.persist_superblock()?;
        Ok(block)
    }

    /// `fs_put_block`: push `block` back onto the free list.
    pub fn put_block(&mut self, block: u64) -> FsResult<()> {
        let fp = Freepage { next: self.sb.freelist };
        let blocksize = self.blocksize;
        write_block(&mut self.file, blocksize, block, &fp.to_bytes(blocksize))?;
        self.sb.freelist = block;
        self.sb.freeblks += 1;
        self.persist_superblock()?;
        Ok(())
    }

    fn read_inode(&mut self, block: u64) -> FsResult<Inode> {
        let raw = read_block(&mut self.file, self.blocksize, block)?;
        Ok(Inode::from_bytes(&raw, self.blocksize))
    }

    fn write_inode(&mut self, block: u64, inode: &Inode) -> FsResult<()> {
        let blocksize = self.blocksize;
        write_block(&mut self.file, blocksize, block, &inode.to_bytes(blocksize))
    }

    fn read_nodeinfo(&mut self, block: u64) -> FsResult<NodeInfo> {
        let raw = read_block(&mut self.file, self.blocksize, block)?;
        Ok(NodeInfo::from_bytes(&raw))
    }

    fn write_nodeinfo(&mut self, block: u64, info: &NodeInfo) -> FsResult<()> {
        let blocksize = self.blocksize;
        write_block(&mut self.file, blocksize, block, &info.to_bytes(blocksize))
    }

    /// Chain blocks of a directory/file starting at its head inode,
    /// following `next` only (never `parent`).
    fn chain_blocks(&mut self, head_block: u64) -> FsResult<Vec<u64>> {
        let mut blocks = vec![head_block];
        let mut current = self.read_inode(head_block)?;
        while current.next != 0 {
            blocks.push(current.next);
            current = self.read_inode(current.next)?;
        }
        Ok(blocks)
    }

    /// Look up `name` among `dir_head`'s entries, returning the matched
    /// entry's own head-inode block.
    fn find_in_directory(&mut self, dir_head: u64, name: &str) -> FsResult<Option<u64>> {
        for block in self.chain_blocks(dir_head)? {
            let inode = self.read_inode(block)?;
            for link in inode.links.iter().copied().filter(|&l| l != 0) {
                let target = self.read_inode(link)?;
                let head_block = if target.mode == MODE_CHILD { target.parent } else { link };
                let head = if head_block == link { target } else { self.read_inode(head_block)? };
                let info = self.read_nodeinfo(head.meta)?;
                if info.name == name {
                    return Ok(Some(head_block));
                }
            }
        }
        Ok(None)
    }

    fn append_link(&mut self, dir_head: u64, entry_block: u64) -> FsResult<()> {
        let mut current_block = dir_head;
        loop {
            let mut inode = self.read_inode(current_block)?;
            if let Some(slot) = inode.links.iter().position(|&l| l == 0) {
                inode.links[slot] = entry_block;
                self.write_inode(current_block, &inode)?;
                break;
            }
            if inode.next != 0 {
                current_block = inode.next;
                continue;
            }
            let new_block = self.get_block()?;
            inode.next = new_block;
            self.write_inode(current_block, &inode)?;
            let mut continuation = Inode::empty(MODE_CHILD, dir_head, inode.meta, self.blocksize);
            continuation.links[0] = entry_block;
            self.write_inode(new_block, &continuation)?;
            break;
        }

        let head = self.read_inode(dir_head)?;
        let mut info = self.read_nodeinfo(head.meta)?;
        info.size += 1;
        self.write_nodeinfo(head.meta, &info)?;
        Ok(())
    }

    fn remove_link(&mut self, dir_head: u64, entry_block: u64) -> FsResult<()> {
        let chain = self.chain_blocks(dir_head)?;
        let mut inodes = Vec::with_capacity(chain.len());
        let mut entries = Vec::new();
        for &block in &chain {
            let inode = self.read_inode(block)?;
            entries.extend(inode.links.iter().copied().filter(|&l| l != 0));
            inodes.push(inode);
        }
        let pos = entries.iter().position(|&e| e == entry_block).ok_or(FsError::NotFound)?;
        entries.remove(pos);

        let cap = links_per_inode(self.blocksize);
        for (i, &block) in chain.iter().enumerate() {
            let mut inode = inodes[i].clone();
            inode.links = vec![0u64; cap];
            for j in 0..cap {
                if let Some(&e) = entries.get(i * cap + j) {
                    inode.links[j] = e;
                }
            }
            self.write_inode(block, &inode)?;
        }

        let head = self.read_inode(dir_head)?;
        let mut info = self.read_nodeinfo(head.meta)?;
        info.size -= 1;
        self.write_nodeinfo(head.meta, &info)?;
        Ok(())
    }

    /// Resolve an absolute path to the block of its head inode.
    fn resolve(&mut self, path: &str) -> FsResult<u64> {
        let mut current = ROOT_INODE_BLOCK;
        for component in path.split('/').filter(|s| !s.is_empty()) {
            current = self.find_in_directory(current, component)?.ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// Resolve the parent directory and final component name of a path.
    fn resolve_parent(&mut self, path: &str) -> FsResult<(u64, String)> {
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, ancestors) = components.split_last().ok_or(FsError::NotFound)?;
        let mut current = ROOT_INODE_BLOCK;
        for component in ancestors {
            current = self.find_in_directory(current, component)?.ok_or(FsError::NotFound)?;
        }
        Ok((current, (*last).to_string()))
    }

    /// `fs_write_file`: create or overwrite a regular file.
    pub fn write_file(&mut self, path: &str, buf: &[u8]) -> FsResult<()> {
        let (parent_block, name) = self.resolve_parent(path)?;
        let payload_cap = file_payload_per_inode(self.blocksize);
        let needed_len = buf.len().div_ceil(payload_cap).max(1);

        let existing = self.find_in_directory(parent_block, &name)?;
        let (head_block, meta_block, mut chain) = if let Some(head_block) = existing {
            let head = self.read_inode(head_block)?;
            let chain = self.chain_blocks(head_block)?;
            (head_block, head.meta, chain)
        } else {
            let meta_block = self.get_block()?;
            let head_block = self.get_block()?;
            self.append_link(parent_block, head_block)?;
            (head_block, meta_block, vec![head_block])
        };

        if chain.len() < needed_len {
            for _ in chain.len()..needed_len {
                chain.push(self.get_block()?);
            }
        } else if chain.len() > needed_len {
            for surplus in chain.split_off(needed_len) {
                self.put_block(surplus)?;
            }
        }

        for (i, &block) in chain.iter().enumerate() {
            let mode = if i == 0 { MODE_REGULAR_HEAD } else { MODE_CHILD };
            let next = chain.get(i + 1).copied().unwrap_or(0);
            let inode = Inode { mode, parent: head_block, meta: meta_block, next, links: Vec::new() };
            let start = i * payload_cap;
            let end = (start + payload_cap).min(buf.len());
            let payload = if start < buf.len() { &buf[start..end] } else { &[] };
            let blocksize = self.blocksize;
            write_block(&mut self.file, blocksize, block, &inode.to_bytes_with_payload(blocksize, payload))?;
        }

        self.write_nodeinfo(meta_block, &NodeInfo { size: buf.len() as u64, name })?;
        log::debug!("fs: wrote {} bytes to {path} across {} inodes", buf.len(), chain.len());
        Ok(())
    }

    /// `fs_read_file`: follow the chain, copying up to `bufsz` bytes.
    pub fn read_file(&mut self, path: &str, bufsz: usize) -> FsResult<Vec<u8>> {
        let head_block = self.resolve(path)?;
        let head = self.read_inode(head_block)?;
        let info = self.read_nodeinfo(head.meta)?;
        let total = (info.size as usize).min(bufsz);

        let payload_cap = file_payload_per_inode(self.blocksize);
        let mut out = Vec::with_capacity(total);
        let mut current_block = head_block;
        loop {
            let blocksize = self.blocksize;
            let raw = read_block(&mut self.file, blocksize, current_block)?;
            let remaining = total - out.len();
            let take = remaining.min(payload_cap);
            out.extend_from_slice(&Inode::payload_bytes(&raw)[..take]);
            if out.len() >= total {
                break;
            }
            let next = Inode::from_bytes(&raw, blocksize).next;
            if next == 0 {
                break;
            }
            current_block = next;
        }
        Ok(out)
    }

    /// `fs_unlink`: release a regular file's nodeinfo and chain, remove it
    /// from its parent directory.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let (parent_block, name) = self.resolve_parent(path)?;
        let head_block = self.find_in_directory(parent_block, &name)?.ok_or(FsError::NotFound)?;
        let head = self.read_inode(head_block)?;
        let meta_block = head.meta;
        for block in self.chain_blocks(head_block)? {
            self.put_block(block)?;
        }
        self.put_block(meta_block)?;
        self.remove_link(parent_block, head_block)?;
        Ok(())
    }

    /// `fs_mkdir`: allocate a fresh nodeinfo and inode, append to the
    /// parent's links. Does not create ancestors recursively.
    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_block, name) = self.resolve_parent(path)?;
        let meta_block = self.get_block()?;
        let inode_block = self.get_block()?;
        self.write_nodeinfo(meta_block, &NodeInfo { size: 0, name })?;
        let inode = Inode::empty(MODE_DIRECTORY, inode_block, meta_block, self.blocksize);
        self.write_inode(inode_block, &inode)?;
        self.append_link(parent_block, inode_block)?;
        Ok(())
    }

    /// `fs_rmdir`: require an empty directory, release its two blocks.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_block, name) = self.resolve_parent(path)?;
        let dir_block = self.find_in_directory(parent_block, &name)?.ok_or(FsError::NotFound)?;
        let dir = self.read_inode(dir_block)?;
        let info = self.read_nodeinfo(dir.meta)?;
        if info.size != 0 {
            return Err(FsError::NotEmpty);
        }
        self.put_block(dir_block)?;
        self.put_block(dir.meta)?;
        self.remove_link(parent_block, dir_block)?;
        Ok(())
    }

    /// `fs_list_dir`: entry names, `/`-suffixed for subdirectories, space
    /// separated. Returns the literal `"-1"` on resolution failure.
    pub fn list_dir(&mut self, path: &str) -> String {
        match self.list_dir_inner(path) {
            Ok(s) => s,
            Err(_) => "-1".to_string(),
        }
    }

    fn list_dir_inner(&mut self, path: &str) -> FsResult<String> {
        let dir_block = self.resolve(path)?;
        let mut names = Vec::new();
        for block in self.chain_blocks(dir_block)? {
            let inode = self.read_inode(block)?;
            for link in inode.links.iter().copied().filter(|&l| l != 0) {
                let target = self.read_inode(link)?;
                let head_block = if target.mode == MODE_CHILD { target.parent } else { link };
                let head = if head_block == link { target } else { self.read_inode(head_block)? };
                let info = self.read_nodeinfo(head.meta)?;
                if head.mode == MODE_DIRECTORY {
                    names.push(format!("{}/", info.name));
                } else {
                    names.push(info.name);
                }
            }
        }
        Ok(names.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted_image(blocks: u64, blocksize: usize) -> (tempfile::NamedTempFile, Superblock) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; (blocks as usize) * blocksize]).unwrap();
        tmp.flush().unwrap();
        let sb = FileSystem::format(tmp.path(), blocksize).unwrap();
        (tmp, sb)
    }

    #[test]
    fn format_matches_the_2mib_scenario() {
        let (_tmp, sb) = formatted_image(512, 4096);
        assert_eq!(sb.blocks, 512);
        assert_eq!(sb.freeblks, 509);
        assert_eq!(sb.root, 2);
        assert_eq!(sb.freelist, 3);
    }

    #[test]
    fn directory_lifecycle_restores_freeblks() {
        let (tmp, sb) = formatted_image(64, 512);
        let mut fs = FileSystem::open(tmp.path()).unwrap();

        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.write_file("/a/b/hello", b"hi").unwrap();
        assert_eq!(fs.list_dir("/a/b"), "hello");

        let read_back = fs.read_file("/a/b/hello", 2).unwrap();
        assert_eq!(read_back, b"hi");

        fs.unlink("/a/b/hello").unwrap();
        fs.rmdir("/a/b").unwrap();
        fs.rmdir("/a").unwrap();

        assert_eq!(fs.superblock().freeblks, sb.freeblks);
        fs.close().unwrap();
    }

    #[test]
    fn write_then_read_round_trips_across_multiple_inodes() {
        let (tmp, _sb) = formatted_image(64, 128);
        let mut fs = FileSystem::open(tmp.path()).unwrap();
        let payload: Vec<u8> = (0..300u32).map(|b| (b % 251) as u8).collect();
        fs.write_file("/big", &payload).unwrap();
        let out = fs.read_file("/big", payload.len()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn rmdir_rejects_nonempty_directory() {
        let (tmp, _sb) = formatted_image(64, 512);
        let mut fs = FileSystem::open(tmp.path()).unwrap();
        fs.mkdir("/a").unwrap();
        fs.write_file("/a/f", b"x").unwrap();
        assert!(matches!(fs.rmdir("/a"), Err(FsError::NotEmpty)));
    }

    #[test]
    fn open_rejects_bad_magic() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; 4096]).unwrap();
        tmp.flush().unwrap();
        assert!(matches!(FileSystem::open(tmp.path()), Err(FsError::BadMagic)));
    }
}
