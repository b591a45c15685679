//! Bit-exact on-disk records. Every struct occupies exactly one block;
//! unused tail bytes are don't-care. All integers are little-endian.

pub const MAGIC: u32 = 0xdcc605f5;
pub const MIN_BLOCK_SIZE: usize = 128;
pub const MIN_BLOCK_COUNT: u64 = 4;
pub const ROOT_NODEINFO_BLOCK: u64 = 1;
pub const ROOT_INODE_BLOCK: u64 = 2;

pub const INODE_HEADER_SIZE: usize = 32;
pub const NODEINFO_HEADER_SIZE: usize = 8;

pub const MODE_DIRECTORY: u8 = 0;
pub const MODE_REGULAR_HEAD: u8 = 1;
pub const MODE_CHILD: u8 = 2;

/// Number of raw file-data bytes a regular-file inode carries. The same
/// trailing region backs both directory links and file payload; for files
/// it is reinterpreted as a flat byte buffer instead of an array of block
/// numbers.
pub fn file_payload_per_inode(blocksize: usize) -> usize {
    blocksize - INODE_HEADER_SIZE
}

pub fn links_per_inode(blocksize: usize) -> usize {
    (blocksize - 32) / 8
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub blocks: u64,
    pub blocksize: u32,
    pub freeblks: u64,
    pub root: u64,
    pub freelist: u64,
}

impl Superblock {
    pub fn to_bytes(&self, blocksize: usize) -> Vec<u8> {
        let mut buf = vec![0u8; blocksize];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.blocksize).to_le_bytes());
        buf[8..16].copy_from_slice(&self.blocks.to_le_bytes());
        buf[16..24].copy_from_slice(&self.freeblks.to_le_bytes());
        buf[24..32].copy_from_slice(&self.root.to_le_bytes());
        buf[32..40].copy_from_slice(&self.freelist.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Superblock {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            blocksize: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            blocks: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            freeblks: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            root: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            freelist: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub size: u64,
    pub name: String,
}

impl NodeInfo {
    pub fn to_bytes(&self, blocksize: usize) -> Vec<u8> {
        let mut buf = vec![0u8; blocksize];
        buf[0..8].copy_from_slice(&self.size.to_le_bytes());
        let name_bytes = self.name.as_bytes();
        let capacity = blocksize - NODEINFO_HEADER_SIZE - 1; // room for the NUL
        let n = name_bytes.len().min(capacity);
        buf[NODEINFO_HEADER_SIZE..NODEINFO_HEADER_SIZE + n].copy_from_slice(&name_bytes[..n]);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let size = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let name_area = &buf[NODEINFO_HEADER_SIZE..];
        let end = name_area.iter().position(|&b| b == 0).unwrap_or(name_area.len());
        let name = String::from_utf8_lossy(&name_area[..end]).into_owned();
        NodeInfo { size, name }
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub mode: u8,
    pub parent: u64,
    pub meta: u64,
    pub next: u64,
    pub links: Vec<u64>,
}

impl Inode {
    pub fn to_bytes(&self, blocksize: usize) -> Vec<u8> {
        let mut buf = vec![0u8; blocksize];
        buf[0] = self.mode;
        buf[8..16].copy_from_slice(&self.parent.to_le_bytes());
        buf[16..24].copy_from_slice(&self.meta.to_le_bytes());
        buf[24..32].copy_from_slice(&self.next.to_le_bytes());
        for (i, link) in self.links.iter().enumerate() {
            let off = INODE_HEADER_SIZE + i * 8;
            if off + 8 > blocksize {
                break;
            }
            buf[off..off + 8].copy_from_slice(&link.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8], blocksize: usize) -> Self {
        let mode = buf[0];
        let parent = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let meta = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let next = u64::from_le_bytes(buf[24..32].try_into().unwrap());
        let count = links_per_inode(blocksize);
        let mut links = Vec::with_capacity(count);
        for i in 0..count {
            let off = INODE_HEADER_SIZE + i * 8;
            links.push(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
        }
        Inode { mode, parent, meta, next, links }
    }

    pub fn empty(mode: u8, parent: u64, meta: u64, blocksize: usize) -> Self {
        Inode { mode, parent, meta, next: 0, links: vec![0u64; links_per_inode(blocksize)] }
    }

    /// Encode with the trailing region holding raw file-data bytes instead
    /// of an array of block numbers (used for regular-file chains).
    pub fn to_bytes_with_payload(&self, blocksize: usize, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; blocksize];
        buf[0] = self.mode;
        buf[8..16].copy_from_slice(&self.parent.to_le_bytes());
        buf[16..24].copy_from_slice(&self.meta.to_le_bytes());
        buf[24..32].copy_from_slice(&self.next.to_le_bytes());
        let cap = blocksize - INODE_HEADER_SIZE;
        let n = payload.len().min(cap);
        buf[INODE_HEADER_SIZE..INODE_HEADER_SIZE + n].copy_from_slice(&payload[..n]);
        buf
    }

    pub fn payload_bytes(buf: &[u8]) -> &[u8] {
        &buf[INODE_HEADER_SIZE..]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Freepage {
    pub next: u64,
}

impl Freepage {
    pub fn to_bytes(&self, blocksize: usize) -> Vec<u8> {
        let mut buf = vec![0u8; blocksize];
        buf[0..8].copy_from_slice(&self.next.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Freepage { next: u64::from_le_bytes(buf[0..8].try_into().unwrap()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_round_trips() {
        let sb = Superblock { magic: MAGIC, blocks: 512, blocksize: 4096, freeblks: 509, root: 2, freelist: 3 };
        let bytes = sb.to_bytes(4096);
        let back = Superblock::from_bytes(&bytes);
        assert_eq!(back.magic, MAGIC);
        assert_eq!(back.freeblks, 509);
        assert_eq!(back.freelist, 3);
    }

    #[test]
    fn inode_links_round_trip() {
        let blocksize = 128;
        let mut inode = Inode::empty(MODE_DIRECTORY, 2, 1, blocksize);
        inode.links[0] = 5;
        inode.links[1] = 6;
        let bytes = inode.to_bytes(blocksize);
        let back = Inode::from_bytes(&bytes, blocksize);
        assert_eq!(back.links[0], 5);
        assert_eq!(back.links[1], 6);
        assert_eq!(back.links.len(), links_per_inode(blocksize));
    }

    #[test]
    fn nodeinfo_name_round_trips() {
        let info = NodeInfo { size: 2, name: "hello".to_string() };
        let bytes = info.to_bytes(128);
        let back = NodeInfo::from_bytes(&bytes);
        assert_eq!(back.name, "hello");
        assert_eq!(back.size, 2);
    }
}
