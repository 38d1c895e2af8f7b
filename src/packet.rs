use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

/// Default slack reserved in front of the payload for header prepends.
pub const DEFAULT_HEADROOM: usize = 64;
/// Default slack reserved behind the payload for trailer appends.
pub const DEFAULT_TAILROOM: usize = 64;

/// Size of the free-form device/user annotation area, in bytes.
pub const USER_ANNO_SIZE: usize = 24;

/// Fixed annotation block carried by every packet handle.
///
/// Annotations travel with the handle, not the shared payload: cloning a
/// packet copies them, so two handles over the same buffer can diverge.
/// The "next packet" link is deliberately not cloned.
#[derive(Debug, Default)]
pub struct Annotations {
    /// When the packet was captured or generated.
    pub timestamp: Option<SystemTime>,
    /// Next-hop or final destination, as set by routing elements.
    pub dst_addr: Option<IpAddr>,
    /// Bytes the packet represents beyond what the buffer holds
    /// (e.g. a truncated capture or emulated padding).
    pub extra_length: u32,
    /// Intrusive link used by elements that keep packets in chains.
    pub next: Option<Box<Packet>>,
    /// Device-specific scratch space.
    pub user: [u8; USER_ANNO_SIZE],
}

impl Clone for Annotations {
    fn clone(&self) -> Self {
        Annotations {
            timestamp: self.timestamp,
            dst_addr: self.dst_addr,
            extra_length: self.extra_length,
            next: None,
            user: self.user,
        }
    }
}

/// Payload storage shared between packet handles.
///
/// `data[start..end]` is the live payload; the regions outside are headroom
/// and tailroom.
#[derive(Debug, Clone)]
struct PacketBuf {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

/// A reference-counted mutable packet.
///
/// Cloning is cheap: the payload is shared and only copied when a clone
/// mutates it (`data_mut` and the slack operations trigger copy-on-write).
/// Exactly one owner may mutate at a time because mutation requires
/// `&mut Packet`; the dispatch layer transfers ownership on push and pull.
#[derive(Debug)]
pub struct Packet {
    buf: Arc<PacketBuf>,
    anno: Annotations,
}

impl Packet {
    /// Allocate a zero-filled packet of `len` payload bytes with default slack.
    pub fn new(len: usize) -> Self {
        let data = vec![0u8; DEFAULT_HEADROOM + len + DEFAULT_TAILROOM];
        Packet {
            buf: Arc::new(PacketBuf {
                data,
                start: DEFAULT_HEADROOM,
                end: DEFAULT_HEADROOM + len,
            }),
            anno: Annotations::default(),
        }
    }

    /// Allocate a packet holding a copy of `payload`, with default slack.
    pub fn from_slice(payload: &[u8]) -> Self {
        let mut p = Packet::new(payload.len());
        p.data_mut().copy_from_slice(payload);
        p
    }

    /// Payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf.data[self.buf.start..self.buf.end]
    }

    /// Mutable payload bytes; copies the buffer first if it is shared.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        let buf = Arc::make_mut(&mut self.buf);
        &mut buf.data[buf.start..buf.end]
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.end - self.buf.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free bytes in front of the payload.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.buf.start
    }

    /// Free bytes behind the payload.
    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.data.len() - self.buf.end
    }

    /// Whether another handle shares this payload.
    #[inline]
    pub fn shared(&self) -> bool {
        Arc::strong_count(&self.buf) > 1
    }

    /// Extend the payload by `n` bytes at the front (header prepend) and
    /// return the new front region. Reallocates when headroom is short.
    pub fn push_front(&mut self, n: usize) -> &mut [u8] {
        if self.headroom() < n {
            self.realloc(n.max(DEFAULT_HEADROOM), 0);
        }
        let buf = Arc::make_mut(&mut self.buf);
        buf.start -= n;
        &mut buf.data[buf.start..buf.start + n]
    }

    /// Shrink the payload by `n` bytes at the front (header strip).
    pub fn pull_front(&mut self, n: usize) {
        let n = n.min(self.len());
        let buf = Arc::make_mut(&mut self.buf);
        buf.start += n;
    }

    /// Extend the payload by `n` bytes at the tail and return the new region.
    pub fn put(&mut self, n: usize) -> &mut [u8] {
        if self.tailroom() < n {
            self.realloc(0, n.max(DEFAULT_TAILROOM));
        }
        let buf = Arc::make_mut(&mut self.buf);
        let old_end = buf.end;
        buf.end += n;
        &mut buf.data[old_end..buf.end]
    }

    /// Shrink the payload by `n` bytes at the tail.
    pub fn take(&mut self, n: usize) {
        let n = n.min(self.len());
        let buf = Arc::make_mut(&mut self.buf);
        buf.end -= n;
    }

    /// Annotation block.
    #[inline]
    pub fn anno(&self) -> &Annotations {
        &self.anno
    }

    #[inline]
    pub fn anno_mut(&mut self) -> &mut Annotations {
        &mut self.anno
    }

    /// Payload length plus the extra-length annotation.
    #[inline]
    pub fn full_length(&self) -> usize {
        self.len() + self.anno.extra_length as usize
    }

    // Rebuild the buffer with at least the requested slack on each side.
    fn realloc(&mut self, want_head: usize, want_tail: usize) {
        let len = self.len();
        let head = self.headroom().max(want_head);
        let tail = self.tailroom().max(want_tail);
        let mut data = vec![0u8; head + len + tail];
        data[head..head + len].copy_from_slice(self.data());
        self.buf = Arc::new(PacketBuf {
            data,
            start: head,
            end: head + len,
        });
    }
}

impl Clone for Packet {
    fn clone(&self) -> Self {
        Packet {
            buf: Arc::clone(&self.buf),
            anno: self.anno.clone(),
        }
    }
}
