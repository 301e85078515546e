//! Wire-format handling for the parts of a DNS message the proxy touches.
//!
//! Only the 12-byte header and the first question name are ever parsed.
//! Everything after that is opaque and travels verbatim.
//!
//! ```text
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//! |                    QDCOUNT                    |
//! |                    ANCOUNT                    |
//! |                    NSCOUNT                    |
//! |                    ARCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

/// Size of the fixed DNS header (RFC 1035 §4.1.1).
pub const HEADER_LEN: usize = 12;

/// Largest message accepted on the query port and relayed back to clients.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Longest legal label. Larger length bytes are compression pointers or junk.
const MAX_LABEL_LEN: usize = 63;

/// Response code for "name does not exist".
pub const RCODE_NXDOMAIN: u8 = 3;

const FLAG_QR: u8 = 0x80;
const FLAG_AA: u8 = 0x04;
const FLAG_RD: u8 = 0x01;
const FLAG_RA: u8 = 0x80;

/// Parsed view of the DNS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Parse the header, or `None` when the buffer is shorter than 12 bytes.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let word = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);
        Some(Self {
            id: word(0),
            flags: word(2),
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        })
    }

    /// QR bit: set on responses.
    #[inline]
    pub const fn is_response(&self) -> bool {
        self.flags & 0x8000 != 0
    }

    /// RD bit as sent by the client.
    #[inline]
    pub const fn recursion_desired(&self) -> bool {
        self.flags & 0x0100 != 0
    }

    #[inline]
    pub const fn authoritative(&self) -> bool {
        self.flags & 0x0400 != 0
    }

    #[inline]
    pub const fn recursion_available(&self) -> bool {
        self.flags & 0x0080 != 0
    }

    #[inline]
    pub const fn response_code(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }
}

/// Result of walking the question name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Labels joined with `.`, in the case they appear on the wire.
    pub name: String,
    /// Bytes read after the header, including the terminating zero label.
    pub consumed: usize,
    /// Whether the zero-length terminator was reached inside the buffer.
    pub terminated: bool,
}

/// Decode the first question name, starting right after the header.
///
/// Never reads past `buf.len()`. A label whose declared length would run past
/// the end, or whose length byte is not a plain label length, stops the walk
/// and the labels decoded so far are returned with `terminated == false`.
pub fn decode_question_name(buf: &[u8]) -> DecodedName {
    let mut name = String::new();
    let mut pos = HEADER_LEN;
    let mut terminated = false;

    while pos < buf.len() {
        let label_len = buf[pos] as usize;
        if label_len == 0 {
            pos += 1;
            terminated = true;
            break;
        }
        if label_len > MAX_LABEL_LEN || pos + 1 + label_len > buf.len() {
            break;
        }

        let label = &buf[pos + 1..pos + 1 + label_len];
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        pos += 1 + label_len;
    }

    DecodedName {
        name,
        consumed: pos.saturating_sub(HEADER_LEN),
        terminated,
    }
}

/// Turn a query buffer into an NXDOMAIN response, in place.
///
/// Buffers shorter than a header are left untouched. The ID and QDCOUNT are
/// kept so the question section is echoed back; the answer, authority and
/// additional counts are zeroed.
pub fn synthesize_nxdomain(buf: &mut [u8]) {
    if buf.len() < HEADER_LEN {
        return;
    }
    buf[2] = FLAG_QR | FLAG_AA | (buf[2] & FLAG_RD);
    buf[3] = FLAG_RA | RCODE_NXDOMAIN;
    buf[6..HEADER_LEN].fill(0);
}

/// A query as seen by the dispatcher: header plus normalised question name.
#[derive(Debug, Clone)]
pub struct DnsMessage<'a> {
    buf: &'a [u8],
    header: Header,
    question: DecodedName,
    name: String,
}

impl<'a> DnsMessage<'a> {
    /// Parse the header and first question name. `None` below header size.
    pub fn parse(buf: &'a [u8]) -> Option<Self> {
        let header = Header::parse(buf)?;
        let question = decode_question_name(buf);
        let name = question.name.to_ascii_lowercase();
        Some(Self {
            buf,
            header,
            question,
            name,
        })
    }

    #[inline]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Lowercased question name used for matching.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the question name was fully decoded.
    #[inline]
    pub const fn name_complete(&self) -> bool {
        self.question.terminated
    }

    /// Offset just past QTYPE/QCLASS of the first question, when the buffer
    /// holds a complete question.
    pub fn question_end(&self) -> Option<usize> {
        if !self.question.terminated {
            return None;
        }
        let end = HEADER_LEN + self.question.consumed + 4;
        (end <= self.buf.len()).then_some(end)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }
}
