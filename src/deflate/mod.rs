//! Streaming DEFLATE encoder (RFC 1951) with optional zlib framing (RFC 1950)
//!
//! LZ77 over a 32 KiB sliding dictionary with hash-chain match finding and
//! lazy parsing, canonical Huffman coding, and stored/static/dynamic block
//! selection per flushed block. [`Compressor::compress`] is resumable: when
//! the caller's output buffer cannot absorb a flushed block the remainder is
//! staged internally and drained on subsequent calls.

mod huffman;

use crate::checksum::{adler32, ADLER32_INIT};
use huffman::optimize_table;

/// Wrap the output in zlib (RFC 1950) framing.
pub const FLAG_WRITE_ZLIB_HEADER: u32 = 0x0_1000;
/// Maintain the running Adler-32 even without zlib framing.
pub const FLAG_COMPUTE_ADLER32: u32 = 0x0_2000;
/// Disable lazy matching.
pub const FLAG_GREEDY_PARSING: u32 = 0x0_4000;
/// Skip re-zeroing the hash tables on reset; output may vary between runs.
pub const FLAG_NONDETERMINISTIC_PARSING: u32 = 0x0_8000;
/// Only look for distance-1 (run-length) matches.
pub const FLAG_RLE_MATCHES: u32 = 0x1_0000;
/// Discard matches of length 5 or shorter.
pub const FLAG_FILTER_MATCHES: u32 = 0x2_0000;
/// Always emit fixed-Huffman blocks.
pub const FLAG_FORCE_ALL_STATIC_BLOCKS: u32 = 0x4_0000;
/// Always emit stored blocks.
pub const FLAG_FORCE_ALL_RAW_BLOCKS: u32 = 0x8_0000;
/// Low 12 bits of the flag word hold the match-finder probe budget.
pub const MAX_PROBES_MASK: u32 = 0xFFF;

const LZ_DICT_SIZE: usize = 32768;
const LZ_DICT_SIZE_MASK: usize = LZ_DICT_SIZE - 1;
const MIN_MATCH_LEN: usize = 3;
const MAX_MATCH_LEN: usize = 258;

const LZ_CODE_BUF_SIZE: usize = 64 * 1024;
const OUT_BUF_SIZE: usize = (LZ_CODE_BUF_SIZE * 13) / 10;
const OUT_BUF_LIMIT: usize = OUT_BUF_SIZE - 16;

const LZ_HASH_BITS: u32 = 15;
const LZ_HASH_SHIFT: u32 = (LZ_HASH_BITS + 2) / 3;
const LZ_HASH_SIZE: usize = 1 << LZ_HASH_BITS;

const MAX_HUFF_SYMBOLS: usize = 288;
const COMP_FAST_LOOKAHEAD_SIZE: usize = 4096;

/// zlib-style probe budgets per compression level 0-10.
const NUM_PROBES: [u32; 11] = [0, 1, 6, 32, 16, 32, 128, 256, 512, 768, 1500];

const LEN_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LEN_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// Symbol/extra-bit lookups indexed by match_len - 3 and by (dist - 1) either
// directly (< 512) or shifted down 8 bits.
const LEN_SYM: [u16; 256] = {
    let mut t = [0u16; 256];
    let mut c = 0;
    while c < 28 {
        let base = LEN_BASE[c] as usize - 3;
        let span = 1usize << LEN_EXTRA_BITS[c];
        let mut i = 0;
        while i < span && base + i < 256 {
            t[base + i] = 257 + c as u16;
            i += 1;
        }
        c += 1;
    }
    t[255] = 285;
    t
};

const LEN_EXTRA: [u8; 256] = {
    let mut t = [0u8; 256];
    let mut c = 0;
    while c < 28 {
        let base = LEN_BASE[c] as usize - 3;
        let span = 1usize << LEN_EXTRA_BITS[c];
        let mut i = 0;
        while i < span && base + i < 256 {
            t[base + i] = LEN_EXTRA_BITS[c];
            i += 1;
        }
        c += 1;
    }
    t[255] = 0;
    t
};

const SMALL_DIST_SYM: [u8; 512] = {
    let mut t = [0u8; 512];
    let mut c = 0;
    while c < 30 {
        let base = DIST_BASE[c] as usize - 1;
        let span = 1usize << DIST_EXTRA_BITS[c];
        let mut i = 0;
        while i < span && base + i < 512 {
            t[base + i] = c as u8;
            i += 1;
        }
        c += 1;
    }
    t
};

const SMALL_DIST_EXTRA: [u8; 512] = {
    let mut t = [0u8; 512];
    let mut i = 0;
    while i < 512 {
        t[i] = DIST_EXTRA_BITS[SMALL_DIST_SYM[i] as usize];
        i += 1;
    }
    t
};

const LARGE_DIST_SYM: [u8; 128] = {
    let mut t = [0u8; 128];
    let mut d8 = 0;
    while d8 < 128 {
        let dist_m1 = d8 << 8;
        let mut c = 0;
        let mut sym = 0;
        while c < 30 {
            if DIST_BASE[c] as usize - 1 <= dist_m1 {
                sym = c as u8;
            }
            c += 1;
        }
        t[d8] = sym;
        d8 += 1;
    }
    t
};

const LARGE_DIST_EXTRA: [u8; 128] = {
    let mut t = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        t[i] = DIST_EXTRA_BITS[LARGE_DIST_SYM[i] as usize];
        i += 1;
    }
    t
};

/// Order in which code-length-code lengths are written in a dynamic header.
const PRECODE_ORDER: [u8; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// Result of one [`Compressor::compress`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// Progress was made; call again (more input, or more output space).
    Okay,
    /// The stream is finished and fully drained.
    Done,
    /// The output sink reported failure; the stream is dead.
    PutBufFailed,
    /// Invalid call sequence (e.g. new input after `Finish`).
    BadParam,
}

/// How much of the pending state a call must push out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Compress opportunistically, keep everything buffered.
    None,
    /// Emit the pending block plus an empty stored block and byte-align.
    Sync,
    /// Like `Sync`, and also reset the dictionary.
    Full,
    /// Terminate the stream (final block, zlib trailer when framed).
    Finish,
}

/// Compression strategy, mirroring the zlib parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionStrategy {
    #[default]
    Default,
    /// Discard short matches; for data with small random variations.
    Filtered,
    /// Huffman coding only, no match search.
    HuffmanOnly,
    /// Distance-1 matches only.
    Rle,
    /// Fixed Huffman codes only.
    Fixed,
}

/// Map the zlib `(level, window_bits, strategy)` triple to an encoder flag
/// word. Positive `window_bits` selects zlib framing, negative raw deflate.
pub fn create_comp_flags_from_zip_params(
    level: u32,
    window_bits: i32,
    strategy: CompressionStrategy,
) -> u32 {
    let level = level.min(10) as usize;
    let mut comp_flags =
        NUM_PROBES[level] | if level <= 3 { FLAG_GREEDY_PARSING } else { 0 };
    if window_bits > 0 {
        comp_flags |= FLAG_WRITE_ZLIB_HEADER;
    }
    if level == 0 {
        comp_flags |= FLAG_FORCE_ALL_RAW_BLOCKS;
    } else {
        match strategy {
            CompressionStrategy::Default => {}
            CompressionStrategy::Filtered => comp_flags |= FLAG_FILTER_MATCHES,
            CompressionStrategy::HuffmanOnly => comp_flags &= !MAX_PROBES_MASK,
            CompressionStrategy::Fixed => comp_flags |= FLAG_FORCE_ALL_STATIC_BLOCKS,
            CompressionStrategy::Rle => comp_flags |= FLAG_RLE_MATCHES,
        }
    }
    comp_flags
}

/// Persistent encoder state (~350 KiB). Create once per stream, reuse with
/// [`Compressor::reset`].
pub struct Compressor {
    flags: u32,
    greedy_parsing: bool,
    max_probes: [u32; 2],

    adler: u32,
    lookahead_pos: usize,
    lookahead_size: usize,
    dict_size: usize,

    saved_lit: u8,
    saved_match_dist: usize,
    saved_match_len: usize,

    lz_buf_pos: usize,
    lz_flags_pos: usize,
    num_flags_left: u32,
    total_lz_bytes: usize,
    lz_code_buf_dict_pos: usize,

    bit_buffer: u64,
    bits_in: u32,
    out_buf_pos: usize,
    output_flush_ofs: usize,
    output_flush_remaining: usize,

    block_index: u32,
    finished: bool,
    wants_to_finish: bool,
    prev_status: CompressStatus,
    flush: FlushMode,

    // 32 KiB ring plus a 257-byte tail mirror so match reads never wrap
    dict: Vec<u8>,
    next: Vec<u16>,
    hash: Vec<u16>,
    lz_code_buf: Vec<u8>,
    output_buf: Vec<u8>,

    huff_count: [[u16; MAX_HUFF_SYMBOLS]; 3],
    huff_codes: [[u16; MAX_HUFF_SYMBOLS]; 3],
    huff_code_sizes: [[u8; MAX_HUFF_SYMBOLS]; 3],
}

impl Compressor {
    /// Create an encoder from a raw flag word (see the `FLAG_*` constants
    /// and [`create_comp_flags_from_zip_params`]).
    pub fn new(flags: u32) -> Self {
        let probes = flags & MAX_PROBES_MASK;
        Compressor {
            flags,
            greedy_parsing: flags & FLAG_GREEDY_PARSING != 0,
            max_probes: [probes, probes >> 2],
            adler: ADLER32_INIT,
            lookahead_pos: 0,
            lookahead_size: 0,
            dict_size: 0,
            saved_lit: 0,
            saved_match_dist: 0,
            saved_match_len: 0,
            lz_buf_pos: 1,
            lz_flags_pos: 0,
            num_flags_left: 8,
            total_lz_bytes: 0,
            lz_code_buf_dict_pos: 0,
            bit_buffer: 0,
            bits_in: 0,
            out_buf_pos: 0,
            output_flush_ofs: 0,
            output_flush_remaining: 0,
            block_index: 0,
            finished: false,
            wants_to_finish: false,
            prev_status: CompressStatus::Okay,
            flush: FlushMode::None,
            dict: vec![0; LZ_DICT_SIZE + MAX_MATCH_LEN - 1],
            next: vec![0; LZ_DICT_SIZE],
            hash: vec![0; LZ_HASH_SIZE],
            lz_code_buf: vec![0; LZ_CODE_BUF_SIZE],
            output_buf: vec![0; OUT_BUF_SIZE],
            huff_count: [[0; MAX_HUFF_SYMBOLS]; 3],
            huff_codes: [[0; MAX_HUFF_SYMBOLS]; 3],
            huff_code_sizes: [[0; MAX_HUFF_SYMBOLS]; 3],
        }
    }

    /// Create an encoder the way `deflateInit2` would: compression level
    /// 0-10, `window_bits` +15 (zlib framing) or -15 (raw), and a strategy.
    pub fn new_with_params(
        level: u32,
        window_bits: i32,
        strategy: CompressionStrategy,
    ) -> Self {
        Self::new(create_comp_flags_from_zip_params(level, window_bits, strategy))
    }

    /// Reset for a new stream, keeping the configured flags.
    pub fn reset(&mut self) {
        self.adler = ADLER32_INIT;
        self.lookahead_pos = 0;
        self.lookahead_size = 0;
        self.dict_size = 0;
        self.saved_lit = 0;
        self.saved_match_dist = 0;
        self.saved_match_len = 0;
        self.lz_buf_pos = 1;
        self.lz_flags_pos = 0;
        self.num_flags_left = 8;
        self.total_lz_bytes = 0;
        self.lz_code_buf_dict_pos = 0;
        self.bit_buffer = 0;
        self.bits_in = 0;
        self.out_buf_pos = 0;
        self.output_flush_ofs = 0;
        self.output_flush_remaining = 0;
        self.block_index = 0;
        self.finished = false;
        self.wants_to_finish = false;
        self.prev_status = CompressStatus::Okay;
        self.flush = FlushMode::None;
        self.huff_count = [[0; MAX_HUFF_SYMBOLS]; 3];
        if self.flags & FLAG_NONDETERMINISTIC_PARSING == 0 {
            self.hash.fill(0);
            self.next.fill(0);
        }
    }

    /// Adler-32 over all input consumed so far (when zlib framing or
    /// [`FLAG_COMPUTE_ADLER32`] is active).
    pub fn adler32(&self) -> u32 {
        self.adler
    }

    /// Compress `input` into `output`, suspending when either side runs dry.
    ///
    /// Returns the status plus the number of input bytes consumed and output
    /// bytes produced; the caller advances its own cursors and calls again.
    /// Once `Finish` has been passed, every subsequent call must also pass
    /// `Finish` until `Done` is returned.
    pub fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> (CompressStatus, usize, usize) {
        if self.prev_status != CompressStatus::Okay
            || (self.wants_to_finish && flush != FlushMode::Finish)
        {
            self.prev_status = CompressStatus::BadParam;
            return (CompressStatus::BadParam, 0, 0);
        }
        self.flush = flush;
        self.wants_to_finish |= flush == FlushMode::Finish;

        let mut in_pos = 0usize;
        let mut out_pos = 0usize;

        if self.output_flush_remaining != 0 || self.finished {
            self.flush_staged(output, &mut out_pos);
            let status = if self.finished && self.output_flush_remaining == 0 {
                CompressStatus::Done
            } else {
                CompressStatus::Okay
            };
            self.prev_status = status;
            return (status, 0, out_pos);
        }

        let use_fast = self.flags & MAX_PROBES_MASK == 1
            && self.flags & FLAG_GREEDY_PARSING != 0
            && self.flags
                & (FLAG_FILTER_MATCHES | FLAG_FORCE_ALL_RAW_BLOCKS | FLAG_RLE_MATCHES)
                == 0;
        if use_fast {
            self.compress_fast(input, &mut in_pos, output, &mut out_pos);
        } else {
            self.compress_normal(input, &mut in_pos, output, &mut out_pos);
        }

        if self.flags & (FLAG_WRITE_ZLIB_HEADER | FLAG_COMPUTE_ADLER32) != 0 {
            self.adler = adler32(self.adler, &input[..in_pos]);
        }

        if flush != FlushMode::None
            && self.lookahead_size == 0
            && in_pos == input.len()
            && self.output_flush_remaining == 0
        {
            self.flush_block(flush);
            self.finished = flush == FlushMode::Finish;
            if flush == FlushMode::Full {
                self.hash.fill(0);
                self.next.fill(0);
                self.dict_size = 0;
            }
            self.flush_staged(output, &mut out_pos);
        }

        let status = if self.finished && self.output_flush_remaining == 0 {
            CompressStatus::Done
        } else {
            CompressStatus::Okay
        };
        self.prev_status = status;
        (status, in_pos, out_pos)
    }

    /// Compress `input`, handing compressed chunks to `sink`. A `false`
    /// return from the sink kills the stream with `PutBufFailed`.
    pub fn compress_with_sink<F: FnMut(&[u8]) -> bool>(
        &mut self,
        input: &[u8],
        flush: FlushMode,
        sink: &mut F,
    ) -> (CompressStatus, usize) {
        let mut buf = [0u8; 8192];
        let mut consumed = 0usize;
        loop {
            let (status, c, p) = self.compress(&input[consumed..], &mut buf, flush);
            consumed += c;
            if p > 0 && !sink(&buf[..p]) {
                self.prev_status = CompressStatus::PutBufFailed;
                return (CompressStatus::PutBufFailed, consumed);
            }
            match status {
                CompressStatus::Okay => {
                    if c == 0 && p == 0 && consumed == input.len() {
                        return (CompressStatus::Okay, consumed);
                    }
                }
                other => return (other, consumed),
            }
        }
    }

    // ---- dictionary and match finding ----

    /// Pull input into the sliding dictionary, maintaining the tail mirror
    /// and the 3-byte hash chains.
    fn fill_dict(&mut self, in_buf: &[u8], in_pos: &mut usize, max_lookahead: usize) {
        if self.lookahead_size + self.dict_size >= MIN_MATCH_LEN - 1 {
            let mut dst_pos = (self.lookahead_pos + self.lookahead_size) & LZ_DICT_SIZE_MASK;
            let mut ins_pos = self.lookahead_pos + self.lookahead_size - 2;
            let mut hash = (u32::from(self.dict[ins_pos & LZ_DICT_SIZE_MASK])
                << (LZ_HASH_SHIFT * 2))
                ^ (u32::from(self.dict[(ins_pos + 1) & LZ_DICT_SIZE_MASK]) << LZ_HASH_SHIFT);
            let n = (in_buf.len() - *in_pos).min(max_lookahead - self.lookahead_size);
            for &c in &in_buf[*in_pos..*in_pos + n] {
                self.dict[dst_pos] = c;
                if dst_pos < MAX_MATCH_LEN - 1 {
                    self.dict[LZ_DICT_SIZE + dst_pos] = c;
                }
                hash = ((hash << LZ_HASH_SHIFT) ^ u32::from(c)) & (LZ_HASH_SIZE as u32 - 1);
                self.next[ins_pos & LZ_DICT_SIZE_MASK] = self.hash[hash as usize];
                self.hash[hash as usize] = ins_pos as u16;
                dst_pos = (dst_pos + 1) & LZ_DICT_SIZE_MASK;
                ins_pos += 1;
            }
            *in_pos += n;
            self.lookahead_size += n;
        } else {
            while *in_pos < in_buf.len() && self.lookahead_size < max_lookahead {
                let c = in_buf[*in_pos];
                *in_pos += 1;
                let dst_pos = (self.lookahead_pos + self.lookahead_size) & LZ_DICT_SIZE_MASK;
                self.dict[dst_pos] = c;
                if dst_pos < MAX_MATCH_LEN - 1 {
                    self.dict[LZ_DICT_SIZE + dst_pos] = c;
                }
                self.lookahead_size += 1;
                if self.lookahead_size + self.dict_size >= MIN_MATCH_LEN {
                    let ins_pos = self.lookahead_pos + self.lookahead_size - 3;
                    let hash = ((u32::from(self.dict[ins_pos & LZ_DICT_SIZE_MASK])
                        << (LZ_HASH_SHIFT * 2))
                        ^ (u32::from(self.dict[(ins_pos + 1) & LZ_DICT_SIZE_MASK])
                            << LZ_HASH_SHIFT)
                        ^ u32::from(c))
                        & (LZ_HASH_SIZE as u32 - 1);
                    self.next[ins_pos & LZ_DICT_SIZE_MASK] = self.hash[hash as usize];
                    self.hash[hash as usize] = ins_pos as u16;
                }
            }
        }
        self.dict_size = (LZ_DICT_SIZE - self.lookahead_size).min(self.dict_size);
    }

    /// Walk the hash chain from the current position looking for the longest
    /// match, starting from `(match_dist, match_len)` and only improving on
    /// it. The two-byte tail pre-check rejects most probes cheaply.
    fn find_match(
        &self,
        lookahead_pos: usize,
        max_dist: usize,
        max_match_len: usize,
        mut match_dist: usize,
        mut match_len: usize,
    ) -> (usize, usize) {
        let pos = lookahead_pos & LZ_DICT_SIZE_MASK;
        if max_match_len <= match_len {
            return (match_dist, match_len);
        }
        let mut num_probes_left = self.max_probes[usize::from(match_len >= 32)];
        let mut probe_pos = pos;
        let mut c0 = self.dict[pos + match_len];
        let mut c1 = self.dict[pos + match_len - 1];
        loop {
            let dist;
            loop {
                if num_probes_left == 0 {
                    return (match_dist, match_len);
                }
                num_probes_left -= 1;
                let next_probe_pos = self.next[probe_pos];
                if next_probe_pos == 0 {
                    return (match_dist, match_len);
                }
                let d = (lookahead_pos as u32).wrapping_sub(u32::from(next_probe_pos)) as u16
                    as usize;
                if d > max_dist {
                    return (match_dist, match_len);
                }
                probe_pos = usize::from(next_probe_pos) & LZ_DICT_SIZE_MASK;
                if self.dict[probe_pos + match_len] == c0
                    && self.dict[probe_pos + match_len - 1] == c1
                {
                    dist = d;
                    break;
                }
            }
            if dist == 0 {
                return (match_dist, match_len);
            }
            let mut probe_len = 0;
            while probe_len < max_match_len
                && self.dict[pos + probe_len] == self.dict[probe_pos + probe_len]
            {
                probe_len += 1;
            }
            if probe_len > match_len {
                match_dist = dist;
                match_len = probe_len;
                if match_len == max_match_len {
                    return (match_dist, match_len);
                }
                c0 = self.dict[pos + match_len];
                c1 = self.dict[pos + match_len - 1];
            }
        }
    }

    // ---- LZ code buffer ----

    fn record_literal(&mut self, lit: u8) {
        self.total_lz_bytes += 1;
        self.lz_code_buf[self.lz_buf_pos] = lit;
        self.lz_buf_pos += 1;
        self.lz_code_buf[self.lz_flags_pos] >>= 1;
        self.num_flags_left -= 1;
        if self.num_flags_left == 0 {
            self.num_flags_left = 8;
            self.lz_flags_pos = self.lz_buf_pos;
            self.lz_buf_pos += 1;
        }
        self.huff_count[0][usize::from(lit)] += 1;
    }

    fn record_match(&mut self, match_len: usize, match_dist: usize) {
        debug_assert!((MIN_MATCH_LEN..=MAX_MATCH_LEN).contains(&match_len));
        debug_assert!((1..=LZ_DICT_SIZE).contains(&match_dist));
        self.total_lz_bytes += match_len;
        let dist = match_dist - 1;
        self.lz_code_buf[self.lz_buf_pos] = (match_len - MIN_MATCH_LEN) as u8;
        self.lz_code_buf[self.lz_buf_pos + 1] = (dist & 0xFF) as u8;
        self.lz_code_buf[self.lz_buf_pos + 2] = (dist >> 8) as u8;
        self.lz_buf_pos += 3;
        self.lz_code_buf[self.lz_flags_pos] = (self.lz_code_buf[self.lz_flags_pos] >> 1) | 0x80;
        self.num_flags_left -= 1;
        if self.num_flags_left == 0 {
            self.num_flags_left = 8;
            self.lz_flags_pos = self.lz_buf_pos;
            self.lz_buf_pos += 1;
        }
        let dist_sym = if dist < 512 {
            SMALL_DIST_SYM[dist]
        } else {
            LARGE_DIST_SYM[dist >> 8]
        };
        self.huff_count[1][usize::from(dist_sym)] += 1;
        self.huff_count[0][usize::from(LEN_SYM[match_len - MIN_MATCH_LEN])] += 1;
    }

    // ---- parsers ----

    fn compress_normal(
        &mut self,
        in_buf: &[u8],
        in_pos: &mut usize,
        out: &mut [u8],
        out_pos: &mut usize,
    ) {
        let flush = self.flush;
        while *in_pos < in_buf.len() || (flush != FlushMode::None && self.lookahead_size != 0) {
            self.fill_dict(in_buf, in_pos, MAX_MATCH_LEN);
            if flush == FlushMode::None && self.lookahead_size < MAX_MATCH_LEN {
                break;
            }

            let mut len_to_move = 1usize;
            let mut cur_match_dist = 0usize;
            let mut cur_match_len = if self.saved_match_len != 0 {
                self.saved_match_len
            } else {
                MIN_MATCH_LEN - 1
            };
            let cur_pos = self.lookahead_pos & LZ_DICT_SIZE_MASK;

            if self.flags & (FLAG_RLE_MATCHES | FLAG_FORCE_ALL_RAW_BLOCKS) != 0 {
                if self.dict_size != 0 && self.flags & FLAG_FORCE_ALL_RAW_BLOCKS == 0 {
                    let c = self.dict[cur_pos.wrapping_sub(1) & LZ_DICT_SIZE_MASK];
                    cur_match_len = 0;
                    while cur_match_len < self.lookahead_size
                        && self.dict[cur_pos + cur_match_len] == c
                    {
                        cur_match_len += 1;
                    }
                    if cur_match_len < MIN_MATCH_LEN {
                        cur_match_len = 0;
                    } else {
                        cur_match_dist = 1;
                    }
                }
            } else {
                let (d, l) = self.find_match(
                    self.lookahead_pos,
                    self.dict_size,
                    self.lookahead_size,
                    cur_match_dist,
                    cur_match_len,
                );
                cur_match_dist = d;
                cur_match_len = l;
            }

            if (cur_match_len == MIN_MATCH_LEN && cur_match_dist >= 8 * 1024)
                || cur_pos == cur_match_dist
                || (self.flags & FLAG_FILTER_MATCHES != 0 && cur_match_len <= 5)
            {
                cur_match_dist = 0;
                cur_match_len = 0;
            }

            if self.saved_match_len != 0 {
                if cur_match_len > self.saved_match_len {
                    self.record_literal(self.saved_lit);
                    if cur_match_len >= 128 {
                        self.record_match(cur_match_len, cur_match_dist);
                        self.saved_match_len = 0;
                        len_to_move = cur_match_len;
                    } else {
                        self.saved_lit = self.dict[cur_pos];
                        self.saved_match_dist = cur_match_dist;
                        self.saved_match_len = cur_match_len;
                    }
                } else {
                    self.record_match(self.saved_match_len, self.saved_match_dist);
                    len_to_move = self.saved_match_len - 1;
                    self.saved_match_len = 0;
                }
            } else if cur_match_dist == 0 {
                self.record_literal(self.dict[cur_pos]);
            } else if self.greedy_parsing
                || self.flags & FLAG_RLE_MATCHES != 0
                || cur_match_len >= 128
            {
                self.record_match(cur_match_len, cur_match_dist);
                len_to_move = cur_match_len;
            } else {
                self.saved_lit = self.dict[cur_pos];
                self.saved_match_dist = cur_match_dist;
                self.saved_match_len = cur_match_len;
            }

            self.lookahead_pos += len_to_move;
            debug_assert!(self.lookahead_size >= len_to_move);
            self.lookahead_size -= len_to_move;
            self.dict_size = (self.dict_size + len_to_move).min(LZ_DICT_SIZE);

            if self.lz_buf_pos > LZ_CODE_BUF_SIZE - 8
                || (self.total_lz_bytes > 31 * 1024
                    && ((self.lz_buf_pos * 115) >> 7 >= self.total_lz_bytes
                        || self.flags & FLAG_FORCE_ALL_RAW_BLOCKS != 0))
            {
                self.flush_block(FlushMode::None);
                self.flush_staged(out, out_pos);
                if self.output_flush_remaining != 0 {
                    return;
                }
            }
        }
    }

    /// Greedy single-probe loop used at level 1: ingests lookahead in 4 KiB
    /// chunks and skips the lazy bookkeeping entirely.
    fn compress_fast(
        &mut self,
        in_buf: &[u8],
        in_pos: &mut usize,
        out: &mut [u8],
        out_pos: &mut usize,
    ) {
        let flush = self.flush;
        while *in_pos < in_buf.len() || (flush != FlushMode::None && self.lookahead_size != 0) {
            self.fill_dict(in_buf, in_pos, COMP_FAST_LOOKAHEAD_SIZE);
            if flush == FlushMode::None && self.lookahead_size < COMP_FAST_LOOKAHEAD_SIZE {
                break;
            }

            while self.lookahead_size >= MIN_MATCH_LEN
                || (self.lookahead_size != 0
                    && *in_pos == in_buf.len()
                    && flush != FlushMode::None)
            {
                let cur_pos = self.lookahead_pos & LZ_DICT_SIZE_MASK;
                let max_len = self.lookahead_size.min(MAX_MATCH_LEN);
                let (dist, len) = if max_len >= MIN_MATCH_LEN {
                    self.find_match(
                        self.lookahead_pos,
                        self.dict_size,
                        max_len,
                        0,
                        MIN_MATCH_LEN - 1,
                    )
                } else {
                    (0, 0)
                };

                let len_to_move = if len >= MIN_MATCH_LEN
                    && !(len == MIN_MATCH_LEN && dist >= 8 * 1024)
                    && cur_pos != dist
                {
                    self.record_match(len, dist);
                    len
                } else {
                    self.record_literal(self.dict[cur_pos]);
                    1
                };

                self.lookahead_pos += len_to_move;
                self.lookahead_size -= len_to_move;
                self.dict_size = (self.dict_size + len_to_move).min(LZ_DICT_SIZE);

                if self.lz_buf_pos > LZ_CODE_BUF_SIZE - 8 {
                    self.flush_block(FlushMode::None);
                    self.flush_staged(out, out_pos);
                    if self.output_flush_remaining != 0 {
                        return;
                    }
                }
            }
        }
    }

    // ---- bit output and block emission ----

    fn put_bits(&mut self, bits: u32, len: u32) {
        debug_assert!(len <= 16 && u64::from(bits) < (1u64 << len));
        self.bit_buffer |= u64::from(bits) << self.bits_in;
        self.bits_in += len;
        while self.bits_in >= 8 {
            if self.out_buf_pos < OUT_BUF_LIMIT {
                self.output_buf[self.out_buf_pos] = self.bit_buffer as u8;
                self.out_buf_pos += 1;
            }
            self.bit_buffer >>= 8;
            self.bits_in -= 8;
        }
    }

    fn start_static_block(&mut self) {
        for (i, s) in self.huff_code_sizes[0].iter_mut().enumerate() {
            *s = match i {
                0..=143 => 8,
                144..=255 => 9,
                256..=279 => 7,
                _ => 8,
            };
        }
        self.huff_code_sizes[1][..32].fill(5);
        optimize_table(
            &self.huff_count[0],
            &mut self.huff_code_sizes[0],
            &mut self.huff_codes[0],
            288,
            15,
            true,
        );
        optimize_table(
            &self.huff_count[1],
            &mut self.huff_code_sizes[1],
            &mut self.huff_codes[1],
            32,
            15,
            true,
        );
        self.put_bits(1, 2);
    }

    fn start_dynamic_block(&mut self) {
        self.huff_count[0][256] = 1;
        optimize_table(
            &self.huff_count[0],
            &mut self.huff_code_sizes[0],
            &mut self.huff_codes[0],
            288,
            15,
            false,
        );
        optimize_table(
            &self.huff_count[1],
            &mut self.huff_code_sizes[1],
            &mut self.huff_codes[1],
            32,
            15,
            false,
        );

        let mut num_lit_codes = 286usize;
        while num_lit_codes > 257 && self.huff_code_sizes[0][num_lit_codes - 1] == 0 {
            num_lit_codes -= 1;
        }
        let mut num_dist_codes = 30usize;
        while num_dist_codes > 1 && self.huff_code_sizes[1][num_dist_codes - 1] == 0 {
            num_dist_codes -= 1;
        }

        let mut code_sizes_to_pack = [0u8; 288 + 32];
        code_sizes_to_pack[..num_lit_codes]
            .copy_from_slice(&self.huff_code_sizes[0][..num_lit_codes]);
        code_sizes_to_pack[num_lit_codes..num_lit_codes + num_dist_codes]
            .copy_from_slice(&self.huff_code_sizes[1][..num_dist_codes]);
        let total_to_pack = num_lit_codes + num_dist_codes;

        // RLE the combined length list with the 16/17/18 repeat codes
        fn pack_prev(
            rep: &mut u32,
            prev: u8,
            packed: &mut [u8],
            num_packed: &mut usize,
            counts: &mut [u16; MAX_HUFF_SYMBOLS],
        ) {
            let n = *rep;
            if n == 0 {
                return;
            }
            if n < 3 {
                counts[usize::from(prev)] += n as u16;
                for _ in 0..n {
                    packed[*num_packed] = prev;
                    *num_packed += 1;
                }
            } else {
                counts[16] += 1;
                packed[*num_packed] = 16;
                packed[*num_packed + 1] = (n - 3) as u8;
                *num_packed += 2;
            }
            *rep = 0;
        }
        fn pack_zeros(
            zeros: &mut u32,
            packed: &mut [u8],
            num_packed: &mut usize,
            counts: &mut [u16; MAX_HUFF_SYMBOLS],
        ) {
            let n = *zeros;
            if n == 0 {
                return;
            }
            if n < 3 {
                counts[0] += n as u16;
                for _ in 0..n {
                    packed[*num_packed] = 0;
                    *num_packed += 1;
                }
            } else if n <= 10 {
                counts[17] += 1;
                packed[*num_packed] = 17;
                packed[*num_packed + 1] = (n - 3) as u8;
                *num_packed += 2;
            } else {
                counts[18] += 1;
                packed[*num_packed] = 18;
                packed[*num_packed + 1] = (n - 11) as u8;
                *num_packed += 2;
            }
            *zeros = 0;
        }

        let mut packed = [0u8; 288 + 32];
        let mut num_packed = 0usize;
        let mut rle_z_count = 0u32;
        let mut rle_repeat_count = 0u32;
        let mut prev_code_size = 0xFFu8;
        self.huff_count[2] = [0; MAX_HUFF_SYMBOLS];
        for i in 0..total_to_pack {
            let code_size = code_sizes_to_pack[i];
            if code_size == 0 {
                pack_prev(
                    &mut rle_repeat_count,
                    prev_code_size,
                    &mut packed,
                    &mut num_packed,
                    &mut self.huff_count[2],
                );
                rle_z_count += 1;
                if rle_z_count == 138 {
                    pack_zeros(&mut rle_z_count, &mut packed, &mut num_packed, &mut self.huff_count[2]);
                }
            } else {
                pack_zeros(&mut rle_z_count, &mut packed, &mut num_packed, &mut self.huff_count[2]);
                if code_size != prev_code_size {
                    pack_prev(
                        &mut rle_repeat_count,
                        prev_code_size,
                        &mut packed,
                        &mut num_packed,
                        &mut self.huff_count[2],
                    );
                    self.huff_count[2][usize::from(code_size)] += 1;
                    packed[num_packed] = code_size;
                    num_packed += 1;
                } else {
                    rle_repeat_count += 1;
                    if rle_repeat_count == 6 {
                        pack_prev(
                            &mut rle_repeat_count,
                            prev_code_size,
                            &mut packed,
                            &mut num_packed,
                            &mut self.huff_count[2],
                        );
                    }
                }
            }
            prev_code_size = code_size;
        }
        if rle_repeat_count != 0 {
            pack_prev(
                &mut rle_repeat_count,
                prev_code_size,
                &mut packed,
                &mut num_packed,
                &mut self.huff_count[2],
            );
        } else {
            pack_zeros(&mut rle_z_count, &mut packed, &mut num_packed, &mut self.huff_count[2]);
        }

        optimize_table(
            &self.huff_count[2],
            &mut self.huff_code_sizes[2],
            &mut self.huff_codes[2],
            19,
            7,
            false,
        );

        self.put_bits(2, 2);
        self.put_bits((num_lit_codes - 257) as u32, 5);
        self.put_bits((num_dist_codes - 1) as u32, 5);

        let mut num_bit_lengths = 18i32;
        while num_bit_lengths >= 0
            && self.huff_code_sizes[2][usize::from(PRECODE_ORDER[num_bit_lengths as usize])] == 0
        {
            num_bit_lengths -= 1;
        }
        let num_bit_lengths = 4.max((num_bit_lengths + 1) as usize);
        self.put_bits((num_bit_lengths - 4) as u32, 4);
        for &slot in PRECODE_ORDER.iter().take(num_bit_lengths) {
            self.put_bits(u32::from(self.huff_code_sizes[2][usize::from(slot)]), 3);
        }

        let mut i = 0usize;
        while i < num_packed {
            let code = usize::from(packed[i]);
            i += 1;
            debug_assert!(code < 19);
            self.put_bits(
                u32::from(self.huff_codes[2][code]),
                u32::from(self.huff_code_sizes[2][code]),
            );
            if code >= 16 {
                self.put_bits(u32::from(packed[i]), [2, 3, 7][code - 16]);
                i += 1;
            }
        }
    }

    /// Emit the buffered LZ codes with the current code tables. False when
    /// the staging buffer would overflow (caller falls back to another block
    /// type).
    fn compress_lz_codes(&mut self) -> bool {
        let mut flags: u32 = 1;
        let mut i = 0usize;
        while i < self.lz_buf_pos {
            if flags == 1 {
                flags = u32::from(self.lz_code_buf[i]) | 0x100;
                i += 1;
            }
            if flags & 1 != 0 {
                let match_len = usize::from(self.lz_code_buf[i]);
                let match_dist =
                    usize::from(self.lz_code_buf[i + 1]) | (usize::from(self.lz_code_buf[i + 2]) << 8);
                i += 3;

                let lsym = usize::from(LEN_SYM[match_len]);
                debug_assert!(self.huff_code_sizes[0][lsym] != 0);
                self.put_bits(
                    u32::from(self.huff_codes[0][lsym]),
                    u32::from(self.huff_code_sizes[0][lsym]),
                );
                let len_extra = u32::from(LEN_EXTRA[match_len]);
                self.put_bits(match_len as u32 & ((1 << len_extra) - 1), len_extra);

                let (dist_sym, dist_extra) = if match_dist < 512 {
                    (SMALL_DIST_SYM[match_dist], SMALL_DIST_EXTRA[match_dist])
                } else {
                    (LARGE_DIST_SYM[match_dist >> 8], LARGE_DIST_EXTRA[match_dist >> 8])
                };
                let dist_sym = usize::from(dist_sym);
                let dist_extra = u32::from(dist_extra);
                debug_assert!(self.huff_code_sizes[1][dist_sym] != 0);
                self.put_bits(
                    u32::from(self.huff_codes[1][dist_sym]),
                    u32::from(self.huff_code_sizes[1][dist_sym]),
                );
                self.put_bits(match_dist as u32 & ((1 << dist_extra) - 1), dist_extra);
            } else {
                let lit = usize::from(self.lz_code_buf[i]);
                i += 1;
                debug_assert!(self.huff_code_sizes[0][lit] != 0);
                self.put_bits(
                    u32::from(self.huff_codes[0][lit]),
                    u32::from(self.huff_code_sizes[0][lit]),
                );
            }
            if self.out_buf_pos >= OUT_BUF_LIMIT {
                return false;
            }
            flags >>= 1;
        }
        self.put_bits(
            u32::from(self.huff_codes[0][256]),
            u32::from(self.huff_code_sizes[0][256]),
        );
        self.out_buf_pos < OUT_BUF_LIMIT
    }

    fn compress_block(&mut self, static_block: bool) -> bool {
        if static_block {
            self.start_static_block();
        } else {
            self.start_dynamic_block();
        }
        self.compress_lz_codes()
    }

    /// Close out the current LZ buffer as one block: dynamic, static or
    /// stored, whichever is smallest, then handle the flush mode. The block
    /// image is staged in `output_buf` for [`Self::flush_staged`] to drain.
    fn flush_block(&mut self, flush: FlushMode) {
        debug_assert_eq!(self.output_flush_remaining, 0);
        let block_in_dict =
            self.lookahead_pos - self.lz_code_buf_dict_pos <= self.dict_size;
        let use_raw_block = self.flags & FLAG_FORCE_ALL_RAW_BLOCKS != 0 && block_in_dict;

        self.out_buf_pos = 0;
        self.output_flush_ofs = 0;

        // finalize the partial flags byte; drop it entirely if unused
        self.lz_code_buf[self.lz_flags_pos] >>= self.num_flags_left % 8;
        if self.num_flags_left == 8 {
            self.lz_buf_pos -= 1;
        }

        if self.flags & FLAG_WRITE_ZLIB_HEADER != 0 && self.block_index == 0 {
            self.put_bits(0x78, 8);
            self.put_bits(0x01, 8);
        }
        self.put_bits(u32::from(flush == FlushMode::Finish), 1);

        let saved_out_pos = self.out_buf_pos;
        let saved_bit_buf = self.bit_buffer;
        let saved_bits_in = self.bits_in;

        let mut comp_success = false;
        if !use_raw_block {
            comp_success = self.compress_block(
                self.flags & FLAG_FORCE_ALL_STATIC_BLOCKS != 0 || self.total_lz_bytes < 48,
            );
        }

        let expanded = self.total_lz_bytes != 0
            && self.out_buf_pos - saved_out_pos + 1 >= self.total_lz_bytes;
        if (use_raw_block || expanded) && block_in_dict {
            self.out_buf_pos = saved_out_pos;
            self.bit_buffer = saved_bit_buf;
            self.bits_in = saved_bits_in;
            self.put_bits(0, 2);
            if self.bits_in != 0 {
                let pad = 8 - self.bits_in;
                self.put_bits(0, pad);
            }
            let len = self.total_lz_bytes as u32;
            self.put_bits(len & 0xFFFF, 16);
            self.put_bits((len ^ 0xFFFF) & 0xFFFF, 16);
            for i in 0..self.total_lz_bytes {
                let b = self.dict[(self.lz_code_buf_dict_pos + i) & LZ_DICT_SIZE_MASK];
                self.put_bits(u32::from(b), 8);
            }
        } else if !comp_success {
            self.out_buf_pos = saved_out_pos;
            self.bit_buffer = saved_bit_buf;
            self.bits_in = saved_bits_in;
            let ok = self.compress_block(true);
            debug_assert!(ok);
        }

        match flush {
            FlushMode::None => {}
            FlushMode::Finish => {
                if self.bits_in != 0 {
                    let pad = 8 - self.bits_in;
                    self.put_bits(0, pad);
                }
                if self.flags & FLAG_WRITE_ZLIB_HEADER != 0 {
                    let mut a = self.adler;
                    for _ in 0..4 {
                        self.put_bits((a >> 24) & 0xFF, 8);
                        a <<= 8;
                    }
                }
            }
            _ => {
                // sync point: empty stored block, byte-aligned
                self.put_bits(0, 3);
                if self.bits_in != 0 {
                    let pad = 8 - self.bits_in;
                    self.put_bits(0, pad);
                }
                self.put_bits(0, 16);
                self.put_bits(0xFFFF, 16);
            }
        }

        self.huff_count[0] = [0; MAX_HUFF_SYMBOLS];
        self.huff_count[1] = [0; MAX_HUFF_SYMBOLS];
        self.lz_buf_pos = 1;
        self.lz_flags_pos = 0;
        self.num_flags_left = 8;
        self.lz_code_buf_dict_pos += self.total_lz_bytes;
        self.total_lz_bytes = 0;
        self.block_index += 1;

        self.output_flush_remaining = self.out_buf_pos;
    }

    /// Drain staged block output into the caller's buffer.
    fn flush_staged(&mut self, out: &mut [u8], out_pos: &mut usize) {
        let n = self.output_flush_remaining.min(out.len() - *out_pos);
        out[*out_pos..*out_pos + n]
            .copy_from_slice(&self.output_buf[self.output_flush_ofs..self.output_flush_ofs + n]);
        *out_pos += n;
        self.output_flush_ofs += n;
        self.output_flush_remaining -= n;
        if self.output_flush_remaining == 0 {
            self.output_flush_ofs = 0;
        }
    }
}

fn compress_to_vec_inner(input: &[u8], flags: u32) -> Vec<u8> {
    let mut comp = Box::new(Compressor::new(flags));
    let mut output = vec![0u8; (input.len() / 2).max(128)];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    loop {
        let (status, consumed, produced) =
            comp.compress(&input[in_pos..], &mut output[out_pos..], FlushMode::Finish);
        in_pos += consumed;
        out_pos += produced;
        match status {
            CompressStatus::Done => {
                output.truncate(out_pos);
                return output;
            }
            CompressStatus::Okay => {
                if out_pos == output.len() {
                    let new_len = output.len() * 2;
                    output.resize(new_len, 0);
                }
            }
            // cannot happen when driving with slices and a Finish flush
            _ => unreachable!("deflate one-shot failed"),
        }
    }
}

/// Compress a whole buffer to a raw DEFLATE stream.
pub fn compress_to_vec(input: &[u8], level: u32) -> Vec<u8> {
    compress_to_vec_inner(
        input,
        create_comp_flags_from_zip_params(level, -15, CompressionStrategy::Default),
    )
}

/// Compress a whole buffer to a zlib-framed stream (RFC 1950).
pub fn compress_to_vec_zlib(input: &[u8], level: u32) -> Vec<u8> {
    compress_to_vec_inner(
        input,
        create_comp_flags_from_zip_params(level, 15, CompressionStrategy::Default),
    )
}
