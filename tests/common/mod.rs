#![allow(dead_code)]

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::{Request, Respond, ResponseTemplate};

const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;

/// Builds small ZIP archives byte by byte, so tests control every field.
#[derive(Default)]
pub struct ZipBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    comment: Vec<u8>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(self, name: &str, data: &[u8], mode: u32) -> Self {
        self.raw(name, 0, 0, data, data, S_IFREG | mode)
    }

    pub fn deflated(self, name: &str, data: &[u8], mode: u32) -> Self {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        let compressed = enc.finish().unwrap();
        self.raw(name, 8, 0, &compressed, data, S_IFREG | mode)
    }

    pub fn dir(self, name: &str, mode: u32) -> Self {
        self.raw(name, 0, 0, b"", b"", S_IFDIR | mode)
    }

    /// Write sizes, offsets and counts through the ZIP64 structures: the
    /// classic fields hold their sentinels, the real values live in the
    /// 0x0001 extra field and the ZIP64 end record. Call before adding
    /// entries.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Append an entry with explicit method, flags and Unix `st_mode`.
    pub fn raw(
        mut self,
        name: &str,
        method: u16,
        flags: u16,
        payload: &[u8],
        uncompressed: &[u8],
        st_mode: u32,
    ) -> Self {
        let crc = crc32fast::hash(uncompressed);
        let lfh_offset = self.body.len() as u32;

        let body = &mut self.body;
        body.extend_from_slice(b"PK\x03\x04");
        put16(body, 20); // version needed
        put16(body, flags);
        put16(body, method);
        put16(body, 0); // time
        put16(body, 0x21); // date: 1980-01-01
        put32(body, crc);
        put32(body, payload.len() as u32);
        put32(body, uncompressed.len() as u32);
        put16(body, name.len() as u16);
        put16(body, 0); // extra length
        body.extend_from_slice(name.as_bytes());
        body.extend_from_slice(payload);

        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        put16(cd, 3 << 8 | 20); // made by: Unix
        put16(cd, 20);
        put16(cd, flags);
        put16(cd, method);
        put16(cd, 0);
        put16(cd, 0x21);
        put32(cd, crc);
        if self.zip64 {
            put32(cd, u32::MAX);
            put32(cd, u32::MAX);
        } else {
            put32(cd, payload.len() as u32);
            put32(cd, uncompressed.len() as u32);
        }
        put16(cd, name.len() as u16);
        put16(cd, if self.zip64 { 28 } else { 0 }); // extra length
        put16(cd, 0); // comment length
        put16(cd, 0); // disk number
        put16(cd, 0); // internal attributes
        put32(cd, st_mode << 16);
        put32(cd, if self.zip64 { u32::MAX } else { lfh_offset });
        cd.extend_from_slice(name.as_bytes());
        if self.zip64 {
            put16(cd, 0x0001);
            put16(cd, 24);
            put64(cd, uncompressed.len() as u64);
            put64(cd, payload.len() as u64);
            put64(cd, lfh_offset as u64);
        }

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.body;
        let cd_offset = out.len() as u64;
        let cd_size = self.central.len() as u64;
        out.extend_from_slice(&self.central);

        if self.zip64 {
            let record_offset = out.len() as u64;
            out.extend_from_slice(b"PK\x06\x06");
            put64(&mut out, 44); // size of the rest of the record
            put16(&mut out, 3 << 8 | 45); // made by
            put16(&mut out, 45); // version needed
            put32(&mut out, 0); // this disk
            put32(&mut out, 0); // disk with the central directory
            put64(&mut out, self.count as u64);
            put64(&mut out, self.count as u64);
            put64(&mut out, cd_size);
            put64(&mut out, cd_offset);

            out.extend_from_slice(b"PK\x06\x07");
            put32(&mut out, 0);
            put64(&mut out, record_offset);
            put32(&mut out, 1); // total disks
        }

        let (count, size, offset) = if self.zip64 {
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (self.count, cd_size as u32, cd_offset as u32)
        };
        out.extend_from_slice(b"PK\x05\x06");
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, count);
        put16(&mut out, count);
        put32(&mut out, size);
        put32(&mut out, offset);
        put16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }
}

fn put16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// The three-entry archive used by the end-to-end scenarios.
pub fn sample_archive() -> Vec<u8> {
    ZipBuilder::new()
        .file("a.txt", b"hello", 0o644)
        .file("dir/b.txt", b"", 0o600)
        .dir("dir/", 0o750)
        .finish()
}

/// Serves a byte buffer honouring `Range: bytes=a-b`, like a static file host.
pub struct RangeResponder {
    data: Arc<Vec<u8>>,
    /// Drop the last byte of every multi-byte range
    short: bool,
    /// Ignore `Range` and always answer 200 with the full body
    ignore_range: bool,
    /// Replaces the `Content-Range` value, given `(start, end, total)`,
    /// on every request after the first
    rewrite: Option<fn(usize, usize, usize) -> String>,
    served: AtomicUsize,
}

impl RangeResponder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            short: false,
            ignore_range: false,
            rewrite: None,
            served: AtomicUsize::new(0),
        }
    }

    pub fn short(mut self) -> Self {
        self.short = true;
        self
    }

    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    /// Answer the first request honestly, then lie in `Content-Range`.
    pub fn rewriting_after_first(mut self, rewrite: fn(usize, usize, usize) -> String) -> Self {
        self.rewrite = Some(rewrite);
        self
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.data.len();
        let nth = self.served.fetch_add(1, Ordering::Relaxed);
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split_once('-'))
            .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)));

        let (start, end) = match range {
            Some(r) if !self.ignore_range => r,
            _ => return ResponseTemplate::new(200).set_body_bytes(self.data.as_slice()),
        };
        if start >= total {
            return ResponseTemplate::new(416)
                .insert_header("Content-Range", format!("bytes */{total}").as_str());
        }

        let end = end.min(total - 1);
        let mut body = self.data[start..=end].to_vec();
        if self.short && body.len() > 1 {
            body.pop();
        }
        let content_range = match self.rewrite {
            Some(rewrite) if nth > 0 => rewrite(start, end, total),
            _ => format!("bytes {start}-{end}/{total}"),
        };
        ResponseTemplate::new(206)
            .insert_header("Content-Range", content_range.as_str())
            .set_body_bytes(body)
    }
}
