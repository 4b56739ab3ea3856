//! RIFF container reading and writing.
//!
//! ```plain
//! .- RIFF ---------------------------------------------------------------.
//! | "RIFF" | u32le size | "HIMG" | chunk | chunk | ...                    |
//! `----------------------------------------------------------------------`
//! .- chunk -----------------------------------------------------------------.
//! | tag (4 bytes) | u32le length | payload (length bytes) | pad if odd      |
//! `-------------------------------------------------------------------------`
//! ```
//!
//! `size` counts everything after the size field, i.e. the form type and all chunks.

use crate::consts::{TAG_HIMG, TAG_RIFF};
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;
use snafu::{ensure, Snafu};

const CHUNK_HEADER_SIZE: usize = 8;
const RIFF_HEADER_SIZE: usize = 12;

/// A chunk tag, printed as text where possible.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

#[derive(Debug, Snafu)]
pub enum ContainerError {
    #[snafu(display("stream is {len} bytes, too short for a RIFF header"))]
    TruncatedHeader { len: usize },
    #[snafu(display("not a HIMG stream (tags {riff} / {form})"))]
    InvalidMagic { riff: FourCc, form: FourCc },
    #[snafu(display("RIFF size {declared} exceeds the {available} bytes available"))]
    TruncatedStream { declared: usize, available: usize },
    #[snafu(display("chunk {tag} declares {declared} bytes, {available} available"))]
    TruncatedChunk {
        tag: FourCc,
        declared: usize,
        available: usize,
    },
    #[snafu(display("{available} stray bytes where a chunk header was expected"))]
    TruncatedChunkHeader { available: usize },
    #[snafu(display("required chunk {tag} not found"))]
    MissingChunk { tag: FourCc },
    #[snafu(display("payload of {len} bytes does not fit into a chunk"))]
    PayloadTooLarge { len: usize },
}

impl ContainerError {
    /// Whether the error is caused by the stream ending early.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            ContainerError::TruncatedHeader { .. }
                | ContainerError::TruncatedStream { .. }
                | ContainerError::TruncatedChunk { .. }
                | ContainerError::TruncatedChunkHeader { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub payload: &'a [u8],
}

/// Forward-only reader over the chunks of a HIMG stream.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    /// Checks the RIFF header and the declared size.
    ///
    /// Bytes after the declared end of the RIFF chunk are ignored.
    pub fn new(data: &'a [u8]) -> Result<Self, ContainerError> {
        ensure!(
            data.len() >= RIFF_HEADER_SIZE,
            TruncatedHeaderSnafu { len: data.len() }
        );

        let riff = [data[0], data[1], data[2], data[3]];
        let form = [data[8], data[9], data[10], data[11]];
        ensure!(
            riff == TAG_RIFF && form == TAG_HIMG,
            InvalidMagicSnafu {
                riff: FourCc(riff),
                form: FourCc(form),
            }
        );

        let declared = LittleEndian::read_u32(&data[4..8]) as usize;
        let available = data.len() - CHUNK_HEADER_SIZE;
        ensure!(
            (4..=available).contains(&declared),
            TruncatedStreamSnafu {
                declared,
                available,
            }
        );

        Ok(Self {
            body: &data[RIFF_HEADER_SIZE..CHUNK_HEADER_SIZE + declared],
            pos: 0,
        })
    }

    /// Skips forward to the next chunk tagged `tag` and returns its payload.
    pub fn find(&mut self, tag: [u8; 4]) -> Result<&'a [u8], ContainerError> {
        for chunk in self.by_ref() {
            let chunk = chunk?;
            if chunk.tag == tag {
                return Ok(chunk.payload);
            }
            tracing::trace!(tag = %FourCc(chunk.tag), "skipping chunk");
        }

        MissingChunkSnafu { tag: FourCc(tag) }.fail()
    }

    fn read_chunk(&mut self) -> Result<Chunk<'a>, ContainerError> {
        let rest = &self.body[self.pos..];
        ensure!(
            rest.len() >= CHUNK_HEADER_SIZE,
            TruncatedChunkHeaderSnafu {
                available: rest.len(),
            }
        );

        let tag = [rest[0], rest[1], rest[2], rest[3]];
        let declared = LittleEndian::read_u32(&rest[4..8]) as usize;
        let available = rest.len() - CHUNK_HEADER_SIZE;
        ensure!(
            declared <= available,
            TruncatedChunkSnafu {
                tag: FourCc(tag),
                declared,
                available,
            }
        );

        let payload = &rest[CHUNK_HEADER_SIZE..][..declared];
        // A missing pad byte after the last chunk is tolerated.
        let padded = (declared + (declared & 1)).min(available);
        self.pos += CHUNK_HEADER_SIZE + padded;

        Ok(Chunk { tag, payload })
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.body.len() {
            return None;
        }

        let chunk = self.read_chunk();
        if chunk.is_err() {
            self.pos = self.body.len();
        }
        Some(chunk)
    }
}

/// Appends a RIFF stream to a vector, one chunk at a time.
pub struct ContainerWriter<'a> {
    out: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> ContainerWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        let start = out.len();
        out.extend_from_slice(&TAG_RIFF);
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&TAG_HIMG);
        Self { out, start }
    }

    pub fn write_chunk(&mut self, tag: [u8; 4], payload: &[u8]) -> Result<(), ContainerError> {
        self.write_chunk_with(tag, |out| out.extend_from_slice(payload))
    }

    /// Writes a chunk whose payload is appended to the output by `f`.
    pub fn write_chunk_with(
        &mut self,
        tag: [u8; 4],
        f: impl FnOnce(&mut Vec<u8>),
    ) -> Result<(), ContainerError> {
        let header = self.out.len();
        self.out.extend_from_slice(&tag);
        self.out.extend_from_slice(&[0; 4]);

        f(self.out);

        let len = self.out.len() - header - CHUNK_HEADER_SIZE;
        let Ok(declared) = u32::try_from(len) else {
            self.out.truncate(header);
            return PayloadTooLargeSnafu { len }.fail();
        };
        LittleEndian::write_u32(&mut self.out[header + 4..header + 8], declared);

        if len & 1 == 1 {
            self.out.push(0);
        }

        Ok(())
    }

    /// Patches the RIFF size and returns the number of bytes written.
    pub fn finish(self) -> Result<usize, ContainerError> {
        let len = self.out.len() - self.start;
        let Ok(declared) = u32::try_from(len - CHUNK_HEADER_SIZE) else {
            return PayloadTooLargeSnafu { len }.fail();
        };
        LittleEndian::write_u32(&mut self.out[self.start + 4..self.start + 8], declared);

        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> Vec<u8> {
        let mut out = vec![];
        let mut writer = ContainerWriter::new(&mut out);
        writer.write_chunk(*b"AAAA", &[1, 2, 3]).unwrap();
        writer.write_chunk(*b"junk", &[]).unwrap();
        writer.write_chunk(*b"BBBB", &[4, 5]).unwrap();
        let len = writer.finish().unwrap();
        assert_eq!(len, out.len());
        out
    }

    #[test]
    fn layout() {
        let data = sample_stream();
        assert_eq!(
            data,
            [
                b'R', b'I', b'F', b'F', 34, 0, 0, 0, b'H', b'I', b'M', b'G', //
                b'A', b'A', b'A', b'A', 3, 0, 0, 0, 1, 2, 3, 0, //
                b'j', b'u', b'n', b'k', 0, 0, 0, 0, //
                b'B', b'B', b'B', b'B', 2, 0, 0, 0, 4, 5,
            ]
        );
        assert!(crate::is_himg(&data));
    }

    #[test]
    fn find_skips_unknown_chunks() {
        let data = sample_stream();
        let mut reader = ChunkReader::new(&data).unwrap();
        assert_eq!(reader.find(*b"BBBB").unwrap(), &[4, 5]);

        let mut reader = ChunkReader::new(&data).unwrap();
        assert_eq!(reader.find(*b"AAAA").unwrap(), &[1, 2, 3]);
        assert_eq!(reader.find(*b"BBBB").unwrap(), &[4, 5]);
        // scanning is forward only
        assert!(matches!(
            reader.find(*b"AAAA"),
            Err(ContainerError::MissingChunk { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = sample_stream();
        data.extend_from_slice(b"garbage");
        let chunks = ChunkReader::new(&data)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn rejects_bad_headers() {
        let data = sample_stream();
        assert!(matches!(
            ChunkReader::new(&data[..11]),
            Err(ContainerError::TruncatedHeader { len: 11 })
        ));
        assert!(matches!(
            ChunkReader::new(&data[..data.len() - 1]),
            Err(ContainerError::TruncatedStream { .. })
        ));

        let mut bad = data.clone();
        bad[8..12].copy_from_slice(b"WAVE");
        let err = ChunkReader::new(&bad).unwrap_err();
        assert_eq!(err.to_string(), "not a HIMG stream (tags RIFF / WAVE)");
    }

    #[test]
    fn rejects_truncated_chunks() {
        let mut data = sample_stream();
        // claim more payload than there is
        data[16] = 200;
        let mut reader = ChunkReader::new(&data).unwrap();
        let err = reader.find(*b"BBBB").unwrap_err();
        assert!(err.is_truncation());
        assert!(reader.next().is_none());

        let mut data = sample_stream();
        data.truncate(data.len() - 4);
        data[4] -= 4;
        let mut reader = ChunkReader::new(&data).unwrap();
        assert!(matches!(
            reader.find(*b"BBBB"),
            Err(ContainerError::TruncatedChunkHeader { available: 6 })
        ));
    }

    #[test]
    fn fourcc_display() {
        assert_eq!(FourCc(*b"FRES").to_string(), "FRES");
        assert_eq!(FourCc([0, b'a', b' ', 0xff]).to_string(), "\\x00a \\xff");
    }
}
