use super::{EncodeError, HimgEncodeContext, WriteIoSnafu};
use snafu::ResultExt;
use std::io::Write;

impl HimgEncodeContext {
    /// Encodes interleaved 8-bit `pixels` and writes the stream to `w`.
    ///
    /// The stream is assembled in memory first, since the container needs its final size up
    /// front. Returns the number of bytes written.
    pub fn encode<W: Write>(
        &self,
        width: u32,
        height: u32,
        num_channels: u8,
        pixels: &[u8],
        mut w: W,
    ) -> Result<usize, EncodeError> {
        let mut buf = Vec::new();
        let len = self.encode_to_vec(width, height, num_channels, pixels, &mut buf)?;
        w.write_all(&buf).context(WriteIoSnafu)?;
        w.flush().context(WriteIoSnafu)?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_the_same_stream() {
        let ctx = HimgEncodeContext::new(75).unwrap();
        let pixels = (0..16 * 16 * 3).map(|i| (i % 251) as u8).collect::<Vec<_>>();

        let mut in_memory = vec![];
        ctx.encode_to_vec(16, 16, 3, &pixels, &mut in_memory).unwrap();

        let mut written = vec![];
        let len = ctx.encode(16, 16, 3, &pixels, &mut written).unwrap();
        assert_eq!(len, written.len());
        assert_eq!(written, in_memory);
    }

    #[test]
    fn reports_io_errors() {
        let ctx = HimgEncodeContext::new(75).unwrap();
        let err = ctx.encode(1, 1, 1, &[9], FailingWriter).unwrap_err();
        assert!(matches!(err, EncodeError::WriteIo { .. }));
    }
}
