use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr2;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::telnet::IacFilter;

pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Reads telnet input one line at a time.
///
/// IAC sequences are removed before line splitting, so a negotiation that
/// arrives mid-line never ends up in the text. Any of `\n`, `\r`, `\r\n` and
/// `\r\0` ends a line.
#[derive(Debug)]
pub struct TelnetLineReader<R> {
    inner: R,
    iac: IacFilter,
    raw: BytesMut,
    data: BytesMut,
    replies: BytesMut,
    // Previous line ended with `\r`; swallow a following `\n` or `\0`.
    after_cr: bool,
    max_line_len: usize,
}

impl<R> TelnetLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            iac: IacFilter::new(),
            raw: BytesMut::with_capacity(4 * 1024),
            data: BytesMut::with_capacity(4 * 1024),
            replies: BytesMut::new(),
            after_cr: false,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    /// Negotiation refusals produced since the last call, if any.
    pub fn take_replies(&mut self) -> Option<Bytes> {
        if self.replies.is_empty() {
            None
        } else {
            Some(self.replies.split().freeze())
        }
    }

    fn pop_line(&mut self) -> std::io::Result<Option<String>> {
        if self.after_cr {
            match self.data.first() {
                Some(b'\n' | b'\0') => {
                    self.data.advance(1);
                    self.after_cr = false;
                }
                Some(_) => self.after_cr = false,
                None => return Ok(None),
            }
        }

        let Some(i) = memchr2(b'\n', b'\r', &self.data) else {
            return Ok(None);
        };
        if i > self.max_line_len {
            return Err(line_too_long());
        }
        let raw = self.data.split_to(i + 1);
        self.after_cr = raw[i] == b'\r';
        Ok(Some(String::from_utf8_lossy(&raw[..i]).into_owned()))
    }
}

impl<R: AsyncRead + Unpin> TelnetLineReader<R> {
    /// Read one line without its terminator.
    ///
    /// Returns:
    /// - `Ok(Some(line))` for a line (may be empty),
    /// - `Ok(None)` once the peer has closed and nothing is buffered.
    ///
    /// Text left without a terminator at end of stream is returned as a final
    /// line. Invalid UTF-8 is replaced, not rejected.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.pop_line()? {
                return Ok(Some(line));
            }

            if self.data.len() > self.max_line_len {
                return Err(line_too_long());
            }

            self.raw.clear();
            let n = self.inner.read_buf(&mut self.raw).await?;
            if n == 0 {
                if self.data.is_empty() {
                    return Ok(None);
                }
                let rest = self.data.split();
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
            self.iac.feed(&self.raw, &mut self.data, &mut self.replies);
        }
    }
}

fn line_too_long() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long")
}
