use crate::errors::{Error, ParseError};
use memchr::memchr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Buffered read half of a connection.
pub(crate) type Reader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Reads one line into `line`, without its `\n` and an optional `\r`
/// before it.
///
/// Returns `false` if the stream ended before any byte of the line. A
/// final line cut off by end of stream is returned as is.
pub(crate) async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>, limit: usize) -> Result<bool, Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    line.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(false);
            }
            break;
        }

        let (taken, done) = match memchr(b'\n', available) {
            Some(pos) => (pos, true),
            None => (available.len(), false),
        };

        // one extra byte for a trailing `\r`
        if line.len() + taken > limit + 1 {
            return Err(ParseError::LineTooLong.into());
        }
        line.extend_from_slice(&available[..taken]);
        reader.consume(taken + usize::from(done));

        if done {
            break;
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > limit {
        return Err(ParseError::LineTooLong.into());
    }

    Ok(true)
}

/// [`read_line`] for the request head, which must be UTF-8.
pub(crate) async fn read_str_line<'b, R>(
    reader: &mut R,
    line: &'b mut Vec<u8>,
    limit: usize,
) -> Result<Option<&'b str>, Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    if !read_line(reader, line, limit).await? {
        return Ok(None);
    }

    simdutf8::basic::from_utf8(line)
        .map(Some)
        .map_err(|_| ParseError::InvalidEncoding.into())
}

#[cfg(test)]
mod reader_tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn lines(src: &str, capacity: usize, limit: usize) -> Result<Vec<String>, Error> {
        let mut reader = BufReader::with_capacity(capacity, Cursor::new(src.as_bytes().to_vec()));
        let mut line = Vec::new();
        let mut out = Vec::new();

        while read_line(&mut reader, &mut line, limit).await? {
            out.push(String::from_utf8(line.clone()).unwrap());
        }

        Ok(out)
    }

    #[tokio::test]
    async fn splits_lines() {
        #[rustfmt::skip]
        let cases = [
            ("a\r\nb\r\n\r\n", vec!["a", "b", ""]),
            ("a\nb\n",         vec!["a", "b"]),
            ("tail",           vec!["tail"]),
            ("x\r\ntail\r",    vec!["x", "tail"]),
            ("",               vec![]),
        ];

        for (src, expected) in cases {
            for capacity in [1, 2, 3, 64] {
                assert_eq!(lines(src, capacity, 64).await.unwrap(), expected, "{src:?}/{capacity}");
            }
        }
    }

    #[tokio::test]
    async fn enforces_limit() {
        for capacity in [1, 4, 64] {
            assert_eq!(lines("12345\r\n", capacity, 5).await.unwrap(), ["12345"]);
            assert_eq!(
                lines("123456\r\n", capacity, 5).await,
                Err(Error::Parse(ParseError::LineTooLong))
            );
        }
    }

    #[tokio::test]
    async fn rejects_invalid_utf8() {
        let mut reader = Cursor::new(b"GET /\xff HTTP/1.1\r\n".to_vec());
        let mut line = Vec::new();

        assert_eq!(
            read_str_line(&mut reader, &mut line, 64).await,
            Err(Error::Parse(ParseError::InvalidEncoding))
        );
    }
}
