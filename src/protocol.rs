//! Wire framing: newline-terminated, `;`-delimited records with no
//! escaping (§6). NS replies end with the literal marker `__END__\n`, SS
//! replies with `__SS_END__\n`.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const NS_END: &str = "__END__\n";
pub const SS_END: &str = "__SS_END__\n";

/// A single `VERB;arg1;arg2;...` command frame, already split on `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub verb: String,
    pub args: Vec<String>,
}

impl Frame {
    pub fn parse(line: &str) -> Option<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }
        let mut parts = line.split(';');
        let verb = parts.next()?.to_string();
        let args = parts.map(str::to_string).collect();
        Some(Frame { verb, args })
    }

    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(String::as_str)
    }
}

/// A field containing the record delimiter or the frame terminator would
/// desynchronize the protocol; reject it at the edge rather than guess at
/// an escaping scheme (open question in §9, resolved in SPEC_FULL §E.4).
pub fn validate_field(value: &str) -> Result<(), String> {
    if value.contains(';') || value.contains('\n') {
        return Err(format!("field '{value}' contains an unsafe delimiter character"));
    }
    Ok(())
}

/// Read one line from a buffered async reader, returning `None` on a clean
/// EOF before any bytes were read.
pub async fn read_line<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Read raw bytes until `marker` has been seen in the stream, then strip
/// it (and anything after it) from the returned buffer. Used for SS
/// payload reads (`SS_READ`/`SS_STREAM`) where the body is not
/// line-framed.
pub async fn read_until_marker<R>(
    reader: &mut BufReader<R>,
    marker: &str,
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let marker = marker.as_bytes();
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
        if buf.len() >= marker.len() && &buf[buf.len() - marker.len()..] == marker {
            buf.truncate(buf.len() - marker.len());
            break;
        }
    }
    Ok(buf)
}

/// Write a payload followed by the end-of-response marker in one call.
pub async fn write_response<W>(writer: &mut W, payload: &str, marker: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload.as_bytes()).await?;
    if !payload.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.write_all(marker.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verb_and_args() {
        let f = Frame::parse("WRITE;notes.txt;0\n").unwrap();
        assert_eq!(f.verb, "WRITE");
        assert_eq!(f.args, vec!["notes.txt", "0"]);
    }

    #[test]
    fn parses_verb_with_no_args() {
        let f = Frame::parse("LIST_USERS\n").unwrap();
        assert_eq!(f.verb, "LIST_USERS");
        assert!(f.args.is_empty());
    }

    #[test]
    fn empty_line_is_none() {
        assert!(Frame::parse("\n").is_none());
    }

    #[test]
    fn rejects_unsafe_fields() {
        assert!(validate_field("plain").is_ok());
        assert!(validate_field("has;semicolon").is_err());
        assert!(validate_field("has\nnewline").is_err());
    }

    #[tokio::test]
    async fn reads_until_marker() {
        let data = b"hello world__SS_END__".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let got = read_until_marker(&mut reader, SS_END).await.unwrap();
        assert_eq!(got, b"hello world");
    }
}
