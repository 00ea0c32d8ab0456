//! Line framing helpers.

use bytes::{BufMut, Bytes, BytesMut};

/// Strip a trailing `\n` or `\r\n` from a raw line.
///
/// A line without a terminator (the last one before EOF) is returned as is.
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Render a text line with its `\n` terminator, ready to be written.
pub fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Check whether user input matches one of the session-ending sentinels.
///
/// Comparison ignores ASCII case and surrounding whitespace.
pub fn is_sentinel<S: AsRef<str>>(input: &str, sentinels: &[S]) -> bool {
    let input = input.trim();
    sentinels
        .iter()
        .any(|s| input.eq_ignore_ascii_case(s.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending(b"hello\n"), b"hello");
        assert_eq!(strip_line_ending(b"hello\r\n"), b"hello");
        assert_eq!(strip_line_ending(b"hello"), b"hello");
        assert_eq!(strip_line_ending(b"\n"), b"");
        // Only one terminator is removed
        assert_eq!(strip_line_ending(b"a\n\n"), b"a\n");
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(&encode_line("Servidor: Mensaje recibido")[..], b"Servidor: Mensaje recibido\n");
        assert_eq!(&encode_line("")[..], b"\n");
    }

    #[test]
    fn test_is_sentinel() {
        let sentinels = ["exit", "salir"];
        assert!(is_sentinel("exit", &sentinels));
        assert!(is_sentinel("EXIT", &sentinels));
        assert!(is_sentinel("Salir\n", &sentinels));
        assert!(is_sentinel("  salir  ", &sentinels));
        assert!(!is_sentinel("exiting", &sentinels));
        assert!(!is_sentinel("", &sentinels));
        assert!(!is_sentinel("exit", &[] as &[&str]));
    }
}
