/// Accumulates terminal bytes and hands back complete lines.
///
/// The terminal line discipline turns `\n` into `\r\n`; both forms are
/// accepted and the terminators are stripped.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
    }

    /// Complete lines received so far; a trailing fragment stays buffered.
    pub(crate) fn take_lines(&mut self) -> Vec<String> {
        let Some(last_nl) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_nl + 1);
        let mut complete = std::mem::replace(&mut self.partial, rest);
        complete.pop();
        complete.split(|b| *b == b'\n').map(decode).collect()
    }

    /// Whatever is left, terminated or not.
    pub(crate) fn flush(&mut self) -> Vec<String> {
        let mut lines = self.take_lines();
        if !self.partial.is_empty() {
            lines.push(decode(&self.partial));
            self.partial.clear();
        }
        lines
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_crlf_and_keeps_fragment() {
        let mut buf = LineBuffer::default();
        buf.push(b"MANDL1: Task MANDL (release of 31DEC24) begins\r\nMANDL1: Appears");
        assert_eq!(
            buf.take_lines(),
            vec!["MANDL1: Task MANDL (release of 31DEC24) begins".to_string()]
        );
        buf.push(b" to have ended successfully\r\n");
        assert_eq!(
            buf.take_lines(),
            vec!["MANDL1: Appears to have ended successfully".to_string()]
        );
        assert!(buf.take_lines().is_empty());
    }

    #[test]
    fn flush_returns_unterminated_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"a\nb\nc");
        assert_eq!(buf.flush(), vec!["a", "b", "c"]);
        assert!(buf.flush().is_empty());
    }

    #[test]
    fn empty_lines_survive() {
        let mut buf = LineBuffer::default();
        buf.push(b"\r\n\r\nx\n");
        assert_eq!(buf.take_lines(), vec!["", "", "x"]);
    }
}
