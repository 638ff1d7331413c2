//! ANSI escape sequence stripping

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    /// Saw ESC, waiting for the introducer.
    Escape,
    /// Inside a CSI sequence, until a letter.
    Csi,
    /// Inside an OSC sequence, until BEL or ESC \.
    Osc,
    /// Saw ESC inside an OSC sequence.
    OscEscape,
    /// Saw ESC ( or ESC ), one designator byte left.
    Charset,
}

/// Streaming ANSI escape stripper.
///
/// Output arrives in arbitrary chunks, so a sequence may start in one read
/// and end in the next. The stripper keeps its position inside a sequence
/// between calls to [`AnsiStripper::strip`].
#[derive(Debug, Default, Clone)]
pub struct AnsiStripper {
    state: State,
}

impl AnsiStripper {
    /// Create a stripper in the ground state
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the escape sequences from one chunk
    pub fn strip(&mut self, data: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(data.len());

        for &byte in data {
            self.state = match (self.state, byte) {
                (State::Ground, ESC) => State::Escape,
                (State::Ground, _) => {
                    result.push(byte);
                    State::Ground
                }
                (State::Escape, b'[') => State::Csi,
                (State::Escape, b']') => State::Osc,
                (State::Escape, b'(' | b')') => State::Charset,
                (State::Escape, _) => State::Ground,
                (State::Csi, b) if b.is_ascii_alphabetic() => State::Ground,
                (State::Csi, _) => State::Csi,
                (State::Osc | State::OscEscape, BEL) => State::Ground,
                (State::Osc | State::OscEscape, ESC) => State::OscEscape,
                (State::OscEscape, b'\\') => State::Ground,
                (State::Osc | State::OscEscape, _) => State::Osc,
                (State::Charset, _) => State::Ground,
            };
        }

        result
    }
}

/// Strip ANSI escape sequences from a complete byte slice
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    AnsiStripper::new().strip(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strip_csi() {
        assert_eq!(strip_ansi(b"Hello \x1b[31mred\x1b[0m world"), b"Hello red world");
    }

    #[test]
    fn test_strip_osc() {
        assert_eq!(strip_ansi(b"Hello \x1b]0;Title\x07 world"), b"Hello  world");
        assert_eq!(strip_ansi(b"a\x1b]2;t\x1b\\b"), b"ab");
    }

    #[test]
    fn test_strip_charset() {
        assert_eq!(strip_ansi(b"\x1b(Bplain"), b"plain");
    }

    #[test]
    fn test_colored_prompt() {
        let prompt = b"\x1b[1;32muser\x1b[0m@box ~> ";
        assert_eq!(strip_ansi(prompt), b"user@box ~> ");
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut stripper = AnsiStripper::new();
        let mut out = stripper.strip(b"ok \x1b[3");
        assert_ne!(stripper.state, State::Ground);
        out.extend(stripper.strip(b"1mred\x1b"));
        assert_ne!(stripper.state, State::Ground);
        out.extend(stripper.strip(b"[0m done"));
        assert_eq!(stripper.state, State::Ground);
        assert_eq!(out, b"ok red done");
    }

    #[test]
    fn test_no_ansi() {
        assert_eq!(strip_ansi(b"Hello world\r\n"), b"Hello world\r\n");
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_result(
            data in proptest::collection::vec(
                prop_oneof![
                    Just(0x1bu8), Just(b'['), Just(b']'), Just(b'm'),
                    Just(0x07u8), Just(b'\\'), Just(b'('), Just(b'a'), Just(b'1'),
                ],
                0..64,
            ),
            split in 0usize..64,
        ) {
            let split = split.min(data.len());
            let mut stripper = AnsiStripper::new();
            let mut chunked = stripper.strip(&data[..split]);
            chunked.extend(stripper.strip(&data[split..]));
            prop_assert_eq!(chunked, strip_ansi(&data));
        }
    }
}
