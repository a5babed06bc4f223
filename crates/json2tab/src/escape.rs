//! Decoder for `\uXXXX` escape sequences, including surrogate pairs.
//!
//! Four ASCII hex digits are accumulated into a code unit. Code units in the
//! high-surrogate range are held back until the low half of the pair arrives
//! as a second `\uXXXX` sequence; anything else decodes directly to a
//! [`char`].

/// Outcome of feeding one hex digit into the decoder.
pub(crate) enum EscapeStep {
    /// More digits are required to finish the current code unit.
    NeedMore,
    /// A full character was decoded.
    Char(char),
    /// A high surrogate was read; the next escape must supply the low half.
    HighSurrogate,
}

#[derive(Debug, Default)]
pub(crate) struct EscapeDecoder {
    acc: u32,
    len: u8,
    pending_high: Option<u32>,
}

impl EscapeDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Discard any partially accumulated digits. A pending high surrogate is
    /// kept; it is still waiting for its low half.
    pub(crate) fn reset_digits(&mut self) {
        self.acc = 0;
        self.len = 0;
    }

    /// True while a high surrogate awaits its matching low surrogate.
    pub(crate) fn awaiting_low_surrogate(&self) -> bool {
        self.pending_high.is_some()
    }

    #[inline]
    fn hex_val(c: char) -> Option<u32> {
        c.to_digit(16)
    }

    /// Feed one ASCII hex digit. Errors carry a message for the caller to
    /// wrap with source position information.
    pub(crate) fn feed(&mut self, c: char) -> Result<EscapeStep, String> {
        let digit =
            Self::hex_val(c).ok_or_else(|| format!("invalid unicode escape character {c:?}"))?;

        self.acc = (self.acc << 4) | digit;
        self.len += 1;
        if self.len < 4 {
            return Ok(EscapeStep::NeedMore);
        }

        let unit = self.acc;
        self.reset_digits();

        if let Some(high) = self.pending_high.take() {
            if (0xDC00..=0xDFFF).contains(&unit) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                return char::from_u32(code)
                    .map(EscapeStep::Char)
                    .ok_or_else(|| format!("invalid surrogate pair {high:04X} {unit:04X}"));
            }
            return Err(format!("unpaired surrogate \\u{high:04X}"));
        }

        if (0xD800..=0xDBFF).contains(&unit) {
            self.pending_high = Some(unit);
            return Ok(EscapeStep::HighSurrogate);
        }
        if (0xDC00..=0xDFFF).contains(&unit) {
            return Err(format!("unpaired surrogate \\u{unit:04X}"));
        }

        char::from_u32(unit)
            .map(EscapeStep::Char)
            .ok_or_else(|| format!("invalid unicode escape \\u{unit:04X}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{EscapeDecoder, EscapeStep};

    fn feed_all(dec: &mut EscapeDecoder, digits: &str) -> Result<EscapeStep, String> {
        let mut last = Ok(EscapeStep::NeedMore);
        for c in digits.chars() {
            last = dec.feed(c);
        }
        last
    }

    #[test]
    fn basic_decoding() {
        let mut dec = EscapeDecoder::new();
        assert!(matches!(feed_all(&mut dec, "0041"), Ok(EscapeStep::Char('A'))));
    }

    #[test]
    fn mixed_case_hex() {
        let mut dec = EscapeDecoder::new();
        match feed_all(&mut dec, "AbCd") {
            Ok(EscapeStep::Char(c)) => assert_eq!(c as u32, 0xABCD),
            _ => panic!("expected decoded char"),
        }
    }

    #[test]
    fn surrogate_pair() {
        let mut dec = EscapeDecoder::new();
        assert!(matches!(
            feed_all(&mut dec, "D83D"),
            Ok(EscapeStep::HighSurrogate)
        ));
        assert!(dec.awaiting_low_surrogate());
        match feed_all(&mut dec, "DE00") {
            Ok(EscapeStep::Char(c)) => assert_eq!(c, '\u{1F600}'),
            _ => panic!("expected decoded char"),
        }
    }

    #[test]
    fn lone_low_surrogate_errors() {
        let mut dec = EscapeDecoder::new();
        assert!(feed_all(&mut dec, "DC00").is_err());
    }

    #[test]
    fn high_surrogate_followed_by_bmp_char_errors() {
        let mut dec = EscapeDecoder::new();
        assert!(matches!(
            feed_all(&mut dec, "D800"),
            Ok(EscapeStep::HighSurrogate)
        ));
        assert!(feed_all(&mut dec, "0041").is_err());
    }

    #[test]
    fn invalid_hex_errors() {
        let mut dec = EscapeDecoder::new();
        assert!(dec.feed('G').is_err());
    }
}
