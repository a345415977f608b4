//! Streaming UTF-8 decoder driven by a byte-class transition table.
//!
//! Bytes are mapped to one of twelve classes, and the class selects the next
//! state from [`STATES`]. State `0` means a whole code point was consumed,
//! state `12` is terminal rejection. Sequences may be split across
//! [`Utf8Decoder::push`] calls. Nothing is ever replaced with U+FFFD.

const ACCEPT: u8 = 0;
const REJECT: u8 = 12;

#[rustfmt::skip]
const TYPES: [u8; 256] = [
    //0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 0x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 1x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 2x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 3x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 4x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 5x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 6x
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 7x
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 8x
    9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, // 9x
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // Ax
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // Bx
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // Cx
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // Dx
   10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3, // Ex
   11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, // Fx
];

#[rustfmt::skip]
const STATES: [u8; 108] = [
    // class: 0   1   2   3   4   5   6   7   8   9  10  11
     0, 12, 24, 36, 60, 96, 84, 12, 12, 12, 48, 72, // accept
    12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, // reject
    12,  0, 12, 12, 12, 12, 12,  0, 12,  0, 12, 12, // 1 continuation left
    12, 24, 12, 12, 12, 12, 12, 24, 12, 24, 12, 12, // 2 continuations left
    12, 12, 12, 12, 12, 12, 12, 24, 12, 12, 12, 12, // after E0: A0..BF
    12, 24, 12, 12, 12, 12, 12, 12, 12, 24, 12, 12, // after ED: 80..9F
    12, 12, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12, // after F0: 90..BF
    12, 36, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12, // after F1..F3
    12, 36, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, // after F4: 80..8F
];

/// Decoding failure; the decoder never recovers from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Utf8Error {
    /// An ill-formed byte at the given offset of the whole input.
    #[error("invalid UTF-8 byte 0x{byte:02x} at offset {offset}")]
    Invalid { offset: usize, byte: u8 },
    /// The input ended in the middle of a multi-byte sequence.
    #[error("truncated UTF-8 sequence")]
    Incomplete,
}

/// Incremental byte → text decoder.
///
/// # Examples
/// ```
/// use sluice::utf8::Utf8Decoder;
///
/// let mut decoder = Utf8Decoder::new();
/// decoder.push(&[0xE2, 0x82]).unwrap(); // first two bytes of '€'
/// decoder.push(&[0xAC, b'!']).unwrap();
/// assert_eq!(decoder.finish().unwrap(), "€!");
/// ```
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    state: u8,
    codepoint: u32,
    consumed: usize,
    out: String,
}

impl Utf8Decoder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes. After an error the decoder stays rejected.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), Utf8Error> {
        for &byte in bytes {
            if self.state == REJECT {
                return Err(Utf8Error::Invalid {
                    offset: self.consumed,
                    byte,
                });
            }

            let class = TYPES[byte as usize];
            self.codepoint = match self.state {
                ACCEPT => (0xff_u32 >> class) & byte as u32,
                _ => (byte as u32 & 0x3f) | (self.codepoint << 6),
            };
            self.state = STATES[(self.state + class) as usize];

            match self.state {
                ACCEPT => {
                    let ch = char::from_u32(self.codepoint).ok_or(Utf8Error::Invalid {
                        offset: self.consumed,
                        byte,
                    })?;
                    self.out.push(ch);
                }
                REJECT => {
                    return Err(Utf8Error::Invalid {
                        offset: self.consumed,
                        byte,
                    })
                }
                _ => {}
            }
            self.consumed += 1;
        }

        Ok(())
    }

    /// `true` when no multi-byte sequence is pending.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == ACCEPT
    }

    /// Consumes the decoder, failing if a sequence was left unfinished.
    #[inline]
    pub fn finish(self) -> Result<String, Utf8Error> {
        match self.state {
            ACCEPT => Ok(self.out),
            _ => Err(Utf8Error::Incomplete),
        }
    }
}

/// Decodes a complete byte sequence.
#[inline]
pub fn decode(bytes: &[u8]) -> Result<String, Utf8Error> {
    let mut decoder = Utf8Decoder::new();
    decoder.push(bytes)?;
    decoder.finish()
}

#[cfg(test)]
mod utf8_tests {
    use super::*;

    #[test]
    fn valid() {
        let cases = ["", "plain ascii", "ü", "€uro", "日本語", "🦀 crab", "\u{10FFFF}", "\u{D7FF}\u{E000}"];

        for text in cases {
            assert_eq!(decode(text.as_bytes()).as_deref(), Ok(text));
        }
    }

    #[test]
    fn invalid() {
        #[rustfmt::skip]
        let cases: [(&[u8], usize); 10] = [
            (&[0x80], 0),                   // lone continuation
            (&[b'a', 0xBF], 1),             // lone continuation after ascii
            (&[0xC0, 0x80], 0),             // overlong NUL
            (&[0xC1, 0xBF], 0),             // overlong
            (&[0xE0, 0x80, 0x80], 1),       // overlong 3-byte
            (&[0xED, 0xA0, 0x80], 1),       // surrogate U+D800
            (&[0xF0, 0x80, 0x80, 0x80], 1), // overlong 4-byte
            (&[0xF4, 0x90, 0x80, 0x80], 1), // above U+10FFFF
            (&[0xF5, 0x80], 0),             // never valid
            (&[0xE2, b'a'], 1),             // missing continuation
        ];

        for (bytes, offset) in cases {
            match decode(bytes) {
                Err(Utf8Error::Invalid { offset: at, .. }) => assert_eq!(at, offset, "{bytes:x?}"),
                other => panic!("{bytes:x?} decoded as {other:?}"),
            }
        }
    }

    #[test]
    fn truncated() {
        for bytes in [&[0xE2, 0x82][..], &[0xF0, 0x9F, 0xA6], &[0xC3]] {
            assert_eq!(decode(bytes), Err(Utf8Error::Incomplete));
        }
    }

    #[test]
    fn split_across_pushes() {
        let text = "a€🦀ü";
        let bytes = text.as_bytes();

        for split in 0..=bytes.len() {
            let mut decoder = Utf8Decoder::new();
            decoder.push(&bytes[..split]).unwrap();
            decoder.push(&bytes[split..]).unwrap();
            assert!(decoder.is_complete());
            assert_eq!(decoder.finish().unwrap(), text);
        }
    }

    #[test]
    fn stays_rejected() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.push(&[0xFF]).is_err());
        assert!(decoder.push(b"ok").is_err());
    }
}
