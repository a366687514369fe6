//! Wire index tokens
//!
//! Each instrumented class writes its changed members as a stream of
//! `(token, payload)` pairs. A token is a signed integer whose sign doubles
//! as a null flag: `index` means "payload for member `index` follows",
//! `-(index + 1)` means "member `index` becomes null, no payload", and the
//! member count itself is the end-of-segment sentinel. Token width is the
//! smallest of byte or short that fits the member count.
//!
//! The generated bytecode speaks raw signed integers; this module is the
//! same convention as explicit values so the protocol is testable without
//! a JVM.

use crate::error::{Error, Result};

/// One decoded index token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireToken {
    /// All of this class's members have been read.
    EndOfSegment,
    /// Payload for the member at this index follows.
    Member(u16),
    /// The member at this index becomes null; no payload.
    MemberNull(u16),
}

/// Encoded width of one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenWidth {
    U8,
    U16,
}

impl TokenWidth {
    /// The smallest width whose signed range fits `member_count` (the
    /// sentinel value, the largest token ever written).
    pub fn for_member_count(class: &str, member_count: usize) -> Result<TokenWidth> {
        if member_count <= i8::MAX as usize {
            Ok(TokenWidth::U8)
        } else if member_count <= i16::MAX as usize {
            Ok(TokenWidth::U16)
        } else {
            Err(Error::Capacity { class: class.to_string(), count: member_count })
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            TokenWidth::U8 => 1,
            TokenWidth::U16 => 2,
        }
    }
}

impl WireToken {
    /// The raw signed value this token encodes to, given the owning
    /// class's member count.
    pub fn raw(self, member_count: u16) -> i32 {
        match self {
            WireToken::EndOfSegment => member_count as i32,
            WireToken::Member(idx) => idx as i32,
            WireToken::MemberNull(idx) => -(idx as i32) - 1,
        }
    }

    /// Decode a raw signed value back into a token.
    pub fn from_raw(raw: i32, member_count: u16) -> Result<WireToken> {
        if raw == member_count as i32 {
            Ok(WireToken::EndOfSegment)
        } else if raw >= 0 {
            if raw < member_count as i32 {
                Ok(WireToken::Member(raw as u16))
            } else {
                Err(Error::wire(format!(
                    "index token {raw} out of range for {member_count} members"
                )))
            }
        } else {
            let idx = -(raw + 1);
            if idx < member_count as i32 {
                Ok(WireToken::MemberNull(idx as u16))
            } else {
                Err(Error::wire(format!(
                    "null token {raw} out of range for {member_count} members"
                )))
            }
        }
    }

    pub fn write(self, width: TokenWidth, member_count: u16, out: &mut Vec<u8>) {
        let raw = self.raw(member_count);
        match width {
            TokenWidth::U8 => out.push(raw as i8 as u8),
            TokenWidth::U16 => out.extend_from_slice(&(raw as i16).to_be_bytes()),
        }
    }

    pub fn read(width: TokenWidth, member_count: u16, input: &mut &[u8]) -> Result<WireToken> {
        let raw = match width {
            TokenWidth::U8 => {
                let (&byte, rest) = input
                    .split_first()
                    .ok_or_else(|| Error::wire("buffer exhausted mid-token".to_string()))?;
                *input = rest;
                byte as i8 as i32
            }
            TokenWidth::U16 => {
                if input.len() < 2 {
                    return Err(Error::wire("buffer exhausted mid-token".to_string()));
                }
                let raw = i16::from_be_bytes([input[0], input[1]]) as i32;
                *input = &input[2..];
                raw
            }
        };
        WireToken::from_raw(raw, member_count)
    }
}
