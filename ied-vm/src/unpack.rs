// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Unpacking engine for byte-packed instruction headers.
//!
//! A format string describes a run of little-endian fields, each an
//! optional decimal repeat count followed by a size code:
//!
//! | Code | Packed | Unpacked slot |
//! |------|--------|---------------|
//! | `b`  | 1      | 1 word, zero-extended |
//! | `s`  | 1      | 1 word, sign-extended |
//! | `w`  | 2      | 1 word, zero-extended |
//! | `d`  | 4      | 1 word |
//! | `q`  | 8      | 2 words (low, high) |
//!
//! `"1d1s4d"` is one dword, one signed byte and four dwords: 21 packed
//! bytes, 6 unpacked words.

use byteorder::{ByteOrder, LittleEndian};
use ied_common::{IedError, WORD_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    SignedByte,
    Word,
    Dword,
    Qword,
}

impl FieldKind {
    fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(Self::Byte),
            's' => Some(Self::SignedByte),
            'w' => Some(Self::Word),
            'd' => Some(Self::Dword),
            'q' => Some(Self::Qword),
            _ => None,
        }
    }

    /// Bytes occupied in the packed stream.
    pub const fn packed_size(self) -> usize {
        match self {
            Self::Byte | Self::SignedByte => 1,
            Self::Word => 2,
            Self::Dword => 4,
            Self::Qword => 8,
        }
    }

    /// Output words occupied once unpacked.
    pub const fn slots(self) -> usize {
        match self {
            Self::Qword => 2,
            _ => 1,
        }
    }
}

/// `count` consecutive fields of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGroup {
    pub count: usize,
    pub kind: FieldKind,
}

/// Most field groups one format string may hold.
pub const MAX_FORMAT_GROUPS: usize = 8;

const UNUSED_GROUP: FieldGroup = FieldGroup {
    count: 0,
    kind: FieldKind::Byte,
};

/// A parsed, validated format string. Lives on the stack so headers can be
/// parsed per instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    groups: [FieldGroup; MAX_FORMAT_GROUPS],
    len: usize,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            groups: [UNUSED_GROUP; MAX_FORMAT_GROUPS],
            len: 0,
        }
    }
}

impl FormatSpec {
    pub fn parse(format: &str) -> Result<Self, IedError> {
        let mut spec = Self::default();
        let mut count: Option<usize> = None;

        for c in format.chars() {
            if let Some(digit) = c.to_digit(10) {
                let next = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit as usize))
                    .ok_or_else(|| bad_format(format, "repeat count overflows"))?;
                count = Some(next);
                continue;
            }

            let kind = FieldKind::from_code(c)
                .ok_or_else(|| bad_format(format, "unknown field code"))?;
            let n = count.take().unwrap_or(1);
            if n == 0 {
                return Err(bad_format(format, "zero repeat count"));
            }
            if spec.len == MAX_FORMAT_GROUPS {
                return Err(bad_format(format, "too many field groups"));
            }
            spec.groups[spec.len] = FieldGroup { count: n, kind };
            spec.len += 1;
        }

        if count.is_some() {
            return Err(bad_format(format, "repeat count without field code"));
        }
        Ok(spec)
    }

    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups[..self.len]
    }

    /// Bytes consumed from the packed stream.
    pub fn packed_size(&self) -> usize {
        self.groups()
            .iter()
            .map(|g| g.count * g.kind.packed_size())
            .sum()
    }

    /// Words produced in the output.
    pub fn unpacked_words(&self) -> usize {
        self.groups().iter().map(|g| g.count * g.kind.slots()).sum()
    }
}

fn bad_format(format: &str, reason: &str) -> IedError {
    IedError::InvalidArgument(format!("format \"{}\": {}", format, reason))
}

/// Widen `packed` into word slots of `out` as described by `format`.
///
/// Returns the number of packed bytes consumed, which differs from the
/// number of bytes written.
pub fn unpack(format: &FormatSpec, packed: &[u8], out: &mut [u32]) -> Result<usize, IedError> {
    let words = format.unpacked_words();
    if words > out.len() {
        return Err(IedError::InvalidArgument(format!(
            "unpacked size {} words exceeds output capacity {}",
            words,
            out.len()
        )));
    }
    let needed = format.packed_size();
    if needed > packed.len() {
        return Err(IedError::InvalidArgument(format!(
            "format needs {} packed bytes, only {} available",
            needed,
            packed.len()
        )));
    }

    let mut src = 0usize;
    let mut slot = 0usize;
    for group in format.groups() {
        for _ in 0..group.count {
            let raw = &packed[src..src + group.kind.packed_size()];
            match group.kind {
                FieldKind::Byte => out[slot] = u32::from(raw[0]),
                FieldKind::SignedByte => out[slot] = i32::from(raw[0] as i8) as u32,
                FieldKind::Word => out[slot] = u32::from(LittleEndian::read_u16(raw)),
                FieldKind::Dword => out[slot] = LittleEndian::read_u32(raw),
                FieldKind::Qword => {
                    let value = LittleEndian::read_u64(raw);
                    out[slot] = value as u32;
                    out[slot + 1] = (value >> 32) as u32;
                }
            }
            src += group.kind.packed_size();
            slot += group.kind.slots();
        }
    }
    Ok(src)
}

/// Byte-addressed variant of [`unpack`]: `out` receives little-endian
/// words. The capacity must be a whole number of words.
pub fn unpack_bytes(format: &FormatSpec, packed: &[u8], out: &mut [u8]) -> Result<usize, IedError> {
    if out.len() % WORD_SIZE != 0 {
        return Err(IedError::InvalidArgument(format!(
            "output capacity {} is not a multiple of the {}-byte word",
            out.len(),
            WORD_SIZE
        )));
    }
    let mut words = vec![0u32; out.len() / WORD_SIZE];
    let consumed = unpack(format, packed, &mut words)?;
    LittleEndian::write_u32_into(&words, out);
    Ok(consumed)
}
