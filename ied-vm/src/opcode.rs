// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! IED opcode table.
//!
//! Every opcode is declared exactly once below with its byte value,
//! mnemonic, header format, whether it is gated by the condition flag, and
//! the fields of its decoded header. The [`Opcode`] enum, the [`Header`]
//! enum and the decoder are all generated from that one list, and the
//! interpreter dispatches with an exhaustive `match` on [`Header`], so an
//! opcode cannot exist without a format and a handler.

use ied_common::IedError;

/// Conversion from an unpacked word slot to a header field.
trait FromSlot: Sized {
    fn from_slot(word: u32) -> Self;
}

impl FromSlot for u8 {
    fn from_slot(word: u32) -> Self {
        word as u8
    }
}

impl FromSlot for u16 {
    fn from_slot(word: u32) -> Self {
        word as u16
    }
}

impl FromSlot for u32 {
    fn from_slot(word: u32) -> Self {
        word
    }
}

/// Signed-byte fields arrive sign-extended to a full word.
impl FromSlot for i32 {
    fn from_slot(word: u32) -> Self {
        word as i32
    }
}

macro_rules! opcode_table {
    ($(
        $(#[$doc:meta])*
        $variant:ident = $byte:literal, $mnemonic:literal, $format:literal, gated: $gated:literal
            { $($field:ident : $ty:ty),* $(,)? }
    )*) => {
        /// IED opcode byte values.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $variant = $byte,)*
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub const fn byte(self) -> u8 {
                self as u8
            }

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$variant => $mnemonic,)*
                }
            }

            /// Header format string for the unpacking engine.
            pub const fn format(self) -> &'static str {
                match self {
                    $(Self::$variant => $format,)*
                }
            }

            /// Whether the opcode is a no-op while the condition flag is clear.
            pub const fn is_gated(self) -> bool {
                match self {
                    $(Self::$variant => $gated,)*
                }
            }

            /// Number of decoded header fields.
            pub const fn field_count(self) -> usize {
                match self {
                    $(Self::$variant => 0 $(+ { let _ = stringify!($field); 1 })*,)*
                }
            }
        }

        /// Decoded instruction header, one variant per opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Header {
            $($variant { $($field: $ty),* },)*
        }

        impl Header {
            /// Build the header for `opcode` from unpacked word slots.
            pub fn decode(opcode: Opcode, words: &[u32]) -> Result<Self, IedError> {
                if words.len() < opcode.field_count() {
                    return Err(IedError::InvalidState(format!(
                        "{} header needs {} fields, got {}",
                        opcode.mnemonic(),
                        opcode.field_count(),
                        words.len()
                    )));
                }
                #[allow(unused_variables, unused_mut)]
                let mut slots = words.iter().copied();
                match opcode {
                    $(Opcode::$variant => Ok(Header::$variant {
                        $($field: <$ty as FromSlot>::from_slot(slots.next().unwrap_or(0)),)*
                    }),)*
                }
            }

            pub fn opcode(&self) -> Opcode {
                match self {
                    $(Header::$variant { .. } => Opcode::$variant,)*
                }
            }
        }
    };
}

opcode_table! {
    /// Invert the condition flag.
    Not = 0x38, "NOT", "", gated: false {}
    /// Evaluate a built-in condition and skip its payload.
    GenericCondition = 0x3A, "GENERIC_CONDITION", "2b", gated: false {
        condition: u8,
        length: u8,
    }
    /// Clear bits in a register.
    ResetBitsLwReg = 0x47, "RESETBITS_LW_REG", "2d", gated: true {
        address: u32,
        mask: u32,
    }
    /// Set bits in a register.
    SetBitsLwReg = 0x48, "SETBITS_LW_REG", "2d", gated: true {
        address: u32,
        data: u32,
    }
    /// Read-modify-write a VGA CRTC register.
    Crtc = 0x52, "CRTC", "3b", gated: true {
        index: u8,
        mask: u8,
        data: u8,
    }
    /// Poll a condition table entry with a timeout in units of 100 ms.
    PollLw = 0x56, "POLL_LW", "2b", gated: true {
        condition: u8,
        timeout: u8,
    }
    /// Delay in milliseconds.
    TimeMsec = 0x57, "TIME_MSEC", "1w", gated: true {
        milliseconds: u16,
    }
    /// Write a trailing block of dwords to consecutive registers.
    RegArray = 0x58, "REG_ARRAY", "1d1b", gated: true {
        address: u32,
        count: u8,
    }
    /// Call the script at an absolute offset.
    SubDirect = 0x5B, "SUB_DIRECT", "1w", gated: true {
        offset: u16,
    }
    /// Copy a shifted, masked register value into another register.
    LwCopy = 0x5F, "LW_COPY", "1d1s4d", gated: true {
        src: u32,
        shift: i32,
        src_mask: u32,
        xor: u32,
        dst: u32,
        dst_mask: u32,
    }
    /// Read-modify-write a register.
    LwReg = 0x6E, "LW_REG", "3d", gated: true {
        address: u32,
        mask: u32,
        data: u32,
    }
    /// End of script.
    Done = 0x71, "DONE", "", gated: false {}
    /// Force the condition flag back on.
    Resume = 0x72, "RESUME", "", gated: false {}
    /// Delay in microseconds.
    Time = 0x74, "TIME", "1w", gated: true {
        microseconds: u16,
    }
    /// Clear the condition flag if a condition table entry does not match.
    Condition = 0x75, "CONDITION", "1b", gated: false {
        condition: u8,
    }
    /// Write a register without reading it.
    ZmReg = 0x7A, "ZM_REG", "2d", gated: true {
        address: u32,
        data: u32,
    }
    /// Read-modify-write consecutive DPCD registers with trailing masks.
    DpcdReg = 0x98, "DPCD_REG", "1d1b", gated: true {
        address: u32,
        count: u8,
    }
}
