// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Byte offset into a script image.
pub type ImageOffset = u32;

/// Hardware register address.
pub type RegAddr = u32;

/// Native word size of the controller running the interpreter.
pub const WORD_SIZE: usize = 4;

/// Every transfer from the script image is aligned to this many bytes.
pub const DMA_ALIGNMENT: u32 = 4;

/// Capacity of the staging buffer used for one aligned block transfer.
pub const STAGING_BUFFER_SIZE: usize = 72;

/// Largest REG_ARRAY payload, in dwords. 16 dwords plus worst-case alignment
/// slack (4 bytes) still fits the staging buffer.
pub const MAX_REG_ARRAY: usize = 16;

/// Size of one condition table record (address, mask, value).
pub const CONDITION_ENTRY_SIZE: u32 = 12;

/// Highest instruction pointer representable in the 16-bit encoding.
pub const IP_MAX: u32 = 0xFFFF;

/// Align a value up to the given power-of-two alignment.
#[inline]
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Align a value down to the given power-of-two alignment.
#[inline]
pub const fn align_down(value: u32, alignment: u32) -> u32 {
    value & !(alignment - 1)
}

/// Check if a value is DMA-aligned.
#[inline]
pub const fn is_dma_aligned(value: u32) -> bool {
    value & (DMA_ALIGNMENT - 1) == 0
}

/// Aligned `(offset, size)` window covering `[start, start + len)`, or
/// `None` when the aligned end does not fit in 32 bits.
#[inline]
pub const fn dma_window(start: u32, len: u32) -> Option<(u32, u32)> {
    let begin = align_down(start, DMA_ALIGNMENT);
    let Some(end) = start.checked_add(len) else {
        return None;
    };
    if end > align_down(u32::MAX, DMA_ALIGNMENT) {
        return None;
    }
    let end = align_up(end, DMA_ALIGNMENT);
    Some((begin, end - begin))
}
