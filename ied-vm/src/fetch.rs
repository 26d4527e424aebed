// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte and block fetchers.
//!
//! The script image is not byte-addressable: every access is a DMA transfer
//! whose offset and length are multiples of 4. A single byte therefore costs
//! one word transfer; callers needing more than a couple of bytes use
//! [`fetch_block`], which moves the whole aligned window through a fixed
//! staging buffer in one transfer.

use byteorder::{ByteOrder, LittleEndian};
use ied_common::{align_down, dma_window, IedError, DMA_ALIGNMENT, STAGING_BUFFER_SIZE};

use crate::context::ExecContext;
use crate::hardware::Hardware;

/// Fetch the byte at `ctx.ip` and advance past it.
pub fn fetch_byte(hw: &mut dyn Hardware, ctx: &mut ExecContext) -> Result<u8, IedError> {
    let ip = ctx.ip;
    let aligned = align_down(ip, DMA_ALIGNMENT);
    let mut word = [0u8; DMA_ALIGNMENT as usize];
    hw.dma_read(&ctx.image, aligned, &mut word)?;

    let shift = (ip - aligned) * 8;
    let byte = (LittleEndian::read_u32(&word) >> shift) as u8;
    ctx.advance(1)?;
    Ok(byte)
}

/// Fetch `out.len()` bytes starting at `ctx.ip` and advance past them.
///
/// Fails with `InvalidState`, before any transfer, when the aligned window
/// would not fit the staging buffer, and with `Dma` when the window runs
/// past the end of the 32-bit aperture.
pub fn fetch_block(
    hw: &mut dyn Hardware,
    ctx: &mut ExecContext,
    out: &mut [u8],
) -> Result<(), IedError> {
    if out.is_empty() {
        return Ok(());
    }
    if out.len() > STAGING_BUFFER_SIZE {
        return Err(oversized(ctx.ip, out.len(), out.len()));
    }

    let size = out.len() as u32;
    let (offset, window) = dma_window(ctx.ip, size).ok_or(IedError::Dma {
        offset: ctx.ip,
        size: out.len(),
    })?;
    let window = window as usize;
    if window > STAGING_BUFFER_SIZE {
        return Err(oversized(ctx.ip, out.len(), window));
    }

    let mut staging = [0u8; STAGING_BUFFER_SIZE];
    hw.dma_read(&ctx.image, offset, &mut staging[..window])?;

    let start = (ctx.ip - offset) as usize;
    out.copy_from_slice(&staging[start..start + out.len()]);
    ctx.advance(size)
}

fn oversized(ip: u32, requested: usize, window: usize) -> IedError {
    IedError::InvalidState(format!(
        "block fetch of {} bytes at 0x{:04X} needs a {}-byte window (staging buffer is {})",
        requested, ip, window, STAGING_BUFFER_SIZE
    ))
}
