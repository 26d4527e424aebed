// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator traits for the interpreter.
//!
//! These decouple the interpreter from the platform: the firmware image is
//! reached through aligned DMA, registers through MMIO, DPCD through the
//! DisplayPort AUX channel. Implementations report failures as
//! [`IedError`] and the interpreter propagates them unchanged.

use ied_common::{IedError, ImageOffset, RegAddr};

/// Location of a script image inside DMA-addressable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef {
    /// Base address of the image in the DMA aperture.
    pub base: u32,
    /// Image length in bytes.
    pub size: u32,
}

impl ImageRef {
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }
}

/// Aligned DMA access to the script image.
pub trait ScriptImage {
    /// Read `buf.len()` bytes at `offset` within `image`. Both the offset and
    /// the length are multiples of [`ied_common::DMA_ALIGNMENT`].
    fn dma_read(&mut self, image: &ImageRef, offset: ImageOffset, buf: &mut [u8])
        -> Result<(), IedError>;
}

/// Hardware register access: 32-bit MMIO and legacy VGA CRTC registers.
pub trait RegisterAccess {
    fn read_register(&mut self, addr: RegAddr) -> Result<u32, IedError>;
    fn write_register(&mut self, addr: RegAddr, value: u32) -> Result<(), IedError>;
    fn read_crtc(&mut self, index: u8) -> Result<u8, IedError>;
    fn write_crtc(&mut self, index: u8, value: u8) -> Result<(), IedError>;
}

/// Direction of a single-byte AUX transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxRequest {
    Read,
    Write(u8),
}

/// DisplayPort AUX channel.
pub trait AuxChannel {
    /// Perform one transaction. Reads return the DPCD byte; writes return
    /// the value written.
    fn aux_transaction(&mut self, port: u8, register: u32, request: AuxRequest)
        -> Result<u8, IedError>;
}

/// Busy-wait and cooperative scheduling primitives.
pub trait Timer {
    fn spin_wait_us(&mut self, us: u32);

    /// Let other firmware tasks run between poll iterations.
    fn yield_now(&mut self) {}
}

/// Everything the interpreter needs from the platform.
pub trait Hardware: ScriptImage + RegisterAccess + AuxChannel + Timer {}

impl<T: ScriptImage + RegisterAccess + AuxChannel + Timer + ?Sized> Hardware for T {}

pub(crate) fn aux_read(hw: &mut dyn Hardware, port: u8, register: u32) -> Result<u8, IedError> {
    hw.aux_transaction(port, register, AuxRequest::Read)
}

pub(crate) fn aux_write(
    hw: &mut dyn Hardware,
    port: u8,
    register: u32,
    value: u8,
) -> Result<(), IedError> {
    hw.aux_transaction(port, register, AuxRequest::Write(value))
        .map(|_| ())
}
