// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use ied_common::{IedError, ImageOffset, IpWrapMode, IP_MAX};

use crate::hardware::ImageRef;

/// Display endpoint a script operates on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// AUX channel used by DPCD opcodes.
    pub aux_port: u8,
    /// Output resource (SOR) index used for register patching.
    pub or_index: u8,
    /// Link index used for register patching.
    pub link_index: u8,
}

/// Per-invocation interpreter state.
///
/// Copied to start a subroutine; the copy shares nothing with its parent
/// except the image descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecContext {
    pub image: ImageRef,
    /// Next byte to fetch.
    pub ip: ImageOffset,
    /// Byte offset of the condition table in the image.
    pub condition_table: ImageOffset,
    /// Last fetched opcode byte.
    pub opcode: u8,
    /// Set by DONE.
    pub completed: bool,
    /// Gate for conditional opcodes.
    pub condition: bool,
    pub aux_port: u8,
    pub or_index: u8,
    pub link_index: u8,
    /// Subroutine nesting level, 0 for a top-level script.
    pub depth: u32,
    pub ip_wrap: IpWrapMode,
}

impl ExecContext {
    pub fn new(
        image: ImageRef,
        script: ImageOffset,
        condition_table: ImageOffset,
        endpoint: Endpoint,
        ip_wrap: IpWrapMode,
    ) -> Self {
        Self {
            image,
            ip: script,
            condition_table,
            opcode: 0,
            completed: false,
            condition: true,
            aux_port: endpoint.aux_port,
            or_index: endpoint.or_index,
            link_index: endpoint.link_index,
            depth: 0,
            ip_wrap,
        }
    }

    /// Like [`ExecContext::new`] for offsets coming from outside the image.
    ///
    /// Scripts address the image with 16 bits. In strict mode an offset
    /// above 0xFFFF is rejected before anything is fetched; in truncating
    /// mode it is cut to 16 bits once, here, so an instruction is never
    /// split between two regions.
    pub fn entry(
        image: ImageRef,
        script: ImageOffset,
        condition_table: ImageOffset,
        endpoint: Endpoint,
        ip_wrap: IpWrapMode,
    ) -> Result<Self, IedError> {
        let script = entry_offset(script, "script", ip_wrap)?;
        let condition_table = entry_offset(condition_table, "condition table", ip_wrap)?;
        Ok(Self::new(image, script, condition_table, endpoint, ip_wrap))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            aux_port: self.aux_port,
            or_index: self.or_index,
            link_index: self.link_index,
        }
    }

    /// Move the instruction pointer past `count` consumed bytes.
    ///
    /// In strict mode the pointer may land on 0x10000 right after the last
    /// addressable byte but never further; in truncating mode it wraps like
    /// a 16-bit register.
    pub fn advance(&mut self, count: u32) -> Result<(), IedError> {
        let next = self.ip.saturating_add(count);
        if next <= IP_MAX {
            self.ip = next;
            return Ok(());
        }
        match self.ip_wrap {
            IpWrapMode::Strict if next == IP_MAX + 1 => {
                self.ip = next;
                Ok(())
            }
            IpWrapMode::Strict => Err(IedError::InstructionPointerOverflow {
                ip: self.ip,
                advance: count,
            }),
            IpWrapMode::Truncate16 => {
                log::warn!(
                    "IED: instruction pointer 0x{:X} + {} wrapped past 0xFFFF",
                    self.ip,
                    count
                );
                self.ip = next & IP_MAX;
                Ok(())
            }
        }
    }
}

fn entry_offset(
    offset: ImageOffset,
    what: &str,
    ip_wrap: IpWrapMode,
) -> Result<ImageOffset, IedError> {
    if offset <= IP_MAX {
        return Ok(offset);
    }
    match ip_wrap {
        IpWrapMode::Strict => Err(IedError::InvalidArgument(format!(
            "{} offset 0x{:X} is outside the 16-bit range",
            what, offset
        ))),
        IpWrapMode::Truncate16 => {
            log::warn!(
                "IED: {} offset 0x{:X} truncated to 0x{:04X}",
                what,
                offset,
                offset & IP_MAX
            );
            Ok(offset & IP_MAX)
        }
    }
}
