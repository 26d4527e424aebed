// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Status word handed back to display HAL callers.
///
/// The low byte names the reporting module and the next 16 bits the
/// failure within it. Zero is success.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);

    const MODULE_BITS: u32 = 8;
    const MODULE_MASK: u32 = (1 << Self::MODULE_BITS) - 1;
    const DESCRIPTION_MASK: u32 = 0xFFFF;

    #[inline]
    pub const fn new(module: u32, description: u32) -> Self {
        Self((module & Self::MODULE_MASK) | ((description & Self::DESCRIPTION_MASK) << Self::MODULE_BITS))
    }

    #[inline]
    pub const fn module(self) -> u32 {
        self.0 & Self::MODULE_MASK
    }

    #[inline]
    pub const fn description(self) -> u32 {
        (self.0 >> Self::MODULE_BITS) & Self::DESCRIPTION_MASK
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Symbolic name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::SUCCESS => "SUCCESS",
            DMA_FAILURE => "DMA_FAILURE",
            AUX_FAILURE => "AUX_FAILURE",
            REGISTER_FAILURE => "REGISTER_FAILURE",
            INVALID_ARGUMENT => "INVALID_ARGUMENT",
            INVALID_STATE => "INVALID_STATE",
            _ => "UNKNOWN",
        }
    }
}

impl std::fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StatusCode({}, module={}, desc={})",
            self.name(),
            self.module(),
            self.description()
        )
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:06X})", self.name(), self.0)
    }
}

pub mod module {
    /// Failures reported by a hardware collaborator.
    pub const TRANSPORT: u32 = 1;
    /// Failures detected by the interpreter itself.
    pub const INTERPRETER: u32 = 2;
}

pub const DMA_FAILURE: StatusCode = StatusCode::new(module::TRANSPORT, 1);
pub const AUX_FAILURE: StatusCode = StatusCode::new(module::TRANSPORT, 2);
pub const REGISTER_FAILURE: StatusCode = StatusCode::new(module::TRANSPORT, 3);

pub const INVALID_ARGUMENT: StatusCode = StatusCode::new(module::INTERPRETER, 1);
pub const INVALID_STATE: StatusCode = StatusCode::new(module::INTERPRETER, 2);

/// Errors raised while fetching, decoding or executing an IED script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IedError {
    #[error("DMA read of {size} bytes at image offset 0x{offset:X} failed")]
    Dma { offset: u32, size: usize },

    #[error("AUX {op} on port {port} at DPCD 0x{register:05X} failed")]
    Aux {
        port: u8,
        register: u32,
        op: &'static str,
    },

    #[error("register access at 0x{0:08X} failed")]
    Register(u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown opcode 0x{opcode:02X} at offset 0x{offset:04X}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    #[error("subroutine nesting exceeds {limit} levels")]
    RecursionLimitExceeded { limit: u32 },

    #[error("instruction pointer overflow: 0x{ip:X} + {advance} passes 0xFFFF")]
    InstructionPointerOverflow { ip: u32, advance: u32 },
}

impl IedError {
    /// Firmware status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dma { .. } => DMA_FAILURE,
            Self::Aux { .. } => AUX_FAILURE,
            Self::Register(_) => REGISTER_FAILURE,
            Self::InvalidArgument(_) => INVALID_ARGUMENT,
            Self::InvalidState(_)
            | Self::UnknownOpcode { .. }
            | Self::RecursionLimitExceeded { .. }
            | Self::InstructionPointerOverflow { .. } => INVALID_STATE,
        }
    }

    /// True for failures reported by a collaborator rather than by the
    /// interpreter itself.
    pub fn is_transport(&self) -> bool {
        self.status().module() == module::TRANSPORT
    }
}

/// Collapse a result into the firmware status word.
pub fn status_of<T>(result: &Result<T, IedError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::SUCCESS,
        Err(e) => e.status(),
    }
}
