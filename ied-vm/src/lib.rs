// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! VBIOS IED (Init Execution Data) interpreter.
//!
//! IED scripts are packed, variable-length bytecode stored in the GPU
//! firmware image. Display bring-up code runs them to sequence register
//! programming, DPCD writes over the AUX channel, timed delays and
//! conditional blocks. The image can only be read through 4-byte aligned
//! DMA transfers, so every fetch goes through [`fetch`].

pub mod condition;
pub mod context;
pub mod fetch;
mod handlers;
pub mod hardware;
pub mod interpreter;
pub mod opcode;
pub mod patch;
pub mod selector;
pub mod sim;
pub mod unpack;

#[cfg(test)]
mod testutil;

pub use condition::{check_condition, read_condition, ConditionEntry};
pub use context::{Endpoint, ExecContext};
pub use fetch::{fetch_block, fetch_byte};
pub use hardware::{AuxChannel, AuxRequest, Hardware, ImageRef, RegisterAccess, ScriptImage, Timer};
pub use interpreter::{
    execute_script, execute_script_sub, execute_script_table, ExecStats, Interpreter,
};
pub use opcode::{Header, Opcode};
pub use selector::{select_script, CompareMode, TableMatch};
pub use sim::{SimHardware, TraceEvent};
pub use unpack::{unpack, FormatSpec};
