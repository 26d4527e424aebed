// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Condition table reader.
//!
//! The condition table is a contiguous array of 12-byte records
//! `{address, mask, value}` (three little-endian dwords). An entry holds
//! when `(register[address] & mask) == value`.

use ied_common::{IedError, CONDITION_ENTRY_SIZE};

use crate::context::ExecContext;
use crate::fetch::fetch_block;
use crate::hardware::Hardware;
use crate::unpack::{unpack, FormatSpec};

const ENTRY_FORMAT: &str = "3d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionEntry {
    pub address: u32,
    pub mask: u32,
    pub value: u32,
}

impl ConditionEntry {
    #[inline]
    pub fn matches(&self, register: u32) -> bool {
        register & self.mask == self.value
    }
}

/// Read entry `index` of the condition table. The caller's instruction
/// pointer is left untouched.
pub fn read_condition(
    hw: &mut dyn Hardware,
    ctx: &ExecContext,
    index: u8,
) -> Result<ConditionEntry, IedError> {
    let mut cursor = *ctx;
    cursor.ip = u32::from(index)
        .checked_mul(CONDITION_ENTRY_SIZE)
        .and_then(|offset| ctx.condition_table.checked_add(offset))
        .ok_or(IedError::Dma {
            offset: ctx.condition_table,
            size: CONDITION_ENTRY_SIZE as usize,
        })?;

    let mut raw = [0u8; CONDITION_ENTRY_SIZE as usize];
    fetch_block(hw, &mut cursor, &mut raw)?;

    let format = FormatSpec::parse(ENTRY_FORMAT)?;
    let mut words = [0u32; 3];
    unpack(&format, &raw, &mut words)?;

    Ok(ConditionEntry {
        address: words[0],
        mask: words[1],
        value: words[2],
    })
}

/// Evaluate entry `index` of the condition table against live hardware.
pub fn check_condition(
    hw: &mut dyn Hardware,
    ctx: &ExecContext,
    index: u8,
) -> Result<bool, IedError> {
    let entry = read_condition(hw, ctx, index)?;
    let register = hw.read_register(entry.address)?;
    let result = entry.matches(register);
    log::trace!(
        "IED: condition {} [0x{:08X}]=0x{:08X} & 0x{:08X} == 0x{:08X} -> {}",
        index,
        entry.address,
        register,
        entry.mask,
        entry.value,
        result
    );
    Ok(result)
}
