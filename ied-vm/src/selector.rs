// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Table-indexed script selection.
//!
//! A script table is a run of `(value, offset)` records: a 1- or 2-byte
//! little-endian key followed by a 2-byte little-endian script offset.
//! Keys strictly decrease down the table and the last record is expected
//! to be a catch-all, so there is no terminator.

use ied_common::IedError;

use crate::context::ExecContext;
use crate::fetch::fetch_byte;
use crate::hardware::Hardware;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Select the first record whose key equals the match value.
    Eq,
    /// Select the first record whose key is at most the match value.
    Ge,
}

/// Lookup parameters for a script table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMatch {
    pub value: u16,
    /// Key width in bytes, 1 or 2.
    pub width: u8,
    pub mode: CompareMode,
}

impl TableMatch {
    pub const fn new(value: u16, width: u8, mode: CompareMode) -> Self {
        Self { value, width, mode }
    }

    fn accepts(&self, key: u16) -> bool {
        match self.mode {
            CompareMode::Eq => self.value == key,
            CompareMode::Ge => self.value >= key,
        }
    }
}

/// Little-endian value of `width` bytes from the instruction stream.
fn fetch_le(hw: &mut dyn Hardware, ctx: &mut ExecContext, width: u8) -> Result<u16, IedError> {
    let mut value = 0u16;
    for i in 0..width {
        value |= u16::from(fetch_byte(hw, ctx)?) << (8 * i);
    }
    Ok(value)
}

/// Scan the table at `ctx.ip` and return the offset of the selected script.
pub fn select_script(
    hw: &mut dyn Hardware,
    ctx: &mut ExecContext,
    table: &TableMatch,
) -> Result<u16, IedError> {
    if !matches!(table.width, 1 | 2) {
        return Err(IedError::InvalidArgument(format!(
            "script table key width {} (must be 1 or 2)",
            table.width
        )));
    }

    let start = ctx.ip;
    let mut previous: Option<u16> = None;
    loop {
        let record = ctx.ip;
        let key = fetch_le(hw, ctx, table.width)?;
        if table.accepts(key) {
            return fetch_le(hw, ctx, 2);
        }
        if previous.is_some_and(|p| key >= p) {
            return Err(IedError::InvalidArgument(format!(
                "script table at 0x{:04X} is not strictly decreasing at 0x{:04X}",
                start, record
            )));
        }
        previous = Some(key);

        fetch_byte(hw, ctx)?;
        fetch_byte(hw, ctx)?;
    }
}
