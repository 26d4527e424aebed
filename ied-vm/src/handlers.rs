// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Opcode handlers.

use byteorder::{ByteOrder, LittleEndian};
use ied_common::{IedError, RegAddr, MAX_REG_ARRAY, WORD_SIZE};

use crate::condition::check_condition;
use crate::context::ExecContext;
use crate::fetch::{fetch_block, fetch_byte};
use crate::hardware::{aux_read, aux_write};
use crate::interpreter::Interpreter;
use crate::opcode::Header;

/// POLL_LW timeouts count in units of 100 ms.
const POLL_TIMEOUT_UNIT_US: u64 = 100_000;

/// GENERIC_CONDITION sub-condition ids.
const GENERIC_ASSR_SUPPORT: u8 = 0x05;
const GENERIC_ENHANCED_FRAMING: u8 = 0x06;
const GENERIC_NO_PANEL_SEQ_DELAYS: u8 = 0x07;

/// DPCD registers read by GENERIC_CONDITION.
const DPCD_MAX_LANE_COUNT: u32 = 0x002;
const DPCD_EDP_CONFIGURATION_CAP: u32 = 0x00D;

const DPCD_ENHANCED_FRAME_CAP: u8 = 1 << 7;
const DPCD_ALTERNATE_SCRAMBLER_RESET_CAP: u8 = 1 << 0;

impl Interpreter<'_> {
    pub(crate) fn dispatch(&mut self, ctx: &mut ExecContext, header: Header) -> Result<(), IedError> {
        if header.opcode().is_gated() && !ctx.condition {
            return self.skip(ctx, header);
        }

        match header {
            Header::Not {} => {
                ctx.condition = !ctx.condition;
                Ok(())
            }
            Header::GenericCondition { condition, length } => {
                self.generic_condition(ctx, condition, length)
            }
            Header::ResetBitsLwReg { address, mask } => {
                let address = self.patcher.patch(ctx, address);
                let value = self.hw.read_register(address)?;
                self.write_reg(address, value & !mask)
            }
            Header::SetBitsLwReg { address, data } => {
                let address = self.patcher.patch(ctx, address);
                let value = self.hw.read_register(address)?;
                self.write_reg(address, value | data)
            }
            Header::Crtc { index, mask, data } => {
                let value = (self.hw.read_crtc(index)? & mask) | data;
                log::debug!("IED: CRTC[0x{:02X}] <- 0x{:02X}", index, value);
                self.hw.write_crtc(index, value)
            }
            Header::PollLw { condition, timeout } => self.poll(ctx, condition, timeout),
            Header::TimeMsec { milliseconds } => {
                self.hw.spin_wait_us(u32::from(milliseconds) * 1000);
                Ok(())
            }
            Header::RegArray { address, count } => self.reg_array(ctx, address, count),
            Header::SubDirect { offset } => self.call(ctx, offset),
            Header::LwCopy { src, shift, src_mask, xor, dst, dst_mask } => {
                let src = self.patcher.patch(ctx, src);
                let dst = self.patcher.patch(ctx, dst);

                let value = self.hw.read_register(src)?;
                let value = if shift >= 0 {
                    value.checked_shr(shift as u32).unwrap_or(0)
                } else {
                    value.checked_shl(shift.unsigned_abs()).unwrap_or(0)
                };
                let value = (value & src_mask) ^ xor;

                let current = self.hw.read_register(dst)?;
                self.write_reg(dst, (current & dst_mask) | value)
            }
            Header::LwReg { address, mask, data } => {
                let address = self.patcher.patch(ctx, address);
                let value = self.hw.read_register(address)?;
                self.write_reg(address, (value & mask) | data)
            }
            Header::Done {} => {
                ctx.completed = true;
                Ok(())
            }
            Header::Resume {} => {
                ctx.condition = true;
                Ok(())
            }
            Header::Time { microseconds } => {
                self.hw.spin_wait_us(u32::from(microseconds));
                Ok(())
            }
            Header::Condition { condition } => {
                if !check_condition(self.hw, ctx, condition)? {
                    ctx.condition = false;
                }
                Ok(())
            }
            Header::ZmReg { address, data } => {
                let address = self.patcher.patch(ctx, address);
                self.write_reg(address, data)
            }
            Header::DpcdReg { address, count } => self.dpcd_reg(ctx, address, count),
        }
    }

    /// Consume the trailing payload of a gated opcode without executing it.
    fn skip(&mut self, ctx: &mut ExecContext, header: Header) -> Result<(), IedError> {
        match header {
            Header::RegArray { count, .. } => {
                let mut payload = [0u8; MAX_REG_ARRAY * WORD_SIZE];
                let len = reg_array_len(count)?;
                fetch_block(self.hw, ctx, &mut payload[..len])
            }
            Header::DpcdReg { count, .. } => ctx.advance(u32::from(count) * 2),
            _ => Ok(()),
        }
    }

    fn write_reg(&mut self, address: RegAddr, value: u32) -> Result<(), IedError> {
        log::debug!("IED: [0x{:08X}] <- 0x{:08X}", address, value);
        self.hw.write_register(address, value)
    }

    fn generic_condition(
        &mut self,
        ctx: &mut ExecContext,
        condition: u8,
        length: u8,
    ) -> Result<(), IedError> {
        let result = match condition {
            GENERIC_ASSR_SUPPORT => {
                let cap = aux_read(self.hw, ctx.aux_port, DPCD_EDP_CONFIGURATION_CAP)?;
                cap & DPCD_ALTERNATE_SCRAMBLER_RESET_CAP != 0
            }
            GENERIC_ENHANCED_FRAMING => {
                let lanes = aux_read(self.hw, ctx.aux_port, DPCD_MAX_LANE_COUNT)?;
                lanes & DPCD_ENHANCED_FRAME_CAP != 0
            }
            GENERIC_NO_PANEL_SEQ_DELAYS => false,
            other => {
                return Err(IedError::InvalidArgument(format!(
                    "unsupported generic condition 0x{:02X}",
                    other
                )))
            }
        };
        log::debug!("IED: generic condition 0x{:02X} -> {}", condition, result);
        ctx.condition = result;
        ctx.advance(u32::from(length))
    }

    fn poll(&mut self, ctx: &mut ExecContext, condition: u8, timeout: u8) -> Result<(), IedError> {
        let budget = u64::from(timeout) * POLL_TIMEOUT_UNIT_US;
        let interval = self.settings.poll_interval_us.max(1);
        let mut waited = 0u64;

        loop {
            if check_condition(self.hw, ctx, condition)? {
                log::debug!("IED: poll on condition {} met after {} us", condition, waited);
                return Ok(());
            }
            if waited >= budget {
                log::warn!(
                    "IED: poll on condition {} timed out after {} us",
                    condition,
                    waited
                );
                ctx.condition = false;
                return Ok(());
            }
            self.hw.yield_now();
            self.hw.spin_wait_us(interval);
            waited += u64::from(interval);
        }
    }

    fn call(&mut self, ctx: &ExecContext, offset: u16) -> Result<(), IedError> {
        let limit = self.settings.max_call_depth;
        if ctx.depth >= limit {
            return Err(IedError::RecursionLimitExceeded { limit });
        }

        let mut child = *ctx;
        child.ip = u32::from(offset);
        child.condition = true;
        child.completed = false;
        child.depth = ctx.depth + 1;

        log::debug!("IED: call 0x{:04X} (depth {})", offset, child.depth);
        self.run(&mut child)
    }

    fn reg_array(&mut self, ctx: &mut ExecContext, address: RegAddr, count: u8) -> Result<(), IedError> {
        let mut payload = [0u8; MAX_REG_ARRAY * WORD_SIZE];
        let payload = &mut payload[..reg_array_len(count)?];
        fetch_block(self.hw, ctx, payload)?;

        let base = self.patcher.patch(ctx, address);
        for (i, chunk) in payload.chunks_exact(WORD_SIZE).enumerate() {
            let address = base.wrapping_add((i * WORD_SIZE) as u32);
            self.write_reg(address, LittleEndian::read_u32(chunk))?;
        }
        Ok(())
    }

    fn dpcd_reg(&mut self, ctx: &mut ExecContext, address: u32, count: u8) -> Result<(), IedError> {
        let port = ctx.aux_port;
        let mut register = address;
        for _ in 0..count {
            let value = aux_read(self.hw, port, register)?;
            let and_mask = fetch_byte(self.hw, ctx)?;
            let or_mask = fetch_byte(self.hw, ctx)?;
            let value = (value & and_mask) | or_mask;
            log::debug!("IED: DPCD[{}:0x{:05X}] <- 0x{:02X}", port, register, value);
            aux_write(self.hw, port, register, value)?;
            register = register.wrapping_add(1);
        }
        Ok(())
    }
}

/// Payload length of a REG_ARRAY with `count` entries.
fn reg_array_len(count: u8) -> Result<usize, IedError> {
    let count = usize::from(count);
    if count > MAX_REG_ARRAY {
        return Err(IedError::InvalidState(format!(
            "REG_ARRAY of {} entries exceeds the maximum of {}",
            count, MAX_REG_ARRAY
        )));
    }
    Ok(count * WORD_SIZE)
}
