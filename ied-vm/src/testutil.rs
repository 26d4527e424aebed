// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Script assembler for tests.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::opcode::Opcode;

#[derive(Debug, Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    fn op(mut self, opcode: Opcode) -> Self {
        self.bytes.push(opcode.byte());
        self
    }

    fn b(mut self, v: u8) -> Self {
        self.bytes.push(v);
        self
    }

    fn w(mut self, v: u16) -> Self {
        self.bytes.write_u16::<LittleEndian>(v).unwrap();
        self
    }

    fn d(mut self, v: u32) -> Self {
        self.bytes.write_u32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn not(self) -> Self {
        self.op(Opcode::Not)
    }

    pub fn done(self) -> Self {
        self.op(Opcode::Done)
    }

    pub fn resume(self) -> Self {
        self.op(Opcode::Resume)
    }

    pub fn condition(self, index: u8) -> Self {
        self.op(Opcode::Condition).b(index)
    }

    pub fn generic_condition(self, condition: u8, length: u8) -> Self {
        self.op(Opcode::GenericCondition).b(condition).b(length)
    }

    pub fn lw_reg(self, address: u32, mask: u32, data: u32) -> Self {
        self.op(Opcode::LwReg).d(address).d(mask).d(data)
    }

    pub fn zm_reg(self, address: u32, data: u32) -> Self {
        self.op(Opcode::ZmReg).d(address).d(data)
    }

    pub fn setbits_lw_reg(self, address: u32, data: u32) -> Self {
        self.op(Opcode::SetBitsLwReg).d(address).d(data)
    }

    pub fn resetbits_lw_reg(self, address: u32, mask: u32) -> Self {
        self.op(Opcode::ResetBitsLwReg).d(address).d(mask)
    }

    pub fn crtc(self, index: u8, mask: u8, data: u8) -> Self {
        self.op(Opcode::Crtc).b(index).b(mask).b(data)
    }

    pub fn poll_lw(self, condition: u8, timeout: u8) -> Self {
        self.op(Opcode::PollLw).b(condition).b(timeout)
    }

    pub fn time(self, us: u16) -> Self {
        self.op(Opcode::Time).w(us)
    }

    pub fn time_msec(self, ms: u16) -> Self {
        self.op(Opcode::TimeMsec).w(ms)
    }

    pub fn sub_direct(self, offset: u16) -> Self {
        self.op(Opcode::SubDirect).w(offset)
    }

    pub fn lw_copy(
        self,
        src: u32,
        shift: i8,
        src_mask: u32,
        xor: u32,
        dst: u32,
        dst_mask: u32,
    ) -> Self {
        self.op(Opcode::LwCopy)
            .d(src)
            .b(shift as u8)
            .d(src_mask)
            .d(xor)
            .d(dst)
            .d(dst_mask)
    }

    pub fn reg_array(self, address: u32, values: &[u32]) -> Self {
        let mut s = self.op(Opcode::RegArray).d(address).b(values.len() as u8);
        for &v in values {
            s = s.d(v);
        }
        s
    }

    /// DPCD_REG with one `(and, or)` mask pair per register.
    pub fn dpcd_reg(self, address: u32, masks: &[(u8, u8)]) -> Self {
        let mut s = self.op(Opcode::DpcdReg).d(address).b(masks.len() as u8);
        for &(and, or) in masks {
            s = s.b(and).b(or);
        }
        s
    }
}

/// Encode `(address, mask, value)` records as a condition table.
pub fn condition_table(entries: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 12);
    for &(address, mask, value) in entries {
        out.write_u32::<LittleEndian>(address).unwrap();
        out.write_u32::<LittleEndian>(mask).unwrap();
        out.write_u32::<LittleEndian>(value).unwrap();
    }
    out
}
