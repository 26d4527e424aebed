// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! IED interpreter core.
//!
//! Fetch an opcode byte, look it up in the opcode table, pull its packed
//! header through the block fetcher, unpack and decode it, run the handler.
//! Repeat until DONE. An unknown opcode is fatal: its header length is
//! unknown, so there is no way to find the next instruction.

use ied_common::{IedError, ImageOffset, Settings, STAGING_BUFFER_SIZE};

use crate::context::{Endpoint, ExecContext};
use crate::fetch::{fetch_block, fetch_byte};
use crate::hardware::{Hardware, ImageRef};
use crate::opcode::{Header, Opcode};
use crate::patch::AddressPatcher;
use crate::selector::{select_script, TableMatch};
use crate::unpack::{unpack, FormatSpec};

/// Largest decoded header, in words (LW_COPY).
const MAX_HEADER_WORDS: usize = 8;

/// Counters for one top-level run, nested subroutines included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    /// Instructions fetched and dispatched.
    pub instructions: u32,
    /// Gated instructions dispatched while the condition flag was clear.
    pub skipped: u32,
    /// Deepest subroutine nesting reached.
    pub max_depth: u32,
}

/// Runs scripts against one hardware backend.
pub struct Interpreter<'a> {
    pub(crate) hw: &'a mut dyn Hardware,
    pub(crate) settings: &'a Settings,
    pub(crate) patcher: AddressPatcher<'a>,
    pub(crate) stats: ExecStats,
}

impl<'a> Interpreter<'a> {
    pub fn new(hw: &'a mut dyn Hardware, settings: &'a Settings) -> Self {
        Self {
            hw,
            settings,
            patcher: AddressPatcher::new(&settings.patch_windows),
            stats: ExecStats::default(),
        }
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    /// Run `ctx` until DONE or the first error.
    pub fn run(&mut self, ctx: &mut ExecContext) -> Result<(), IedError> {
        self.stats.max_depth = self.stats.max_depth.max(ctx.depth);
        while !ctx.completed {
            self.step(ctx)?;
        }
        Ok(())
    }

    /// Execute a single instruction.
    pub(crate) fn step(&mut self, ctx: &mut ExecContext) -> Result<(), IedError> {
        let offset = ctx.ip;
        let byte = fetch_byte(self.hw, ctx)?;
        ctx.opcode = byte;

        let opcode = Opcode::from_byte(byte).ok_or(IedError::UnknownOpcode {
            opcode: byte,
            offset,
        })?;
        let header = self.fetch_header(ctx, opcode)?;

        log::trace!(
            "IED: 0x{:04X} {} {:?} (cond={})",
            offset,
            opcode.mnemonic(),
            header,
            ctx.condition
        );

        self.stats.instructions += 1;
        if opcode.is_gated() && !ctx.condition {
            self.stats.skipped += 1;
        }
        self.dispatch(ctx, header)
    }

    /// Read and decode the packed header following an opcode byte.
    fn fetch_header(&mut self, ctx: &mut ExecContext, opcode: Opcode) -> Result<Header, IedError> {
        let format = FormatSpec::parse(opcode.format())?;
        let size = format.packed_size();
        if size > STAGING_BUFFER_SIZE {
            return Err(IedError::InvalidState(format!(
                "{} header of {} bytes exceeds the staging buffer",
                opcode.mnemonic(),
                size
            )));
        }

        let mut packed = [0u8; STAGING_BUFFER_SIZE];
        fetch_block(self.hw, ctx, &mut packed[..size])?;

        let mut words = [0u32; MAX_HEADER_WORDS];
        unpack(&format, &packed[..size], &mut words)?;
        Header::decode(opcode, &words[..format.unpacked_words()])
    }
}

/// Run the script at `script` to completion.
pub fn execute_script(
    hw: &mut dyn Hardware,
    settings: &Settings,
    image: ImageRef,
    script: ImageOffset,
    condition_table: ImageOffset,
    endpoint: Endpoint,
) -> Result<ExecStats, IedError> {
    log::info!(
        "IED: executing script at 0x{:04X} (cond table 0x{:04X}, {:?})",
        script,
        condition_table,
        endpoint
    );
    let mut ctx = ExecContext::entry(image, script, condition_table, endpoint, settings.ip_wrap)?;
    execute_script_sub(hw, settings, &mut ctx)
}

/// Select a sub-script from the table at `script` and run it.
pub fn execute_script_table(
    hw: &mut dyn Hardware,
    settings: &Settings,
    image: ImageRef,
    script: ImageOffset,
    condition_table: ImageOffset,
    endpoint: Endpoint,
    table: TableMatch,
) -> Result<ExecStats, IedError> {
    let mut ctx = ExecContext::entry(image, script, condition_table, endpoint, settings.ip_wrap)?;
    let selected = select_script(hw, &mut ctx, &table)?;
    log::info!(
        "IED: table at 0x{:04X} selected script 0x{:04X} for {:?}",
        script,
        selected,
        table
    );
    ctx.ip = u32::from(selected);
    execute_script_sub(hw, settings, &mut ctx)
}

/// Run a caller-provided context to completion.
pub fn execute_script_sub(
    hw: &mut dyn Hardware,
    settings: &Settings,
    ctx: &mut ExecContext,
) -> Result<ExecStats, IedError> {
    let mut interp = Interpreter::new(hw, settings);
    let result = interp.run(ctx);
    let stats = interp.stats();
    match &result {
        Ok(()) => log::info!(
            "IED: script done: {} instructions, {} skipped, depth {}",
            stats.instructions,
            stats.skipped,
            stats.max_depth
        ),
        Err(e) => log::error!(
            "IED: script failed at 0x{:04X} (opcode 0x{:02X}): {}",
            ctx.ip,
            ctx.opcode,
            e
        ),
    }
    result.map(|()| stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::CompareMode;
    use crate::sim::{SimHardware, TraceEvent};
    use crate::testutil::{condition_table, Script};
    use ied_common::error::{INVALID_ARGUMENT, INVALID_STATE};
    use ied_common::IpWrapMode;

    fn run(hw: &mut SimHardware, script: u32, cond_table: u32) -> Result<ExecStats, IedError> {
        let image = hw.image_ref();
        execute_script(hw, &Settings::default(), image, script, cond_table, Endpoint::default())
    }

    #[test]
    fn test_done_only() {
        let mut hw = SimHardware::new(Script::new().done().build());
        let image = hw.image_ref();
        let mut ctx = ExecContext::new(image, 0, 0, Endpoint::default(), IpWrapMode::Strict);
        let stats = execute_script_sub(&mut hw, &Settings::default(), &mut ctx).unwrap();

        assert!(ctx.completed);
        assert_eq!(ctx.ip, 1);
        assert_eq!(stats.instructions, 1);
        assert!(hw.trace().is_empty());
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut hw = SimHardware::new(vec![0xFF]);
        let err = run(&mut hw, 0, 0).unwrap_err();
        assert_eq!(err, IedError::UnknownOpcode { opcode: 0xFF, offset: 0 });
        assert_eq!(err.status(), INVALID_STATE);
        assert!(hw.trace().is_empty());
    }

    #[test]
    fn test_unknown_opcode_after_valid_instruction() {
        let mut bytes = Script::new().zm_reg(0x10, 1).build();
        bytes.push(0x00);
        let mut hw = SimHardware::new(bytes);
        let err = run(&mut hw, 0, 0).unwrap_err();
        assert_eq!(err, IedError::UnknownOpcode { opcode: 0x00, offset: 9 });
        // The instruction before the bad byte already ran.
        assert_eq!(hw.register_writes(), vec![(0x10, 1)]);
    }

    #[test]
    fn test_every_table_opcode_is_recognized() {
        // Each opcode with an all-zero header followed by DONE: none may be
        // reported as unknown.
        for &op in Opcode::ALL {
            let size = FormatSpec::parse(op.format()).unwrap().packed_size();
            let mut bytes = vec![op.byte()];
            bytes.extend(std::iter::repeat(0u8).take(size));
            bytes.push(Opcode::Done.byte());
            let mut hw = SimHardware::new(bytes);
            let result = run(&mut hw, 0, 0);
            assert!(
                !matches!(result, Err(IedError::UnknownOpcode { .. })),
                "{} reported unknown",
                op.mnemonic()
            );
        }
    }

    #[test]
    fn test_condition_gates_register_write() {
        let table_offset = 0x40;
        let build = |index: u8| {
            let mut bytes = Script::new()
                .condition(index)
                .lw_reg(0x5000, 0xFFFF_0000, 0x0000_1234)
                .done()
                .build();
            bytes.resize(table_offset as usize, 0);
            bytes.extend(condition_table(&[
                (0x1000, 0x1, 0x1), // false: register reads 0
                (0x1000, 0x1, 0x0), // true
            ]));
            bytes
        };

        let mut hw = SimHardware::new(build(0));
        hw.set_register(0x5000, 0xABCD_FFFF);
        let stats = run(&mut hw, 0, table_offset).unwrap();
        assert!(hw.register_writes().is_empty());
        assert_eq!(stats.skipped, 1);

        let mut hw = SimHardware::new(build(1));
        hw.set_register(0x5000, 0xABCD_FFFF);
        run(&mut hw, 0, table_offset).unwrap();
        assert_eq!(hw.register_writes(), vec![(0x5000, 0xABCD_1234)]);
    }

    #[test]
    fn test_not_and_resume() {
        let bytes = Script::new()
            .not()
            .zm_reg(0x10, 1) // skipped
            .not()
            .zm_reg(0x20, 2) // runs
            .not()
            .resume()
            .zm_reg(0x30, 3) // runs
            .done()
            .build();
        let mut hw = SimHardware::new(bytes);
        let stats = run(&mut hw, 0, 0).unwrap();
        assert_eq!(hw.register_writes(), vec![(0x20, 2), (0x30, 3)]);
        assert_eq!(stats.instructions, 8);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_sub_direct_nested_call() {
        // 0x00: SUB_DIRECT 0x20; ZM_REG 0x10; DONE
        // 0x20: ZM_REG 0x20; DONE
        let mut bytes = Script::new().sub_direct(0x20).zm_reg(0x10, 1).done().build();
        bytes.resize(0x20, 0);
        bytes.extend(Script::new().zm_reg(0x20, 2).done().build());

        let mut hw = SimHardware::new(bytes);
        let stats = run(&mut hw, 0, 0).unwrap();
        assert_eq!(hw.register_writes(), vec![(0x20, 2), (0x10, 1)]);
        assert_eq!(stats.max_depth, 1);
        assert_eq!(stats.instructions, 5);
    }

    #[test]
    fn test_sub_direct_recursion_limit() {
        // A script that calls itself forever.
        let bytes = Script::new().sub_direct(0).done().build();
        let mut hw = SimHardware::new(bytes);
        let settings = Settings { max_call_depth: 3, ..Settings::default() };
        let image = hw.image_ref();
        let err = execute_script(&mut hw, &settings, image, 0, 0, Endpoint::default()).unwrap_err();
        assert_eq!(err, IedError::RecursionLimitExceeded { limit: 3 });
        assert_eq!(err.status(), INVALID_STATE);
    }

    #[test]
    fn test_running_off_the_image_is_dma_error() {
        // No DONE: execution walks off the last word of the image.
        let mut bytes = Script::new().zm_reg(0x10, 1).build();
        bytes.resize(12, Opcode::Not.byte());
        let mut hw = SimHardware::new(bytes);
        let err = run(&mut hw, 0, 0).unwrap_err();
        assert!(matches!(err, IedError::Dma { offset: 12, .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn test_script_table_entry() {
        // Table at 0: (100 -> 0x20), (50 -> 0x30), (0 -> 0x40)
        let mut bytes = vec![100, 0x20, 0x00, 50, 0x30, 0x00, 0, 0x40, 0x00];
        bytes.resize(0x20, 0);
        bytes.extend(Script::new().zm_reg(0xA, 100).done().build());
        bytes.resize(0x30, 0);
        bytes.extend(Script::new().zm_reg(0xB, 50).done().build());
        bytes.resize(0x40, 0);
        bytes.extend(Script::new().zm_reg(0xC, 0).done().build());

        let mut hw = SimHardware::new(bytes);
        let image = hw.image_ref();
        let table = TableMatch::new(75, 1, CompareMode::Ge);
        execute_script_table(&mut hw, &Settings::default(), image, 0, 0, Endpoint::default(), table)
            .unwrap();
        assert_eq!(hw.register_writes(), vec![(0xB, 50)]);
    }

    #[test]
    fn test_script_table_bad_width() {
        let mut hw = SimHardware::new(vec![0u8; 8]);
        let image = hw.image_ref();
        let table = TableMatch::new(1, 3, CompareMode::Ge);
        let err = execute_script_table(
            &mut hw,
            &Settings::default(),
            image,
            0,
            0,
            Endpoint::default(),
            table,
        )
        .unwrap_err();
        assert_eq!(err.status(), INVALID_ARGUMENT);
    }

    #[test]
    fn test_delays_are_recorded() {
        let bytes = Script::new().time(250).time_msec(3).done().build();
        let mut hw = SimHardware::new(bytes);
        run(&mut hw, 0, 0).unwrap();
        assert_eq!(
            hw.trace(),
            &[TraceEvent::Delay { us: 250 }, TraceEvent::Delay { us: 3000 }]
        );
        assert_eq!(hw.elapsed_us(), 3250);
    }

    /// An image just past the 16-bit range, filled with an unknown opcode,
    /// with `code` placed at each given offset.
    fn wide_image(parts: &[(usize, Vec<u8>)]) -> Vec<u8> {
        let mut bytes = vec![0xFFu8; 0x10010];
        for (at, code) in parts {
            bytes[*at..*at + code.len()].copy_from_slice(code);
        }
        bytes
    }

    fn run_with(
        hw: &mut SimHardware,
        script: u32,
        ip_wrap: IpWrapMode,
    ) -> Result<ExecStats, IedError> {
        let settings = Settings { ip_wrap, ..Settings::default() };
        let image = hw.image_ref();
        execute_script(hw, &settings, image, script, 0, Endpoint::default())
    }

    #[test]
    fn test_entry_above_16_bits_strict_rejected_before_fetch() {
        let mut hw = SimHardware::new(wide_image(&[(
            0x10005,
            Script::new().zm_reg(0x10, 1).done().build(),
        )]));
        let err = run_with(&mut hw, 0x10005, IpWrapMode::Strict).unwrap_err();
        assert_eq!(err.status(), INVALID_ARGUMENT);
        assert_eq!(hw.dma_reads(), 0);
        assert!(hw.trace().is_empty());

        let image = hw.image_ref();
        let table = TableMatch::new(0, 1, CompareMode::Ge);
        let err = execute_script_table(
            &mut hw,
            &Settings::default(),
            image,
            0x10005,
            0,
            Endpoint::default(),
            table,
        )
        .unwrap_err();
        assert_eq!(err.status(), INVALID_ARGUMENT);
        assert_eq!(hw.dma_reads(), 0);
    }

    #[test]
    fn test_entry_above_16_bits_truncated_once() {
        // The whole instruction comes from 0x0005; nothing is read at 0x10005.
        let mut hw = SimHardware::new(wide_image(&[
            (0x0005, Script::new().zm_reg(0xAA, 5).done().build()),
            (0x10005, Script::new().zm_reg(0x10, 1).done().build()),
        ]));
        let stats = run_with(&mut hw, 0x10005, IpWrapMode::Truncate16).unwrap();
        assert_eq!(hw.register_writes(), vec![(0xAA, 5)]);
        assert_eq!(stats.instructions, 2);
    }

    #[test]
    fn test_strict_header_crossing_16_bit_limit() {
        // ZM_REG at 0xFFF8: its header would end at 0x10001.
        let mut hw = SimHardware::new(wide_image(&[(
            0xFFF8,
            Script::new().zm_reg(0x10, 1).done().build(),
        )]));
        let err = run_with(&mut hw, 0xFFF8, IpWrapMode::Strict).unwrap_err();
        assert_eq!(err, IedError::InstructionPointerOverflow { ip: 0xFFF9, advance: 8 });
        assert!(hw.register_writes().is_empty());
    }

    #[test]
    fn test_strict_instruction_ending_at_16_bit_limit() {
        // ZM_REG at 0xFFF7 ends exactly at 0x10000 and runs; the next fetch
        // would move past it.
        let mut hw = SimHardware::new(wide_image(&[(
            0xFFF7,
            Script::new().zm_reg(0x10, 1).build(),
        )]));
        let err = run_with(&mut hw, 0xFFF7, IpWrapMode::Strict).unwrap_err();
        assert_eq!(err, IedError::InstructionPointerOverflow { ip: 0x10000, advance: 1 });
        assert_eq!(hw.register_writes(), vec![(0x10, 1)]);
    }

    #[test]
    fn test_truncate_header_crossing_16_bit_limit_wraps() {
        // ZM_REG at 0xFFFC with its header in 0xFFFD..0x10005; execution
        // continues at the wrapped 0x0005, not at 0x10005.
        let mut hw = SimHardware::new(wide_image(&[
            (0xFFFC, Script::new().zm_reg(0x20, 2).build()),
            (0x0005, Script::new().done().build()),
        ]));
        let image = hw.image_ref();
        let mut ctx =
            ExecContext::new(image, 0xFFFC, 0, Endpoint::default(), IpWrapMode::Truncate16);
        let stats = execute_script_sub(&mut hw, &Settings::default(), &mut ctx).unwrap();

        assert_eq!(hw.register_writes(), vec![(0x20, 2)]);
        assert!(ctx.completed);
        assert_eq!(ctx.ip, 0x0006);
        assert_eq!(stats.instructions, 2);
    }
}
