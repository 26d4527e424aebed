// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory hardware backend.
//!
//! Holds the script image, a sparse register file, the CRTC bank and DPCD
//! space per AUX port. Every side effect is appended to a trace so a run
//! can be inspected afterwards. Used by the unit tests and by `ied-run` to
//! dry-run scripts pulled out of a firmware dump.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use ied_common::{is_dma_aligned, IedError, ImageOffset, RegAddr, DMA_ALIGNMENT};

use crate::hardware::{AuxChannel, AuxRequest, ImageRef, RegisterAccess, ScriptImage, Timer};

/// One observable side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    RegisterWrite { address: RegAddr, value: u32 },
    CrtcWrite { index: u8, value: u8 },
    Aux { port: u8, register: u32, request: AuxRequest },
    Delay { us: u32 },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::RegisterWrite { address, value } => {
                write!(f, "REG  [0x{:08X}] <- 0x{:08X}", address, value)
            }
            Self::CrtcWrite { index, value } => write!(f, "CRTC [0x{:02X}] <- 0x{:02X}", index, value),
            Self::Aux { port, register, request: AuxRequest::Read } => {
                write!(f, "AUX  {}:0x{:05X} read", port, register)
            }
            Self::Aux { port, register, request: AuxRequest::Write(value) } => {
                write!(f, "AUX  {}:0x{:05X} <- 0x{:02X}", port, register, value)
            }
            Self::Delay { us } => write!(f, "WAIT {} us", us),
        }
    }
}

#[derive(Debug)]
pub struct SimHardware {
    image: Vec<u8>,
    registers: HashMap<RegAddr, u32>,
    /// Values handed out by successive reads before falling back to `registers`.
    sequences: HashMap<RegAddr, VecDeque<u32>>,
    crtc: [u8; 256],
    dpcd: HashMap<(u8, u32), u8>,
    failing_registers: HashSet<RegAddr>,
    failing_aux: HashSet<u32>,
    trace: Vec<TraceEvent>,
    elapsed_us: u64,
    yields: u32,
    dma_reads: usize,
}

impl SimHardware {
    /// Wrap a raw image. The image is zero-padded to a whole number of DMA
    /// words.
    pub fn new(mut image: Vec<u8>) -> Self {
        let padded = image.len().next_multiple_of(DMA_ALIGNMENT as usize);
        image.resize(padded, 0);
        Self {
            image,
            registers: HashMap::new(),
            sequences: HashMap::new(),
            crtc: [0; 256],
            dpcd: HashMap::new(),
            failing_registers: HashSet::new(),
            failing_aux: HashSet::new(),
            trace: Vec::new(),
            elapsed_us: 0,
            yields: 0,
            dma_reads: 0,
        }
    }

    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(0, self.image.len() as u32)
    }

    pub fn set_register(&mut self, address: RegAddr, value: u32) {
        self.registers.insert(address, value);
    }

    /// Current register value; unset registers read as zero.
    pub fn register(&self, address: RegAddr) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Queue values returned by the next reads of `address`. The last one
    /// sticks once the queue drains.
    pub fn push_register_sequence(&mut self, address: RegAddr, values: &[u32]) {
        self.sequences
            .entry(address)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn set_crtc(&mut self, index: u8, value: u8) {
        self.crtc[usize::from(index)] = value;
    }

    pub fn crtc(&self, index: u8) -> u8 {
        self.crtc[usize::from(index)]
    }

    pub fn set_dpcd(&mut self, port: u8, register: u32, value: u8) {
        self.dpcd.insert((port, register), value);
    }

    pub fn dpcd(&self, port: u8, register: u32) -> u8 {
        self.dpcd.get(&(port, register)).copied().unwrap_or(0)
    }

    /// Make every access to `address` fail.
    pub fn fail_register(&mut self, address: RegAddr) {
        self.failing_registers.insert(address);
    }

    /// Make every AUX transaction on DPCD `register` fail.
    pub fn fail_aux(&mut self, register: u32) {
        self.failing_aux.insert(register);
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn register_writes(&self) -> Vec<(RegAddr, u32)> {
        self.trace
            .iter()
            .filter_map(|e| match *e {
                TraceEvent::RegisterWrite { address, value } => Some((address, value)),
                _ => None,
            })
            .collect()
    }

    pub fn aux_transactions(&self) -> Vec<(u8, u32, AuxRequest)> {
        self.trace
            .iter()
            .filter_map(|e| match *e {
                TraceEvent::Aux { port, register, request } => Some((port, register, request)),
                _ => None,
            })
            .collect()
    }

    /// Total simulated time spent in delays.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn yields(&self) -> u32 {
        self.yields
    }

    /// Number of DMA transfers issued against the image.
    pub fn dma_reads(&self) -> usize {
        self.dma_reads
    }

    fn check_register(&self, address: RegAddr) -> Result<(), IedError> {
        if self.failing_registers.contains(&address) {
            return Err(IedError::Register(address));
        }
        Ok(())
    }
}

impl ScriptImage for SimHardware {
    fn dma_read(
        &mut self,
        image: &ImageRef,
        offset: ImageOffset,
        buf: &mut [u8],
    ) -> Result<(), IedError> {
        if !is_dma_aligned(offset) || !is_dma_aligned(buf.len() as u32) {
            return Err(IedError::InvalidArgument(format!(
                "unaligned DMA of {} bytes at 0x{:X}",
                buf.len(),
                offset
            )));
        }

        // `offset` is relative to the image, the backing buffer is the
        // whole aperture.
        let size = buf.len();
        let dma_error = || IedError::Dma { offset, size };
        let end = (offset as usize).checked_add(size).ok_or_else(dma_error)?;
        if end > image.size as usize {
            return Err(dma_error());
        }
        let start = (image.base as usize)
            .checked_add(offset as usize)
            .ok_or_else(dma_error)?;
        let bytes = start
            .checked_add(size)
            .and_then(|stop| self.image.get(start..stop))
            .ok_or_else(dma_error)?;

        buf.copy_from_slice(bytes);
        self.dma_reads += 1;
        Ok(())
    }
}

impl RegisterAccess for SimHardware {
    fn read_register(&mut self, address: RegAddr) -> Result<u32, IedError> {
        self.check_register(address)?;
        if let Some(value) = self.sequences.get_mut(&address).and_then(|q| q.pop_front()) {
            self.registers.insert(address, value);
            return Ok(value);
        }
        Ok(self.register(address))
    }

    fn write_register(&mut self, address: RegAddr, value: u32) -> Result<(), IedError> {
        self.check_register(address)?;
        self.registers.insert(address, value);
        self.trace.push(TraceEvent::RegisterWrite { address, value });
        Ok(())
    }

    fn read_crtc(&mut self, index: u8) -> Result<u8, IedError> {
        Ok(self.crtc(index))
    }

    fn write_crtc(&mut self, index: u8, value: u8) -> Result<(), IedError> {
        self.set_crtc(index, value);
        self.trace.push(TraceEvent::CrtcWrite { index, value });
        Ok(())
    }
}

impl AuxChannel for SimHardware {
    fn aux_transaction(
        &mut self,
        port: u8,
        register: u32,
        request: AuxRequest,
    ) -> Result<u8, IedError> {
        if self.failing_aux.contains(&register) {
            let op = match request {
                AuxRequest::Read => "read",
                AuxRequest::Write(_) => "write",
            };
            return Err(IedError::Aux { port, register, op });
        }

        self.trace.push(TraceEvent::Aux { port, register, request });
        match request {
            AuxRequest::Read => Ok(self.dpcd(port, register)),
            AuxRequest::Write(value) => {
                self.set_dpcd(port, register, value);
                Ok(value)
            }
        }
    }
}

impl Timer for SimHardware {
    fn spin_wait_us(&mut self, us: u32) {
        self.elapsed_us += u64::from(us);
        self.trace.push(TraceEvent::Delay { us });
    }

    fn yield_now(&mut self) {
        self.yields += 1;
    }
}
