// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Endpoint register patching.
//!
//! Scripts are written against the registers of output resource 0 and
//! link 0. Before a register is touched, addresses that fall inside a
//! per-endpoint window are moved to the block of the endpoint the script
//! is running for.

use ied_common::settings::{PatchSelector, PatchWindow};
use ied_common::RegAddr;

use crate::context::ExecContext;

#[derive(Debug, Clone, Copy)]
pub struct AddressPatcher<'a> {
    windows: &'a [PatchWindow],
}

impl<'a> AddressPatcher<'a> {
    pub fn new(windows: &'a [PatchWindow]) -> Self {
        Self { windows }
    }

    /// Rebase `address` for the endpoint of `ctx`. The first matching
    /// window wins; addresses outside every window are returned unchanged.
    pub fn patch(&self, ctx: &ExecContext, address: RegAddr) -> RegAddr {
        let Some(window) = self.windows.iter().find(|w| w.contains(address)) else {
            return address;
        };
        let index = match window.selector {
            PatchSelector::OutputResource => ctx.or_index,
            PatchSelector::Link => ctx.link_index,
        };
        let patched = address.wrapping_add(u32::from(index).wrapping_mul(window.stride));
        if patched != address {
            log::trace!("IED: patched register 0x{:08X} -> 0x{:08X}", address, patched);
        }
        patched
    }
}
