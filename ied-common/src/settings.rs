// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Interpreter settings, populated from the `[Interpreter]` and `[Patch]`
/// sections of the config INI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Deepest SUB_DIRECT / table-selector nesting allowed.
    pub max_call_depth: u32,
    /// How the 16-bit instruction pointer behaves past 0xFFFF.
    pub ip_wrap: IpWrapMode,
    /// Delay between two POLL_LW condition checks.
    pub poll_interval_us: u32,
    /// Per-endpoint register windows rebased before register access.
    pub patch_windows: Vec<PatchWindow>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_call_depth: 8,
            ip_wrap: IpWrapMode::Strict,
            poll_interval_us: 100,
            patch_windows: PatchWindow::defaults(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpWrapMode {
    /// Advancing past 0xFFFF is an error.
    Strict,
    /// Advancing past 0xFFFF wraps modulo 0x10000.
    Truncate16,
}

impl IpWrapMode {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "truncate16" | "truncate" | "wrap" | "1" => Self::Truncate16,
            _ => Self::Strict,
        }
    }
}

/// Which endpoint index rebases a patch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchSelector {
    OutputResource,
    Link,
}

impl PatchSelector {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "or" | "sor" | "output" => Some(Self::OutputResource),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

/// Register addresses in `[start, end)` are moved by `index * stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchWindow {
    pub start: u32,
    pub end: u32,
    pub stride: u32,
    pub selector: PatchSelector,
}

impl PatchWindow {
    /// SOR control block per output resource, DP link block per link.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                start: 0x0061_C000,
                end: 0x0061_C800,
                stride: 0x800,
                selector: PatchSelector::OutputResource,
            },
            Self {
                start: 0x0061_C800,
                end: 0x0061_C900,
                stride: 0x80,
                selector: PatchSelector::Link,
            },
        ]
    }

    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }
}
