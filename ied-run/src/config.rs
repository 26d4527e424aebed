// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use ied_common::settings::{PatchSelector, PatchWindow};
use ied_common::{IpWrapMode, Settings};
use ied_vm::sim::SimHardware;
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DPCD_SECTION_PREFIX: &str = "Dpcd.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load {path}: {source}")]
    Load { path: PathBuf, source: ini::Error },

    #[error("[{section}] {key}: invalid value {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Interpreter settings plus the initial state of the simulated hardware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub settings: Settings,
    pub registers: Vec<(u32, u32)>,
    pub crtc: Vec<(u8, u8)>,
    /// `(port, address, value)`
    pub dpcd: Vec<(u8, u32, u8)>,
}

impl RunConfig {
    /// Seed `hw` with the configured register, CRTC and DPCD values.
    pub fn apply(&self, hw: &mut SimHardware) {
        for &(address, value) in &self.registers {
            hw.set_register(address, value);
        }
        for &(index, value) in &self.crtc {
            hw.set_crtc(index, value);
        }
        for &(port, address, value) in &self.dpcd {
            hw.set_dpcd(port, address, value);
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn number<T: TryFrom<u32>>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    parse_number(value)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| invalid(section, key, value))
}

/// `start,end,stride,or|link`
fn parse_patch_window(value: &str) -> Option<PatchWindow> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [start, end, stride, selector] = parts.as_slice() else {
        return None;
    };
    let window = PatchWindow {
        start: parse_number(start)?,
        end: parse_number(end)?,
        stride: parse_number(stride)?,
        selector: PatchSelector::parse(selector)?,
    };
    (window.start < window.end).then_some(window)
}

/// Load the run configuration. Without a path, defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig, ConfigError> {
    let Some(path) = path else {
        info!("No config given, using defaults");
        return Ok(RunConfig::default());
    };

    info!("Loading config from: {}", path.display());
    let conf = Ini::load_from_file(path).map_err(|source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&conf)
}

pub fn parse_config(conf: &Ini) -> Result<RunConfig, ConfigError> {
    let mut config = RunConfig::default();
    let settings = &mut config.settings;

    // [Interpreter]
    if let Some(section) = conf.section(Some("Interpreter")) {
        if let Some(depth) = section.get("max_call_depth") {
            settings.max_call_depth = number("Interpreter", "max_call_depth", depth)?;
        }
        if let Some(wrap) = section.get("ip_wrap") {
            settings.ip_wrap = IpWrapMode::from_str_or_default(wrap);
            debug!("IP wrap mode: {:?}", settings.ip_wrap);
        }
        if let Some(interval) = section.get("poll_interval_us") {
            settings.poll_interval_us = number("Interpreter", "poll_interval_us", interval)?;
        }
    }

    // [Patch] replaces the built-in windows when present.
    if let Some(section) = conf.section(Some("Patch")) {
        let mut windows = Vec::new();
        for (name, value) in section.iter() {
            let window = parse_patch_window(value).ok_or_else(|| invalid("Patch", name, value))?;
            debug!("Patch window {}: {:?}", name, window);
            windows.push(window);
        }
        settings.patch_windows = windows;
    }

    // [Registers]
    if let Some(section) = conf.section(Some("Registers")) {
        for (key, value) in section.iter() {
            let address = number("Registers", key, key)?;
            config.registers.push((address, number("Registers", key, value)?));
        }
    }

    // [Crtc]
    if let Some(section) = conf.section(Some("Crtc")) {
        for (key, value) in section.iter() {
            let index = number("Crtc", key, key)?;
            config.crtc.push((index, number("Crtc", key, value)?));
        }
    }

    // [Dpcd.<port>]
    for (name, section) in conf.iter() {
        let Some(name) = name else { continue };
        let Some(port) = name.strip_prefix(DPCD_SECTION_PREFIX) else {
            continue;
        };
        let port: u8 = number(name, "", port)?;
        for (key, value) in section.iter() {
            let address = number(name, key, key)?;
            config.dpcd.push((port, address, number(name, key, value)?));
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number(" 0x1F "), Some(0x1F));
        assert_eq!(parse_number("0X0061C004"), Some(0x0061_C004));
        assert_eq!(parse_number("0xZZ"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_no_config_is_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            "[Interpreter]\n\
             max_call_depth = 4\n\
             ip_wrap = truncate16\n\
             poll_interval_us = 250\n\
             \n\
             [Registers]\n\
             0x0061C004 = 0x1\n\
             0x1000 = 7\n\
             \n\
             [Crtc]\n\
             0x3C = 0xA5\n\
             \n\
             [Dpcd.2]\n\
             0x002 = 0x84\n\
             \n\
             [Patch]\n\
             sor = 0x0061C000,0x0061C800,0x800,or\n",
        );
        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.settings.max_call_depth, 4);
        assert_eq!(config.settings.ip_wrap, IpWrapMode::Truncate16);
        assert_eq!(config.settings.poll_interval_us, 250);
        assert_eq!(config.settings.patch_windows.len(), 1);
        assert_eq!(config.settings.patch_windows[0], PatchWindow::defaults()[0]);
        assert_eq!(config.registers, vec![(0x0061_C004, 1), (0x1000, 7)]);
        assert_eq!(config.crtc, vec![(0x3C, 0xA5)]);
        assert_eq!(config.dpcd, vec![(2, 0x002, 0x84)]);

        let mut hw = SimHardware::new(Vec::new());
        config.apply(&mut hw);
        assert_eq!(hw.register(0x1000), 7);
        assert_eq!(hw.crtc(0x3C), 0xA5);
        assert_eq!(hw.dpcd(2, 0x002), 0x84);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let file = write_config("[Interpreter]\npoll_interval_us = 10\n");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.settings.poll_interval_us, 10);
        assert_eq!(config.settings.max_call_depth, Settings::default().max_call_depth);
        assert_eq!(config.settings.patch_windows, PatchWindow::defaults());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[Crtc]\n0x3C = 0x1FF\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref section, .. } if section == "Crtc"));

        let file = write_config("[Patch]\nsor = 0x100,0x80,0x10,or\n");
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::InvalidValue { .. })
        ));

        let file = write_config("[Patch]\nsor = 0x100,0x200,0x10,bogus\n");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(dir.path().join("absent.ini").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }
}
