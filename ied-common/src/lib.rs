// SPDX-FileCopyrightText: 2025 iedvm contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod error;
pub mod settings;
pub mod types;

pub use error::{IedError, StatusCode};
pub use settings::{IpWrapMode, Settings};
pub use types::*;
