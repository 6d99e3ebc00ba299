// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod settings;
pub mod types;

pub use types::*;
