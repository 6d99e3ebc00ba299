// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Debug knobs consulted by the GPU core. The host populates this from its
/// own configuration source.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Log the vertex shader high-water marks after each draw.
    pub dump_shaders: bool,
    /// Log each submitted command list before it is processed.
    pub trace_command_lists: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dump_shaders: false,
            trace_command_lists: false,
        }
    }
}
