// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GPU register file.
//!
//! A dense array of 32-bit words addressed by word index, with typed
//! accessor views over the blocks the pipeline consumes. Registers holding
//! physical addresses store them shifted right by 3 (the bus carries
//! 8-byte-aligned addresses); the accessors undo the shift.
//!
//! Writes themselves are plain stores — the trigger indices (fill value,
//! active framebuffer, transfer trigger, command list trigger, draw
//! triggers, shader upload words) are dispatched by `Gpu::write_reg`, which
//! owns the side effects.

use crate::texture::{TextureConfig, TextureFormat, WrapMode};
use crate::tev::{TevStageConfig, NUM_TEV_STAGES};
use rupica_common::PAddr;

/// Number of 32-bit register words.
pub const NUM_REG_IDS: usize = 0x100;

// ── Memory fill units (trigger on VALUE write) ──────────────────────────────

pub const FILL0_ADDR_START: u32 = 0x004;
pub const FILL0_ADDR_END: u32 = 0x005;
pub const FILL0_VALUE: u32 = 0x006;
pub const FILL1_ADDR_START: u32 = 0x008;
pub const FILL1_ADDR_END: u32 = 0x009;
pub const FILL1_VALUE: u32 = 0x00A;

// ── Framebuffer configuration (two screens) ─────────────────────────────────

pub const FB_BASE: u32 = 0x010;
pub const FB_STRIDE: u32 = 0x8;
pub const FB_OFF_COLOR_ADDR: u32 = 0x0;
pub const FB_OFF_DEPTH_ADDR: u32 = 0x1;
/// `height << 16 | width`.
pub const FB_OFF_DIMS: u32 = 0x2;
pub const FB_OFF_COLOR_FORMAT: u32 = 0x3;
pub const FB_OFF_DEPTH_FORMAT: u32 = 0x4;
/// Writing screen 0's slot presents the frame.
pub const FB_OFF_ACTIVE_FB: u32 = 0x5;

pub const NUM_SCREENS: usize = 2;

// ── Display transfer engine ─────────────────────────────────────────────────

pub const TRANSFER_INPUT_ADDR: u32 = 0x020;
pub const TRANSFER_OUTPUT_ADDR: u32 = 0x021;
/// `height << 16 | width`.
pub const TRANSFER_INPUT_DIMS: u32 = 0x022;
pub const TRANSFER_OUTPUT_DIMS: u32 = 0x023;
/// Input format in bits 0..3, output format in bits 8..11.
pub const TRANSFER_FLAGS: u32 = 0x024;
/// Bit 0 starts the transfer.
pub const TRANSFER_TRIGGER: u32 = 0x025;

// ── Command list processor ──────────────────────────────────────────────────

/// Size of the command list in bytes, shifted right by 3.
pub const CMD_SIZE: u32 = 0x028;
pub const CMD_ADDR: u32 = 0x029;
/// Bit 0 submits the configured command list.
pub const CMD_TRIGGER: u32 = 0x02A;

// ── Texture units ───────────────────────────────────────────────────────────

/// Bit i enables texture unit i.
pub const TEXTURE_ENABLE: u32 = 0x040;
pub const TEXTURE_BASE: u32 = 0x042;
pub const TEXTURE_STRIDE: u32 = 0x4;
pub const TEX_OFF_ADDR: u32 = 0x0;
/// `height << 16 | width`.
pub const TEX_OFF_DIMS: u32 = 0x1;
/// `wrap_s` in bits 0..3, `wrap_t` in bits 8..11.
pub const TEX_OFF_WRAP: u32 = 0x2;
pub const TEX_OFF_FORMAT: u32 = 0x3;

pub const NUM_TEXTURE_UNITS: usize = 3;

// ── TEV stages ──────────────────────────────────────────────────────────────

pub const TEV_BASE: u32 = 0x060;
pub const TEV_STRIDE: u32 = 0x5;

// ── Vertex attributes and draw triggers ─────────────────────────────────────

pub const VERTEX_ATTR_BASE_ADDR: u32 = 0x080;
pub const VERTEX_ATTR_COUNT: u32 = 0x081;
/// 16 words, one per attribute: byte offset in bits 0..12, element format
/// in bits 12..14, component count minus one in bits 16..18. Attribute
/// arrays are planar: element `n` of attribute `i` lives at
/// `base + offset_i + n * element_size_i * components_i`.
pub const VERTEX_ATTR_CONFIG_BASE: u32 = 0x082;
/// Byte offset of the index array (relative to the attribute base) in bits
/// 0..28, index size in bit 31 (0 = u8, 1 = u16).
pub const INDEX_ARRAY_CONFIG: u32 = 0x092;
pub const NUM_VERTICES: u32 = 0x093;
pub const TRIANGLE_TOPOLOGY: u32 = 0x094;
pub const TRIGGER_DRAW: u32 = 0x095;
pub const TRIGGER_DRAW_INDEXED: u32 = 0x096;

pub const NUM_VERTEX_ATTRIBUTES: usize = 16;

// ── Vertex shader configuration ─────────────────────────────────────────────

pub const VS_MAIN_OFFSET: u32 = 0x0A0;
/// Register slot for input attributes 0..7, one nibble each.
pub const VS_INPUT_MAP_LOW: u32 = 0x0A1;
/// Register slot for input attributes 8..15.
pub const VS_INPUT_MAP_HIGH: u32 = 0x0A2;
/// 7 words, one per output register: semantic codes for the x/y/z/w
/// components in bits 0..5, 8..13, 16..21 and 24..29. A semantic code is a
/// lane index into the output vertex: 0..3 position, 4..7 color, 8..9 tc0,
/// 10..11 tc1, 12..13 tc2; anything higher is a scratch lane.
pub const VS_OUTPUT_MAP_BASE: u32 = 0x0A3;
pub const NUM_VS_OUTPUT_REGS: usize = 7;

/// Upload pointer into shader instruction memory (auto-increments).
pub const VS_PROGRAM_OFFSET: u32 = 0x0AA;
pub const VS_PROGRAM_DATA_BASE: u32 = 0x0AB;
pub const VS_PROGRAM_DATA_LEN: u32 = 8;
/// Upload pointer into swizzle memory (auto-increments).
pub const VS_SWIZZLE_OFFSET: u32 = 0x0B3;
pub const VS_SWIZZLE_DATA_BASE: u32 = 0x0B4;
pub const VS_SWIZZLE_DATA_LEN: u32 = 8;
/// Target float uniform in bits 0..7, 32-bit float mode in bit 31.
pub const VS_UNIFORM_SETUP: u32 = 0x0BC;
pub const VS_UNIFORM_DATA_BASE: u32 = 0x0BD;
pub const VS_UNIFORM_DATA_LEN: u32 = 8;

// ── Decoded views ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FramebufferFormat {
    Rgba8 = 0,
    Rgb8 = 1,
    Unknown = 0xFF,
}

impl FramebufferFormat {
    pub fn from_raw(v: u32) -> Self {
        match v & 0x7 {
            0 => Self::Rgba8,
            1 => Self::Rgb8,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryFillConfig {
    pub address_start: PAddr,
    pub address_end: PAddr,
    pub value: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferConfig {
    pub color_buffer_addr: PAddr,
    pub depth_buffer_addr: PAddr,
    pub width: u32,
    pub height: u32,
    pub color_format: FramebufferFormat,
    pub depth_format: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DisplayTransferConfig {
    pub input_address: PAddr,
    pub output_address: PAddr,
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub input_format: FramebufferFormat,
    pub output_format: FramebufferFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandListConfig {
    pub address: PAddr,
    pub size_bytes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AttributeFormat {
    Byte = 0,
    UByte = 1,
    Short = 2,
    Float = 3,
}

impl AttributeFormat {
    pub fn from_raw(v: u32) -> Self {
        match v & 0x3 {
            0 => Self::Byte,
            1 => Self::UByte,
            2 => Self::Short,
            _ => Self::Float,
        }
    }

    pub fn element_size(self) -> u32 {
        match self {
            Self::Byte | Self::UByte => 1,
            Self::Short => 2,
            Self::Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub offset: u32,
    pub format: AttributeFormat,
    pub components: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttributeConfig {
    pub base_address: PAddr,
    pub count: usize,
    pub attributes: [VertexAttribute; NUM_VERTEX_ATTRIBUTES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U8,
    U16,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexArrayConfig {
    pub offset: u32,
    pub format: IndexFormat,
}

// ── Register file ───────────────────────────────────────────────────────────

pub struct Regs {
    words: [u32; NUM_REG_IDS],
}

impl Regs {
    pub fn new() -> Self {
        Self {
            words: [0u32; NUM_REG_IDS],
        }
    }

    pub fn read(&self, index: u32) -> u32 {
        if (index as usize) < NUM_REG_IDS {
            self.words[index as usize]
        } else {
            log::error!("read from unknown register index {index:#X}");
            0
        }
    }

    /// Plain store. Side effects are layered on top by the GPU context.
    pub fn write(&mut self, index: u32, value: u32) {
        if (index as usize) < NUM_REG_IDS {
            self.words[index as usize] = value;
        } else {
            log::error!("write to unknown register index {index:#X} dropped");
        }
    }

    pub fn reset(&mut self) {
        self.words = [0u32; NUM_REG_IDS];
    }

    // ── Typed accessors ─────────────────────────────────────────────────

    pub fn memory_fill(&self, unit: usize) -> MemoryFillConfig {
        let base = if unit == 0 { FILL0_ADDR_START } else { FILL1_ADDR_START };
        MemoryFillConfig {
            address_start: self.read(base) << 3,
            address_end: self.read(base + 1) << 3,
            value: self.read(base + 2),
        }
    }

    pub fn framebuffer(&self, screen: usize) -> FramebufferConfig {
        let base = FB_BASE + screen as u32 * FB_STRIDE;
        let dims = self.read(base + FB_OFF_DIMS);
        FramebufferConfig {
            color_buffer_addr: self.read(base + FB_OFF_COLOR_ADDR) << 3,
            depth_buffer_addr: self.read(base + FB_OFF_DEPTH_ADDR) << 3,
            width: dims & 0xFFFF,
            height: dims >> 16,
            color_format: FramebufferFormat::from_raw(self.read(base + FB_OFF_COLOR_FORMAT)),
            depth_format: self.read(base + FB_OFF_DEPTH_FORMAT),
        }
    }

    pub fn display_transfer(&self) -> DisplayTransferConfig {
        let input_dims = self.read(TRANSFER_INPUT_DIMS);
        let output_dims = self.read(TRANSFER_OUTPUT_DIMS);
        let flags = self.read(TRANSFER_FLAGS);
        DisplayTransferConfig {
            input_address: self.read(TRANSFER_INPUT_ADDR) << 3,
            output_address: self.read(TRANSFER_OUTPUT_ADDR) << 3,
            input_width: input_dims & 0xFFFF,
            input_height: input_dims >> 16,
            output_width: output_dims & 0xFFFF,
            output_height: output_dims >> 16,
            input_format: FramebufferFormat::from_raw(flags & 0xF),
            output_format: FramebufferFormat::from_raw((flags >> 8) & 0xF),
        }
    }

    pub fn command_list(&self) -> CommandListConfig {
        CommandListConfig {
            address: self.read(CMD_ADDR) << 3,
            size_bytes: self.read(CMD_SIZE) << 3,
        }
    }

    pub fn texture_unit(&self, unit: usize) -> TextureConfig {
        let base = TEXTURE_BASE + unit as u32 * TEXTURE_STRIDE;
        let dims = self.read(base + TEX_OFF_DIMS);
        let wrap = self.read(base + TEX_OFF_WRAP);
        TextureConfig {
            enabled: self.read(TEXTURE_ENABLE) & (1 << unit) != 0,
            address: self.read(base + TEX_OFF_ADDR) << 3,
            width: dims & 0xFFFF,
            height: dims >> 16,
            wrap_s: WrapMode::from_raw(wrap & 0xF),
            wrap_t: WrapMode::from_raw((wrap >> 8) & 0xF),
            format: TextureFormat::from_raw(self.read(base + TEX_OFF_FORMAT)),
        }
    }

    pub fn tev_stages(&self) -> [TevStageConfig; NUM_TEV_STAGES] {
        std::array::from_fn(|stage| {
            let base = TEV_BASE + stage as u32 * TEV_STRIDE;
            TevStageConfig::from_words([
                self.read(base),
                self.read(base + 1),
                self.read(base + 2),
                self.read(base + 3),
                self.read(base + 4),
            ])
        })
    }

    pub fn vertex_attributes(&self) -> VertexAttributeConfig {
        VertexAttributeConfig {
            base_address: self.read(VERTEX_ATTR_BASE_ADDR) << 3,
            count: (self.read(VERTEX_ATTR_COUNT) as usize).min(NUM_VERTEX_ATTRIBUTES),
            attributes: std::array::from_fn(|i| {
                let word = self.read(VERTEX_ATTR_CONFIG_BASE + i as u32);
                VertexAttribute {
                    offset: word & 0xFFF,
                    format: AttributeFormat::from_raw((word >> 12) & 0x3),
                    components: ((word >> 16) & 0x3) + 1,
                }
            }),
        }
    }

    pub fn index_array(&self) -> IndexArrayConfig {
        let word = self.read(INDEX_ARRAY_CONFIG);
        IndexArrayConfig {
            offset: word & 0x0FFF_FFFF,
            format: if word >> 31 != 0 {
                IndexFormat::U16
            } else {
                IndexFormat::U8
            },
        }
    }

    pub fn num_vertices(&self) -> u32 {
        self.read(NUM_VERTICES)
    }

    pub fn triangle_topology_raw(&self) -> u32 {
        self.read(TRIANGLE_TOPOLOGY)
    }

    pub fn vs_main_offset(&self) -> u32 {
        self.read(VS_MAIN_OFFSET)
    }

    /// Input register slot for each of the 16 vertex attributes.
    pub fn vs_input_map(&self) -> [usize; NUM_VERTEX_ATTRIBUTES] {
        let low = self.read(VS_INPUT_MAP_LOW);
        let high = self.read(VS_INPUT_MAP_HIGH);
        std::array::from_fn(|i| {
            let word = if i < 8 { low } else { high };
            ((word >> ((i % 8) * 4)) & 0xF) as usize
        })
    }

    /// Output-vertex lane for each component of the 7 output registers.
    pub fn vs_output_map(&self) -> [[usize; 4]; NUM_VS_OUTPUT_REGS] {
        std::array::from_fn(|reg| {
            let word = self.read(VS_OUTPUT_MAP_BASE + reg as u32);
            std::array::from_fn(|comp| ((word >> (comp * 8)) & 0x1F) as usize)
        })
    }
}

impl Default for Regs {
    fn default() -> Self {
        Self::new()
    }
}
