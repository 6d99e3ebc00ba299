// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Central GPU context.
//!
//! Owns the register file and the shader engine, and wires register writes
//! to their side effects: memory fills, display transfers, command list
//! submission, draws, shader/uniform uploads and frame presentation. The
//! host drives it through the MMIO surface at `MMIO_BASE` plus `tick()`,
//! and drains `take_events()` for interrupts and presentation requests.
//!
//! The core is single-threaded and cooperative: every entry point runs to
//! completion before returning, and ordering follows submission order.

use rupica_common::settings::Settings;
use rupica_common::{PAddr, VAddr, FRAME_TICKS};

use crate::command_processor;
use crate::float24::Float24;
use crate::math::Vec4;
use crate::memory::GuestMemory;
use crate::primitive_assembly::{PrimitiveAssembler, TriangleTopology};
use crate::rasterizer;
use crate::registers::{
    AttributeFormat, IndexFormat, Regs, VertexAttributeConfig, CMD_TRIGGER, FB_BASE,
    FB_OFF_ACTIVE_FB, FB_OFF_COLOR_ADDR, FB_OFF_COLOR_FORMAT, FB_OFF_DEPTH_ADDR, FB_OFF_DIMS,
    FILL0_VALUE, FILL1_VALUE, NUM_REG_IDS, TRANSFER_TRIGGER, TRIGGER_DRAW, TRIGGER_DRAW_INDEXED,
    VS_PROGRAM_DATA_BASE, VS_PROGRAM_DATA_LEN, VS_PROGRAM_OFFSET, VS_SWIZZLE_DATA_BASE,
    VS_SWIZZLE_DATA_LEN, VS_SWIZZLE_OFFSET, VS_UNIFORM_DATA_BASE, VS_UNIFORM_DATA_LEN,
    VS_UNIFORM_SETUP,
};
use crate::shader::{InputVertex, ShaderDebug, ShaderEngine};

/// Base of the GPU register region in the guest address space.
pub const MMIO_BASE: VAddr = 0x1EF0_0000;

const FB0_ACTIVE_FB: u32 = FB_BASE + FB_OFF_ACTIVE_FB;
const VS_PROGRAM_DATA_LAST: u32 = VS_PROGRAM_DATA_BASE + VS_PROGRAM_DATA_LEN - 1;
const VS_SWIZZLE_DATA_LAST: u32 = VS_SWIZZLE_DATA_BASE + VS_SWIZZLE_DATA_LEN - 1;
const VS_UNIFORM_DATA_LAST: u32 = VS_UNIFORM_DATA_BASE + VS_UNIFORM_DATA_LEN - 1;

/// Events surfaced to the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuEvent {
    /// PDC0: one display line scanned out.
    LineInterrupt,
    /// PDC1: vertical blank reached.
    VblankInterrupt,
    /// A frame is ready; the host presents it and the guest waits for
    /// vblank.
    FramePresented,
}

pub struct Gpu {
    regs: Regs,
    shader: ShaderEngine,
    settings: Settings,
    /// Current vertical screen line.
    cur_line: u32,
    /// Ticks accumulated toward the next line.
    line_ticks: u64,
    events: Vec<GpuEvent>,
    uniform_write_buffer: [u32; 4],
    uniform_write_count: usize,
}

impl Gpu {
    pub fn new(settings: Settings) -> Self {
        let mut gpu = Self {
            regs: Regs::new(),
            shader: ShaderEngine::new(),
            settings,
            cur_line: 0,
            line_ticks: 0,
            events: Vec::new(),
            uniform_write_buffer: [0u32; 4],
            uniform_write_count: 0,
        };
        gpu.apply_boot_config();
        gpu
    }

    /// Clear all state back to power-on defaults.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.shader.reset();
        self.cur_line = 0;
        self.line_ticks = 0;
        self.events.clear();
        self.uniform_write_count = 0;
        self.apply_boot_config();
    }

    /// Default framebuffer setup as used by system applets: both screens in
    /// VRAM, RGBA8 color.
    fn apply_boot_config(&mut self) {
        self.regs.write(FB_BASE + FB_OFF_COLOR_ADDR, 0x181E_6000 >> 3);
        self.regs.write(FB_BASE + FB_OFF_DEPTH_ADDR, 0x1822_C800 >> 3);
        self.regs.write(FB_BASE + FB_OFF_DIMS, (240 << 16) | 400);
        self.regs.write(FB_BASE + FB_OFF_COLOR_FORMAT, 0);

        let sub = FB_BASE + crate::registers::FB_STRIDE;
        self.regs.write(sub + FB_OFF_COLOR_ADDR, 0x1848_F000 >> 3);
        self.regs.write(sub + FB_OFF_DEPTH_ADDR, 0x184C_7800 >> 3);
        self.regs.write(sub + FB_OFF_DIMS, (240 << 16) | 320);
        self.regs.write(sub + FB_OFF_COLOR_FORMAT, 0);
    }

    pub fn regs(&self) -> &Regs {
        &self.regs
    }

    pub fn shader_debug(&self) -> ShaderDebug {
        self.shader.debug
    }

    /// Drain pending interrupt/presentation events.
    pub fn take_events(&mut self) -> Vec<GpuEvent> {
        std::mem::take(&mut self.events)
    }

    // ── MMIO surface ────────────────────────────────────────────────────

    /// Read a register through the MMIO window. Only 32-bit accesses are
    /// defined; others are dropped with a diagnostic.
    pub fn mmio_read(&self, addr: VAddr, width: u32) -> u32 {
        if width != 4 {
            log::error!(
                "unsupported {}-bit GPU register read at {addr:#010X}",
                width * 8
            );
            return 0;
        }
        let Some(offset) = addr.checked_sub(MMIO_BASE) else {
            log::error!("GPU register read below MMIO base: {addr:#010X}");
            return 0;
        };
        self.regs.read(offset / 4)
    }

    /// Write a register through the MMIO window.
    pub fn mmio_write(&mut self, mem: &mut dyn GuestMemory, addr: VAddr, width: u32, value: u32) {
        if width != 4 {
            log::error!(
                "unsupported {}-bit GPU register write of {value:#X} at {addr:#010X}",
                width * 8
            );
            return;
        }
        let Some(offset) = addr.checked_sub(MMIO_BASE) else {
            log::error!("GPU register write below MMIO base: {addr:#010X}");
            return;
        };
        self.write_reg(mem, offset / 4, value, 0xFFFF_FFFF);
    }

    // ── Shader upload surface ───────────────────────────────────────────

    pub fn submit_shader_word(&mut self, addr: u32, value: u32) {
        self.shader.submit_shader_word(addr, value);
    }

    pub fn submit_swizzle_word(&mut self, addr: u32, value: u32) {
        self.shader.submit_swizzle_word(addr, value);
    }

    pub fn set_float_uniform(&mut self, index: usize, value: Vec4<Float24>) {
        self.shader.set_float_uniform(index, value);
    }

    // ── Register write dispatch ─────────────────────────────────────────

    /// Masked register write; the trigger indices dispatch their side
    /// effects synchronously.
    pub fn write_reg(&mut self, mem: &mut dyn GuestMemory, index: u32, value: u32, mask: u32) {
        if index as usize >= NUM_REG_IDS {
            log::error!("write to unknown register index {index:#X} dropped");
            return;
        }
        let value = (self.regs.read(index) & !mask) | (value & mask);
        self.regs.write(index, value);
        log::trace!("reg[{index:#05X}] = {value:#010X}");

        match index {
            FILL0_VALUE | FILL1_VALUE => {
                let unit = (index == FILL1_VALUE) as usize;
                crate::transfer::memory_fill(mem, &self.regs.memory_fill(unit));
            }

            FB0_ACTIVE_FB => {
                self.events.push(GpuEvent::FramePresented);
            }

            TRANSFER_TRIGGER if value & 1 != 0 => {
                crate::transfer::display_transfer(mem, &self.regs.display_transfer());
            }

            CMD_TRIGGER if value & 1 != 0 => {
                self.run_command_list(mem);
            }

            TRIGGER_DRAW => self.draw(mem, false),
            TRIGGER_DRAW_INDEXED => self.draw(mem, true),

            VS_PROGRAM_DATA_BASE..=VS_PROGRAM_DATA_LAST => {
                let offset = self.regs.read(VS_PROGRAM_OFFSET);
                self.shader.submit_shader_word(offset, value);
                self.regs.write(VS_PROGRAM_OFFSET, offset + 1);
            }

            VS_SWIZZLE_DATA_BASE..=VS_SWIZZLE_DATA_LAST => {
                let offset = self.regs.read(VS_SWIZZLE_OFFSET);
                self.shader.submit_swizzle_word(offset, value);
                self.regs.write(VS_SWIZZLE_OFFSET, offset + 1);
            }

            VS_UNIFORM_SETUP => {
                self.uniform_write_count = 0;
            }

            VS_UNIFORM_DATA_BASE..=VS_UNIFORM_DATA_LAST => {
                self.queue_uniform_word(value);
            }

            _ => {}
        }
    }

    /// Accumulate uniform upload words; a full vector commits to the
    /// uniform file and advances the target index.
    fn queue_uniform_word(&mut self, value: u32) {
        self.uniform_write_buffer[self.uniform_write_count] = value;
        self.uniform_write_count += 1;

        let setup = self.regs.read(VS_UNIFORM_SETUP);
        let float32 = setup >> 31 != 0;
        let needed = if float32 { 4 } else { 3 };
        if self.uniform_write_count < needed {
            return;
        }
        self.uniform_write_count = 0;

        let index = setup & 0xFF;
        let buf = self.uniform_write_buffer;
        let uniform = if float32 {
            Vec4::new(
                Float24::from_f32(f32::from_bits(buf[0])),
                Float24::from_f32(f32::from_bits(buf[1])),
                Float24::from_f32(f32::from_bits(buf[2])),
                Float24::from_f32(f32::from_bits(buf[3])),
            )
        } else {
            // Three words hold four 24-bit floats, w first.
            Vec4::new(
                Float24::from_raw(buf[2] & 0xFF_FFFF),
                Float24::from_raw(((buf[1] & 0xFFFF) << 8) | (buf[2] >> 24)),
                Float24::from_raw(((buf[0] & 0xFF) << 16) | (buf[1] >> 16)),
                Float24::from_raw(buf[0] >> 8),
            )
        };
        self.shader.set_float_uniform(index as usize, uniform);
        self.regs
            .write(VS_UNIFORM_SETUP, (setup & 0x8000_0000) | ((index + 1) & 0xFF));
    }

    // ── Command list submission ─────────────────────────────────────────

    fn run_command_list(&mut self, mem: &mut dyn GuestMemory) {
        let config = self.regs.command_list();
        if self.settings.trace_command_lists {
            log::debug!(
                "command list: {} bytes at {:#010X}",
                config.size_bytes,
                config.address
            );
        }

        let num_words = (config.size_bytes / 4) as usize;
        let mut words = vec![0u32; num_words];
        for (i, word) in words.iter_mut().enumerate() {
            *word = mem.read_u32(config.address + i as u32 * 4);
        }

        command_processor::process_command_list(&words, &mut |index, value, mask| {
            self.write_reg(mem, index, value, mask);
        });
    }

    // ── Draws ───────────────────────────────────────────────────────────

    /// Launch a draw: fetch each vertex, shade it, assemble triangles and
    /// rasterize them. A shader fault abandons the rest of the draw.
    fn draw(&mut self, mem: &mut dyn GuestMemory, indexed: bool) {
        let attr_cfg = self.regs.vertex_attributes();
        let index_cfg = self.regs.index_array();
        let num_vertices = self.regs.num_vertices();
        let topology = TriangleTopology::from_raw(self.regs.triangle_topology_raw());
        let mut assembler = PrimitiveAssembler::new(topology);

        let regs = &self.regs;
        let shader = &mut self.shader;

        for n in 0..num_vertices {
            let vertex_index = if indexed {
                let elem_size = match index_cfg.format {
                    IndexFormat::U8 => 1,
                    IndexFormat::U16 => 2,
                };
                let addr = attr_cfg.base_address + index_cfg.offset + n * elem_size;
                match index_cfg.format {
                    IndexFormat::U8 => mem.read_u8(addr) as u32,
                    IndexFormat::U16 => mem.read_u16(addr) as u32,
                }
            } else {
                n
            };

            let input = load_vertex(&*mem, &attr_cfg, vertex_index);
            let vtx = match shader.run(regs, &input, attr_cfg.count) {
                Ok(vtx) => vtx,
                Err(err) => {
                    log::error!("vertex shader fault: {err}; draw aborted");
                    return;
                }
            };

            assembler.submit_vertex(vtx, &mut |v0, v1, v2| {
                rasterizer::process_triangle(regs, mem, v0, v1, v2);
            });
        }

        if self.settings.dump_shaders {
            log::debug!(
                "vertex shader high-water marks: pc {}, operand descriptors {}",
                shader.debug.max_offset,
                shader.debug.max_opdesc_id
            );
        }
    }

    // ── Frame pulse ─────────────────────────────────────────────────────

    /// Advance the display by `cycles` CPU ticks: every scanned line emits
    /// a line interrupt, a full screen emits vblank and requests a frame
    /// swap.
    pub fn tick(&mut self, cycles: u64) {
        let height = self.regs.framebuffer(0).height.max(1) as u64;
        let ticks_per_line = (FRAME_TICKS / height).max(1);

        self.line_ticks += cycles;
        while self.line_ticks >= ticks_per_line {
            self.line_ticks -= ticks_per_line;
            self.cur_line += 1;
            self.events.push(GpuEvent::LineInterrupt);

            if self.cur_line as u64 >= height {
                self.cur_line = 0;
                self.events.push(GpuEvent::VblankInterrupt);
                self.events.push(GpuEvent::FramePresented);
            }
        }
    }
}

impl Default for Gpu {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Fetch one vertex's attributes from guest memory. Missing components
/// default to (0, 0, 0, 1).
fn load_vertex(
    mem: &dyn GuestMemory,
    cfg: &VertexAttributeConfig,
    vertex_index: u32,
) -> InputVertex {
    let mut input = InputVertex::default();

    for i in 0..cfg.count {
        let attr = cfg.attributes[i];
        let elem_size = attr.format.element_size();
        let stride = elem_size * attr.components;
        let base: PAddr = cfg.base_address + attr.offset + vertex_index * stride;

        let mut value = [0.0f32, 0.0, 0.0, 1.0];
        for (c, lane) in value.iter_mut().enumerate().take(attr.components as usize) {
            let addr = base + c as u32 * elem_size;
            *lane = match attr.format {
                AttributeFormat::Byte => mem.read_u8(addr) as i8 as f32,
                AttributeFormat::UByte => mem.read_u8(addr) as f32,
                AttributeFormat::Short => mem.read_u16(addr) as i16 as f32,
                AttributeFormat::Float => f32::from_bits(mem.read_u32(addr)),
            };
        }

        input.attr[i] = Vec4::new(
            Float24::from_f32(value[0]),
            Float24::from_f32(value[1]),
            Float24::from_f32(value[2]),
            Float24::from_f32(value[3]),
        );
    }

    input
}
