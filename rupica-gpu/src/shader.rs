// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! PICA vertex shader virtual machine.
//!
//! The shader unit executes a program over 24-bit float vector registers:
//! 16 input registers fed from the vertex attributes, 16 temporaries, 96
//! float uniform constants, and 7 output registers routed into the output
//! vertex through per-component semantic codes. Programs and their operand
//! descriptors (swizzle patterns) live in two separate 1024-word banks
//! uploaded by the host.
//!
//! ## Instruction word (32 bits, register-access format)
//!
//! | Bits    | Field               |
//! |---------|---------------------|
//! | 6:0     | Operand descriptor  |
//! | 11:7    | Source 2 register   |
//! | 18:12   | Source 1 register   |
//! | 20:19   | Address register    |
//! | 25:21   | Destination         |
//! | 31:26   | Opcode              |
//!
//! Flow-control instructions reuse bits 21:10 as the jump target and 9:0 as
//! an instruction count.
//!
//! ## Swizzle pattern word (32 bits)
//!
//! | Bits    | Field               |
//! |---------|---------------------|
//! | 3:0     | Destination mask (bit 3 = x) |
//! | 4       | Negate source 1     |
//! | 12:5    | Source 1 selectors  |
//! | 13      | Negate source 2     |
//! | 21:14   | Source 2 selectors  |

use thiserror::Error;

use crate::float24::Float24;
use crate::math::{Vec2, Vec3, Vec4};
use crate::registers::{Regs, NUM_VERTEX_ATTRIBUTES, NUM_VS_OUTPUT_REGS};

/// Instruction bank size in words.
pub const SHADER_CODE_SIZE: usize = 1024;
/// Swizzle bank size in words.
pub const SWIZZLE_DATA_SIZE: usize = 1024;
/// Number of float uniform constants.
pub const NUM_FLOAT_UNIFORMS: usize = 96;

const NUM_INPUT_REGS: usize = 16;
const NUM_TEMP_REGS: usize = 16;
const CALL_STACK_SIZE: usize = 8;
/// Call stack sentinel, distinct from any valid program counter.
const INVALID_ADDRESS: u32 = 0xFFFF_FFFF;

/// Fatal shader faults. The draw that hit one is abandoned.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader call stack overflow at pc {pc}")]
    StackOverflow { pc: u32 },
    #[error("shader program counter {pc} outside shader memory")]
    PcOutOfRange { pc: u32 },
}

// ── Vertex records ──────────────────────────────────────────────────────────

/// One unshaded vertex: up to 16 attribute vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputVertex {
    pub attr: [Vec4<Float24>; NUM_VERTEX_ATTRIBUTES],
}

/// Number of addressable lanes in the output vertex (position, color and
/// three texture coordinates; `screenpos` is filled by primitive assembly).
pub const NUM_OUTPUT_LANES: usize = 14;

/// One shaded vertex in the fixed post-shader schema.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputVertex {
    pub pos: Vec4<Float24>,
    pub color: Vec4<Float24>,
    pub tc0: Vec2<Float24>,
    pub tc1: Vec2<Float24>,
    pub tc2: Vec2<Float24>,
    /// Screen-space position, populated after the perspective divide.
    pub screenpos: Vec3<Float24>,
}

impl OutputVertex {
    pub fn from_lanes(lanes: [Float24; NUM_OUTPUT_LANES]) -> Self {
        Self {
            pos: Vec4::new(lanes[0], lanes[1], lanes[2], lanes[3]),
            color: Vec4::new(lanes[4], lanes[5], lanes[6], lanes[7]),
            tc0: Vec2::new(lanes[8], lanes[9]),
            tc1: Vec2::new(lanes[10], lanes[11]),
            tc2: Vec2::new(lanes[12], lanes[13]),
            screenpos: Vec3::default(),
        }
    }
}

// ── Instruction decoding ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OpCode {
    Add = 0x00,
    Dp3 = 0x01,
    Dp4 = 0x02,
    Mul = 0x08,
    Rcp = 0x0E,
    Rsq = 0x0F,
    Mov = 0x13,
    Nop = 0x21,
    End = 0x22,
    Call = 0x24,
}

impl OpCode {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0x00 => Some(Self::Add),
            0x01 => Some(Self::Dp3),
            0x02 => Some(Self::Dp4),
            0x08 => Some(Self::Mul),
            0x0E => Some(Self::Rcp),
            0x0F => Some(Self::Rsq),
            0x13 => Some(Self::Mov),
            0x21 => Some(Self::Nop),
            0x22 => Some(Self::End),
            0x24 => Some(Self::Call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType {
    Input,
    Temporary,
    FloatUniform,
}

/// A source register field: inputs at 0x00, temporaries at 0x10, float
/// uniforms at 0x20.
#[derive(Debug, Clone, Copy)]
pub struct SourceRegister(pub u32);

impl SourceRegister {
    pub fn register_type(&self) -> RegisterType {
        match self.0 {
            0x00..=0x0F => RegisterType::Input,
            0x10..=0x1F => RegisterType::Temporary,
            _ => RegisterType::FloatUniform,
        }
    }

    pub fn index(&self) -> usize {
        match self.register_type() {
            RegisterType::Input => self.0 as usize,
            RegisterType::Temporary => (self.0 - 0x10) as usize,
            RegisterType::FloatUniform => (self.0 - 0x20) as usize,
        }
    }
}

/// Decoded 32-bit instruction word with accessors for each bitfield.
#[derive(Debug, Clone, Copy)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn opcode_raw(&self) -> u32 {
        self.0 >> 26
    }

    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_raw(self.opcode_raw())
    }

    /// The 0x18..0x1F opcode family swaps the wide and narrow source slots.
    pub fn has_inverted_sources(&self) -> bool {
        matches!(self.opcode_raw(), 0x18..=0x1F)
    }

    pub fn operand_desc_id(&self) -> usize {
        (self.0 & 0x7F) as usize
    }

    pub fn src1(&self, inverted: bool) -> SourceRegister {
        if inverted {
            SourceRegister((self.0 >> 14) & 0x1F)
        } else {
            SourceRegister((self.0 >> 12) & 0x7F)
        }
    }

    pub fn src2(&self, inverted: bool) -> SourceRegister {
        if inverted {
            SourceRegister((self.0 >> 7) & 0x7F)
        } else {
            SourceRegister((self.0 >> 7) & 0x1F)
        }
    }

    pub fn address_register_index(&self) -> u32 {
        (self.0 >> 19) & 0x3
    }

    pub fn dest(&self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    /// Flow-control jump target.
    pub fn dest_offset(&self) -> u32 {
        (self.0 >> 10) & 0xFFF
    }

    /// Flow-control instruction count.
    pub fn num_instructions(&self) -> u32 {
        self.0 & 0x3FF
    }
}

/// Decoded operand descriptor word.
#[derive(Debug, Clone, Copy)]
pub struct SwizzlePattern(pub u32);

impl SwizzlePattern {
    /// Destination write mask; bit 3 of the field is component x.
    pub fn dest_component_enabled(&self, comp: usize) -> bool {
        self.0 & (0x8 >> comp) != 0
    }

    pub fn negate_src1(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub fn selector_src1(&self, comp: usize) -> usize {
        ((self.0 >> (5 + (3 - comp) * 2)) & 0x3) as usize
    }

    pub fn negate_src2(&self) -> bool {
        self.0 & (1 << 13) != 0
    }

    pub fn selector_src2(&self, comp: usize) -> usize {
        ((self.0 >> (14 + (3 - comp) * 2)) & 0x3) as usize
    }
}

// ── Machine state ───────────────────────────────────────────────────────────

/// High-water marks of the last run, for the shader dumper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderDebug {
    /// Highest program counter reached plus one.
    pub max_offset: u32,
    /// Highest operand descriptor id referenced plus one.
    pub max_opdesc_id: u32,
}

struct VertexShaderState {
    pc: u32,
    input_regs: [Vec4<Float24>; NUM_INPUT_REGS],
    temporary: [Vec4<Float24>; NUM_TEMP_REGS],
    /// Conditional-op status flags; none of the implemented opcodes touch
    /// them.
    #[allow(dead_code)]
    status: [bool; 2],
    call_stack: [u32; CALL_STACK_SIZE],
    call_stack_pos: usize,
    output_lanes: [Float24; NUM_OUTPUT_LANES],
}

impl VertexShaderState {
    fn new(entry: u32) -> Self {
        Self {
            pc: entry,
            input_regs: [Vec4::default(); NUM_INPUT_REGS],
            temporary: [Vec4::default(); NUM_TEMP_REGS],
            status: [false; 2],
            call_stack: [INVALID_ADDRESS; CALL_STACK_SIZE],
            call_stack_pos: 0,
            output_lanes: [Float24::ZERO; NUM_OUTPUT_LANES],
        }
    }
}

/// Destination of a register-access instruction, resolved once per
/// instruction.
#[derive(Clone, Copy)]
enum DestTarget {
    Output(usize),
    Temporary(usize),
    None,
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// The shader unit: both memory banks, the uniform file and the executor.
pub struct ShaderEngine {
    code: Box<[u32; SHADER_CODE_SIZE]>,
    swizzle: Box<[u32; SWIZZLE_DATA_SIZE]>,
    uniforms: [Vec4<Float24>; NUM_FLOAT_UNIFORMS],
    pub debug: ShaderDebug,
}

impl ShaderEngine {
    pub fn new() -> Self {
        Self {
            code: Box::new([0u32; SHADER_CODE_SIZE]),
            swizzle: Box::new([0u32; SWIZZLE_DATA_SIZE]),
            uniforms: [Vec4::default(); NUM_FLOAT_UNIFORMS],
            debug: ShaderDebug::default(),
        }
    }

    pub fn submit_shader_word(&mut self, addr: u32, value: u32) {
        if (addr as usize) < SHADER_CODE_SIZE {
            self.code[addr as usize] = value;
        } else {
            log::warn!("shader code upload offset {addr:#X} out of range");
        }
    }

    pub fn submit_swizzle_word(&mut self, addr: u32, value: u32) {
        if (addr as usize) < SWIZZLE_DATA_SIZE {
            self.swizzle[addr as usize] = value;
        } else {
            log::warn!("swizzle upload offset {addr:#X} out of range");
        }
    }

    pub fn set_float_uniform(&mut self, index: usize, value: Vec4<Float24>) {
        if index < NUM_FLOAT_UNIFORMS {
            self.uniforms[index] = value;
        } else {
            log::warn!("float uniform index {index} out of range");
        }
    }

    pub fn float_uniform(&self, index: usize) -> Vec4<Float24> {
        self.uniforms[index]
    }

    pub fn reset(&mut self) {
        self.code.fill(0);
        self.swizzle.fill(0);
        self.uniforms = [Vec4::default(); NUM_FLOAT_UNIFORMS];
        self.debug = ShaderDebug::default();
    }

    /// Shade one vertex: set up the register tables from the I/O maps, then
    /// execute from `vs_main_offset` until END unwinds an empty call stack.
    pub fn run(
        &mut self,
        regs: &Regs,
        input: &InputVertex,
        num_attributes: usize,
    ) -> Result<OutputVertex, ShaderError> {
        let mut state = VertexShaderState::new(regs.vs_main_offset());
        self.debug = ShaderDebug::default();

        let input_map = regs.vs_input_map();
        for i in 0..num_attributes.min(NUM_VERTEX_ATTRIBUTES) {
            state.input_regs[input_map[i]] = input.attr[i];
        }
        let output_map = regs.vs_output_map();

        self.execute(&mut state, &output_map)?;
        Ok(OutputVertex::from_lanes(state.output_lanes))
    }

    fn execute(
        &mut self,
        state: &mut VertexShaderState,
        output_map: &[[usize; 4]; NUM_VS_OUTPUT_REGS],
    ) -> Result<(), ShaderError> {
        loop {
            let pc = state.pc;
            if pc as usize >= SHADER_CODE_SIZE {
                return Err(ShaderError::PcOutOfRange { pc });
            }
            self.debug.max_offset = self.debug.max_offset.max(pc + 1);

            let instr = Instruction(self.code[pc as usize]);
            let mut increment_pc = true;

            match instr.opcode() {
                Some(
                    op @ (OpCode::Add
                    | OpCode::Dp3
                    | OpCode::Dp4
                    | OpCode::Mul
                    | OpCode::Rcp
                    | OpCode::Rsq
                    | OpCode::Mov),
                ) => {
                    let desc_id = instr.operand_desc_id();
                    self.debug.max_opdesc_id = self.debug.max_opdesc_id.max(desc_id as u32 + 1);
                    let swizzle = SwizzlePattern(self.swizzle[desc_id]);

                    let inverted = instr.has_inverted_sources();
                    let src1 = self.swizzled_src1(state, instr.src1(inverted), &swizzle);
                    let src2 = self.swizzled_src2(state, instr.src2(inverted), &swizzle);
                    let dest = resolve_dest(instr.dest());

                    match op {
                        OpCode::Add => {
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, src1[i] + src2[i]);
                                }
                            }
                        }
                        OpCode::Mul => {
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, src1[i] * src2[i]);
                                }
                            }
                        }
                        OpCode::Dp3 | OpCode::Dp4 => {
                            let num_components = if op == OpCode::Dp3 { 3 } else { 4 };
                            let mut dot = Float24::ZERO;
                            for i in 0..num_components {
                                dot = dot + src1[i] * src2[i];
                            }
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, dot);
                                }
                            }
                        }
                        OpCode::Rcp => {
                            // Scalar source: lane x only.
                            let rcp = Float24::from_f32(1.0 / src1[0].to_f32());
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, rcp);
                                }
                            }
                        }
                        OpCode::Rsq => {
                            let rsq = Float24::from_f32(1.0 / src1[0].to_f32().sqrt());
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, rsq);
                                }
                            }
                        }
                        OpCode::Mov => {
                            for i in 0..4 {
                                if swizzle.dest_component_enabled(i) {
                                    write_dest(state, output_map, dest, i, src1[i]);
                                }
                            }
                        }
                        _ => unreachable!(),
                    }
                }

                Some(OpCode::Call) => {
                    if state.call_stack_pos + 1 >= CALL_STACK_SIZE {
                        return Err(ShaderError::StackOverflow { pc });
                    }
                    state.call_stack_pos += 1;
                    state.call_stack[state.call_stack_pos] = pc + 1;
                    state.pc = instr.dest_offset();
                    increment_pc = false;
                }

                Some(OpCode::End) => {
                    let return_pc = state.call_stack[state.call_stack_pos];
                    if return_pc == INVALID_ADDRESS {
                        return Ok(());
                    }
                    state.call_stack[state.call_stack_pos] = INVALID_ADDRESS;
                    state.call_stack_pos = state.call_stack_pos.saturating_sub(1);
                    state.pc = return_pc;
                    increment_pc = false;
                }

                Some(OpCode::Nop) => {}

                None => {
                    log::error!(
                        "unhandled shader opcode {:#04X} at pc {} (word {:#010X})",
                        instr.opcode_raw(),
                        pc,
                        instr.0
                    );
                }
            }

            if increment_pc {
                state.pc += 1;
            }
        }
    }

    fn read_register(&self, state: &VertexShaderState, reg: SourceRegister) -> Vec4<Float24> {
        match reg.register_type() {
            RegisterType::Input => state.input_regs[reg.index()],
            RegisterType::Temporary => state.temporary[reg.index()],
            RegisterType::FloatUniform => self.uniforms[reg.index()],
        }
    }

    fn swizzled_src1(
        &self,
        state: &VertexShaderState,
        reg: SourceRegister,
        swizzle: &SwizzlePattern,
    ) -> [Float24; 4] {
        let value = self.read_register(state, reg);
        let mut out: [Float24; 4] = std::array::from_fn(|i| value[swizzle.selector_src1(i)]);
        if swizzle.negate_src1() {
            for lane in &mut out {
                *lane = -*lane;
            }
        }
        out
    }

    fn swizzled_src2(
        &self,
        state: &VertexShaderState,
        reg: SourceRegister,
        swizzle: &SwizzlePattern,
    ) -> [Float24; 4] {
        let value = self.read_register(state, reg);
        let mut out: [Float24; 4] = std::array::from_fn(|i| value[swizzle.selector_src2(i)]);
        if swizzle.negate_src2() {
            for lane in &mut out {
                *lane = -*lane;
            }
        }
        out
    }
}

impl Default for ShaderEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_dest(raw: u32) -> DestTarget {
    match raw {
        0x00..=0x07 => DestTarget::Output(raw as usize),
        0x10..=0x1F => DestTarget::Temporary((raw - 0x10) as usize),
        _ => {
            log::warn!("shader write to reserved destination register {raw:#X} ignored");
            DestTarget::None
        }
    }
}

fn write_dest(
    state: &mut VertexShaderState,
    output_map: &[[usize; 4]; NUM_VS_OUTPUT_REGS],
    dest: DestTarget,
    comp: usize,
    value: Float24,
) {
    match dest {
        DestTarget::Output(reg) => {
            let lane = output_map[reg][comp];
            if lane < NUM_OUTPUT_LANES {
                state.output_lanes[lane] = value;
            }
        }
        DestTarget::Temporary(reg) => state.temporary[reg][comp] = value,
        DestTarget::None => {}
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{
        VS_INPUT_MAP_HIGH, VS_INPUT_MAP_LOW, VS_MAIN_OFFSET, VS_OUTPUT_MAP_BASE,
    };

    // ── Encoding helpers ────────────────────────────────────────────────

    fn encode_common(op: OpCode, dest: u32, src1: u32, src2: u32, desc: u32) -> u32 {
        ((op as u32) << 26)
            | ((dest & 0x1F) << 21)
            | ((src1 & 0x7F) << 12)
            | ((src2 & 0x1F) << 7)
            | (desc & 0x7F)
    }

    fn encode_flow(op: OpCode, dest_offset: u32, num: u32) -> u32 {
        ((op as u32) << 26) | ((dest_offset & 0xFFF) << 10) | (num & 0x3FF)
    }

    fn encode_simple(op: OpCode) -> u32 {
        (op as u32) << 26
    }

    fn encode_swizzle(mask: u32, sel1: [u32; 4], neg1: bool, sel2: [u32; 4], neg2: bool) -> u32 {
        let mut hex = mask & 0xF;
        hex |= (neg1 as u32) << 4;
        for (i, s) in sel1.iter().enumerate() {
            hex |= (s & 0x3) << (5 + (3 - i) * 2);
        }
        hex |= (neg2 as u32) << 13;
        for (i, s) in sel2.iter().enumerate() {
            hex |= (s & 0x3) << (14 + (3 - i) * 2);
        }
        hex
    }

    const XYZW: [u32; 4] = [0, 1, 2, 3];
    const MASK_ALL: u32 = 0xF;
    const MASK_X: u32 = 0x8;
    const MASK_Y: u32 = 0x4;

    /// Source register encodings.
    fn input(i: u32) -> u32 {
        i
    }
    fn temp(i: u32) -> u32 {
        0x10 + i
    }
    fn uniform(i: u32) -> u32 {
        0x20 + i
    }

    fn f24(v: f32) -> Float24 {
        Float24::from_f32(v)
    }

    fn vec4(x: f32, y: f32, z: f32, w: f32) -> Vec4<Float24> {
        Vec4::new(f24(x), f24(y), f24(z), f24(w))
    }

    /// Registers with an identity input map and outputs o0 → position,
    /// o1 → color, o2 → tc0 (z/w to scratch).
    fn identity_regs() -> Regs {
        let mut regs = Regs::new();
        regs.write(VS_MAIN_OFFSET, 0);
        regs.write(VS_INPUT_MAP_LOW, 0x7654_3210);
        regs.write(VS_INPUT_MAP_HIGH, 0xFEDC_BA98);
        regs.write(VS_OUTPUT_MAP_BASE, 0x0302_0100);
        regs.write(VS_OUTPUT_MAP_BASE + 1, 0x0706_0504);
        regs.write(VS_OUTPUT_MAP_BASE + 2, 0x1F1F_0908);
        regs
    }

    fn engine_with(program: &[u32], swizzles: &[u32]) -> ShaderEngine {
        let mut engine = ShaderEngine::new();
        for (i, word) in program.iter().enumerate() {
            engine.submit_shader_word(i as u32, *word);
        }
        for (i, word) in swizzles.iter().enumerate() {
            engine.submit_swizzle_word(i as u32, *word);
        }
        engine
    }

    // ── Decoder tests ───────────────────────────────────────────────────

    #[test]
    fn test_instruction_fields() {
        let word = encode_common(OpCode::Add, 0x12, uniform(5), temp(3), 0x44);
        let instr = Instruction(word);
        assert_eq!(instr.opcode(), Some(OpCode::Add));
        assert_eq!(instr.dest(), 0x12);
        assert_eq!(instr.src1(false).0, 0x25);
        assert_eq!(instr.src2(false).0, 0x13);
        assert_eq!(instr.operand_desc_id(), 0x44);
    }

    #[test]
    fn test_flow_fields() {
        let instr = Instruction(encode_flow(OpCode::Call, 0x123, 7));
        assert_eq!(instr.opcode(), Some(OpCode::Call));
        assert_eq!(instr.dest_offset(), 0x123);
        assert_eq!(instr.num_instructions(), 7);
    }

    #[test]
    fn test_source_register_types() {
        assert_eq!(SourceRegister(0x05).register_type(), RegisterType::Input);
        assert_eq!(SourceRegister(0x05).index(), 5);
        assert_eq!(SourceRegister(0x1A).register_type(), RegisterType::Temporary);
        assert_eq!(SourceRegister(0x1A).index(), 0xA);
        assert_eq!(SourceRegister(0x7F).register_type(), RegisterType::FloatUniform);
        assert_eq!(SourceRegister(0x7F).index(), 0x5F);
    }

    #[test]
    fn test_swizzle_fields() {
        let word = encode_swizzle(MASK_X, [3, 2, 1, 0], true, XYZW, false);
        let sw = SwizzlePattern(word);
        assert!(sw.dest_component_enabled(0));
        assert!(!sw.dest_component_enabled(1));
        assert!(sw.negate_src1());
        assert!(!sw.negate_src2());
        assert_eq!(sw.selector_src1(0), 3);
        assert_eq!(sw.selector_src1(3), 0);
        assert_eq!(sw.selector_src2(1), 1);
    }

    // ── Execution tests ─────────────────────────────────────────────────

    #[test]
    fn test_mov_identity() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, -2.0, 3.5, 1.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vtx.attr[0]);
    }

    #[test]
    fn test_add_respects_dest_mask() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                // r0 = v0; r0.y = v0.y + v1.y; o0 = r0
                encode_common(OpCode::Mov, 0x10, input(0), 0, 0),
                encode_common(OpCode::Add, 0x10, input(0), input(1), 1),
                encode_common(OpCode::Mov, 0x0, temp(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[
                encode_swizzle(MASK_ALL, XYZW, false, XYZW, false),
                encode_swizzle(MASK_Y, XYZW, false, XYZW, false),
            ],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 2.0, 3.0, 4.0);
        vtx.attr[1] = vec4(10.0, 20.0, 30.0, 40.0);
        let out = engine.run(&regs, &vtx, 2).unwrap();
        // Only y was summed; the other lanes are bitwise unchanged.
        assert_eq!(out.pos, vec4(1.0, 22.0, 3.0, 4.0));
    }

    #[test]
    fn test_mul_componentwise() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mul, 0x0, input(0), input(1), 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.5, -2.0, 4.0, 0.5);
        vtx.attr[1] = vec4(2.0, 3.0, -0.25, 8.0);
        let out = engine.run(&regs, &vtx, 2).unwrap();
        assert_eq!(out.pos, vec4(3.0, -6.0, -1.0, 4.0));
    }

    #[test]
    fn test_dp4_broadcasts_sum_of_squares() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Dp4, 0x1, input(0), input(0), 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 2.0, 3.0, 4.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        let expected = f24(30.0);
        assert_eq!(out.color, Vec4::new(expected, expected, expected, expected));
    }

    #[test]
    fn test_dp3_ignores_w() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Dp3, 0x0, input(0), input(1), 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 2.0, 3.0, 100.0);
        vtx.attr[1] = vec4(4.0, 5.0, 6.0, 100.0);
        let out = engine.run(&regs, &vtx, 2).unwrap();
        assert_eq!(out.pos.x.to_f32(), 32.0);
        assert_eq!(out.pos.w.to_f32(), 32.0);
    }

    #[test]
    fn test_rcp_reads_scalar_lane_x() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Rcp, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(2.0, 5.0, 7.0, 9.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        for i in 0..4 {
            assert_eq!(out.pos[i].to_f32(), 0.5, "lane {i}");
        }
    }

    #[test]
    fn test_rcp_of_zero_does_not_panic() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Rcp, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let vtx = InputVertex::default();
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert!(out.pos.x.to_f32().is_finite());
    }

    #[test]
    fn test_rsq() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Rsq, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(4.0, 1.0, 1.0, 1.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos.x.to_f32(), 0.5);
    }

    #[test]
    fn test_swizzle_selectors_reverse() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, [3, 2, 1, 0], false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 2.0, 3.0, 4.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vec4(4.0, 3.0, 2.0, 1.0));
    }

    #[test]
    fn test_negate_src1() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, true, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, -2.0, 3.0, -4.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vec4(-1.0, 2.0, -3.0, 4.0));
    }

    #[test]
    fn test_float_uniform_source() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mov, 0x0, uniform(5), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );
        engine.set_float_uniform(5, vec4(9.0, 8.0, 7.0, 6.0));

        let out = engine.run(&regs, &InputVertex::default(), 0).unwrap();
        assert_eq!(out.pos, vec4(9.0, 8.0, 7.0, 6.0));
    }

    #[test]
    fn test_unset_input_slots_read_zero() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_common(OpCode::Mov, 0x0, input(7), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 1.0, 1.0, 1.0);
        // Only one attribute submitted: slot 7 stays at the zero sentinel.
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vec4(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_call_and_return() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                encode_flow(OpCode::Call, 3, 1),
                encode_simple(OpCode::End),
                encode_simple(OpCode::Nop),
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_X, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(42.0, 0.0, 0.0, 0.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos.x.to_f32(), 42.0);
        // The subroutine at 3..=4 is the farthest the program counter got.
        assert_eq!(engine.debug.max_offset, 5);
        assert_eq!(engine.debug.max_opdesc_id, 1);
    }

    #[test]
    fn test_call_stack_overflow_is_fatal() {
        let regs = identity_regs();
        // CALL to self: recursion with no END in between.
        let mut engine = engine_with(&[encode_flow(OpCode::Call, 0, 1)], &[]);
        match engine.run(&regs, &InputVertex::default(), 0) {
            Err(ShaderError::StackOverflow { pc: 0 }) => {}
            other => panic!("expected stack overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_runaway_pc_is_fatal() {
        let mut regs = identity_regs();
        regs.write(VS_MAIN_OFFSET, 1022);
        // No END anywhere: the program counter runs off the bank.
        let mut engine = ShaderEngine::new();
        match engine.run(&regs, &InputVertex::default(), 0) {
            Err(ShaderError::PcOutOfRange { pc: 1024 }) => {}
            other => panic!("expected pc fault, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_opcode_continues_as_nop() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                (0x3F << 26) | 0x1234,
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(5.0, 6.0, 7.0, 8.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vec4(5.0, 6.0, 7.0, 8.0));
    }

    #[test]
    fn test_reserved_dest_is_ignored() {
        let regs = identity_regs();
        let mut engine = engine_with(
            &[
                // dest 0x08 is in the reserved range.
                encode_common(OpCode::Mov, 0x08, input(0), 0, 0),
                encode_common(OpCode::Mov, 0x0, input(0), 0, 0),
                encode_simple(OpCode::End),
            ],
            &[encode_swizzle(MASK_ALL, XYZW, false, XYZW, false)],
        );

        let mut vtx = InputVertex::default();
        vtx.attr[0] = vec4(1.0, 2.0, 3.0, 4.0);
        let out = engine.run(&regs, &vtx, 1).unwrap();
        assert_eq!(out.pos, vec4(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_upload_bounds() {
        let mut engine = ShaderEngine::new();
        engine.submit_shader_word(SHADER_CODE_SIZE as u32, 0xFFFF_FFFF);
        engine.submit_swizzle_word(SWIZZLE_DATA_SIZE as u32, 0xFFFF_FFFF);
        engine.set_float_uniform(NUM_FLOAT_UNIFORMS, Vec4::default());
        // Out-of-range uploads are dropped, in-range state is untouched.
        assert_eq!(engine.code[0], 0);
        assert_eq!(engine.swizzle[0], 0);
    }
}
