// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Texture environment (TEV) combiner.
//!
//! Six fixed-function stages evaluated in order. Each stage picks three
//! color inputs and three alpha inputs from some source (interpolated
//! vertex color, a texture unit, the per-stage constant, or the previous
//! stage's output), runs them through a per-input modifier, and combines
//! them with a small arithmetic operation. The stage result becomes the
//! `Previous` source of the next stage; the last stage's output is the
//! fragment color.

use crate::math::Vec4;

pub const NUM_TEV_STAGES: usize = 6;

/// Combiner input source (shared by the color and alpha pipelines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TevSource {
    PrimaryColor = 0x0,
    Texture0 = 0x3,
    Texture1 = 0x4,
    Texture2 = 0x5,
    Constant = 0xE,
    Previous = 0xF,
}

impl TevSource {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::PrimaryColor),
            0x3 => Some(Self::Texture0),
            0x4 => Some(Self::Texture1),
            0x5 => Some(Self::Texture2),
            0xE => Some(Self::Constant),
            0xF => Some(Self::Previous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ColorModifier {
    SourceColor = 0x0,
    SourceAlpha = 0x2,
}

impl ColorModifier {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::SourceColor),
            0x2 => Some(Self::SourceAlpha),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AlphaModifier {
    SourceAlpha = 0x0,
    OneMinusSourceAlpha = 0x1,
}

impl AlphaModifier {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::SourceAlpha),
            0x1 => Some(Self::OneMinusSourceAlpha),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TevOp {
    Replace = 0x0,
    Modulate = 0x1,
    Add = 0x2,
    Lerp = 0x4,
}

impl TevOp {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::Replace),
            0x1 => Some(Self::Modulate),
            0x2 => Some(Self::Add),
            0x4 => Some(Self::Lerp),
            _ => None,
        }
    }
}

/// Decoded per-stage combiner state. Source/modifier/op fields keep their
/// raw register values so unknown configurations degrade per-term at
/// evaluation time instead of at decode time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TevStageConfig {
    pub color_source: [u32; 3],
    pub color_modifier: [u32; 3],
    pub color_op: u32,
    pub alpha_source: [u32; 3],
    pub alpha_modifier: [u32; 3],
    pub alpha_op: u32,
    pub const_color: Vec4<u8>,
    /// Result multipliers, already decoded to 1, 2 or 4.
    pub color_scale: u32,
    pub alpha_scale: u32,
}

impl TevStageConfig {
    /// Decode a stage from its five register words:
    /// sources, modifiers, ops, constant color, scale.
    pub fn from_words(words: [u32; 5]) -> Self {
        Self {
            color_source: [words[0] & 0xF, (words[0] >> 4) & 0xF, (words[0] >> 8) & 0xF],
            alpha_source: [
                (words[0] >> 16) & 0xF,
                (words[0] >> 20) & 0xF,
                (words[0] >> 24) & 0xF,
            ],
            color_modifier: [words[1] & 0xF, (words[1] >> 4) & 0xF, (words[1] >> 8) & 0xF],
            alpha_modifier: [
                (words[1] >> 12) & 0x7,
                (words[1] >> 16) & 0x7,
                (words[1] >> 20) & 0x7,
            ],
            color_op: words[2] & 0xF,
            alpha_op: (words[2] >> 16) & 0xF,
            const_color: Vec4::new(
                (words[3] & 0xFF) as u8,
                ((words[3] >> 8) & 0xFF) as u8,
                ((words[3] >> 16) & 0xFF) as u8,
                ((words[3] >> 24) & 0xFF) as u8,
            ),
            color_scale: decode_multiplier(words[4] & 0x3),
            alpha_scale: decode_multiplier((words[4] >> 16) & 0x3),
        }
    }
}

fn decode_multiplier(raw: u32) -> u32 {
    match raw {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => {
            log::warn!("unknown combiner result multiplier {raw}, using 1x");
            1
        }
    }
}

/// Run all stages and return the final fragment color.
pub fn run_stages(
    stages: &[TevStageConfig],
    primary_color: Vec4<u8>,
    texture_color: [Vec4<u8>; 3],
) -> Vec4<u8> {
    let mut combiner_output = Vec4::new(0u8, 0, 0, 0);

    for stage in stages {
        let color_inputs = [
            color_modifier(
                stage.color_modifier[0],
                fetch_source(stage, stage.color_source[0], primary_color, &texture_color, combiner_output),
            ),
            color_modifier(
                stage.color_modifier[1],
                fetch_source(stage, stage.color_source[1], primary_color, &texture_color, combiner_output),
            ),
            color_modifier(
                stage.color_modifier[2],
                fetch_source(stage, stage.color_source[2], primary_color, &texture_color, combiner_output),
            ),
        ];
        let color_output = color_combine(stage.color_op, color_inputs, stage.color_scale);

        // The alpha pipeline may read the previous stage's alpha, never its
        // color, so the stage output is committed only after both halves ran.
        let alpha_inputs = [
            alpha_modifier(
                stage.alpha_modifier[0],
                fetch_source(stage, stage.alpha_source[0], primary_color, &texture_color, combiner_output),
            ),
            alpha_modifier(
                stage.alpha_modifier[1],
                fetch_source(stage, stage.alpha_source[1], primary_color, &texture_color, combiner_output),
            ),
            alpha_modifier(
                stage.alpha_modifier[2],
                fetch_source(stage, stage.alpha_source[2], primary_color, &texture_color, combiner_output),
            ),
        ];
        let alpha_output = alpha_combine(stage.alpha_op, alpha_inputs, stage.alpha_scale);

        combiner_output = Vec4::new(
            color_output[0],
            color_output[1],
            color_output[2],
            alpha_output,
        );
    }

    combiner_output
}

fn fetch_source(
    stage: &TevStageConfig,
    raw: u32,
    primary_color: Vec4<u8>,
    texture_color: &[Vec4<u8>; 3],
    previous: Vec4<u8>,
) -> Vec4<u8> {
    match TevSource::from_raw(raw) {
        Some(TevSource::PrimaryColor) => primary_color,
        Some(TevSource::Texture0) => texture_color[0],
        Some(TevSource::Texture1) => texture_color[1],
        Some(TevSource::Texture2) => texture_color[2],
        Some(TevSource::Constant) => stage.const_color,
        Some(TevSource::Previous) => previous,
        None => {
            log::error!("unknown combiner source {raw:#X}");
            Vec4::new(0, 0, 0, 0)
        }
    }
}

fn color_modifier(raw: u32, value: Vec4<u8>) -> [u8; 3] {
    match ColorModifier::from_raw(raw) {
        Some(ColorModifier::SourceColor) => [value.r(), value.g(), value.b()],
        Some(ColorModifier::SourceAlpha) => [value.a(), value.a(), value.a()],
        None => {
            log::error!("unknown color combiner modifier {raw:#X}");
            [0, 0, 0]
        }
    }
}

fn alpha_modifier(raw: u32, value: Vec4<u8>) -> u8 {
    match AlphaModifier::from_raw(raw) {
        Some(AlphaModifier::SourceAlpha) => value.a(),
        Some(AlphaModifier::OneMinusSourceAlpha) => 255 - value.a(),
        None => {
            log::error!("unknown alpha combiner modifier {raw:#X}");
            0
        }
    }
}

fn color_combine(raw: u32, input: [[u8; 3]; 3], scale: u32) -> [u8; 3] {
    let combined = match TevOp::from_raw(raw) {
        Some(TevOp::Replace) => input[0],
        Some(TevOp::Modulate) => {
            let mul = |a: u8, b: u8| ((a as u32 * b as u32) / 255) as u8;
            [
                mul(input[0][0], input[1][0]),
                mul(input[0][1], input[1][1]),
                mul(input[0][2], input[1][2]),
            ]
        }
        Some(TevOp::Add) => [
            input[0][0].saturating_add(input[1][0]),
            input[0][1].saturating_add(input[1][1]),
            input[0][2].saturating_add(input[1][2]),
        ],
        Some(TevOp::Lerp) => {
            let lerp = |a: u8, b: u8, f: u8| {
                ((a as u32 * f as u32 + b as u32 * (255 - f as u32)) / 255) as u8
            };
            [
                lerp(input[0][0], input[1][0], input[2][0]),
                lerp(input[0][1], input[1][1], input[2][1]),
                lerp(input[0][2], input[1][2], input[2][2]),
            ]
        }
        None => {
            log::error!("unknown color combiner operation {raw:#X}");
            [0, 0, 0]
        }
    };

    [
        scale_channel(combined[0], scale),
        scale_channel(combined[1], scale),
        scale_channel(combined[2], scale),
    ]
}

fn alpha_combine(raw: u32, input: [u8; 3], scale: u32) -> u8 {
    let combined = match TevOp::from_raw(raw) {
        Some(TevOp::Replace) => input[0],
        Some(TevOp::Modulate) => ((input[0] as u32 * input[1] as u32) / 255) as u8,
        Some(TevOp::Add) => input[0].saturating_add(input[1]),
        Some(TevOp::Lerp) => {
            ((input[0] as u32 * input[2] as u32 + input[1] as u32 * (255 - input[2] as u32)) / 255)
                as u8
        }
        None => {
            log::error!("unknown alpha combiner operation {raw:#X}");
            0
        }
    };
    scale_channel(combined, scale)
}

fn scale_channel(value: u8, scale: u32) -> u8 {
    (value as u32 * scale).min(255) as u8
}
