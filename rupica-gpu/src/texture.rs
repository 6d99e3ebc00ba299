// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tiled texture sampling.
//!
//! PICA textures are split into 8×8 tiles. Each tile is composed of four
//! 4×4 sub-tiles, each of four 2×2 sub-tiles, each of four texels, every
//! level embedded into the next in the same diagonal pattern. The resulting
//! texel order within a tile (origin bottom-left):
//!
//! ```text
//! 42 43 46 47 58 59 62 63
//! 40 41 44 45 56 57 60 61
//! 34 35 38 39 50 51 54 55
//! 32 33 36 37 48 49 52 53
//! 10 11 14 15 26 27 30 31
//! 08 09 12 13 24 25 28 29
//! 02 03 06 07 18 19 22 23
//! 00 01 04 05 16 17 20 21
//! ```
//!
//! Tiles advance in `s` first within a row of tiles, rows of tiles advance
//! in `t`.

use crate::float24::Float24;
use crate::math::{Vec2, Vec4};
use crate::memory::GuestMemory;
use rupica_common::PAddr;

/// Texels per tile edge.
const TILE_SIZE: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WrapMode {
    ClampToEdge = 0,
    Repeat = 2,
}

impl WrapMode {
    pub fn from_raw(v: u32) -> Self {
        match v {
            0 => Self::ClampToEdge,
            2 => Self::Repeat,
            _ => {
                log::warn!("unknown texture wrap mode {v:#X}, clamping to edge");
                Self::ClampToEdge
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureFormat {
    Rgb8 = 1,
}

impl TextureFormat {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Rgb8),
            _ => None,
        }
    }
}

/// Decoded state of one texture unit.
#[derive(Debug, Clone, Copy)]
pub struct TextureConfig {
    pub enabled: bool,
    pub address: PAddr,
    pub width: u32,
    pub height: u32,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub format: Option<TextureFormat>,
}

/// Apply a wrap mode to a (possibly out-of-range) texel coordinate.
fn wrap_coordinate(mode: WrapMode, val: i32, size: u32) -> i32 {
    match mode {
        WrapMode::ClampToEdge => val.clamp(0, size as i32 - 1),
        WrapMode::Repeat => ((val as u32) % size) as i32,
    }
}

/// Diagonal Z-order index of texel (s, t) within its 8×8 tile.
fn texel_index_within_tile(s: i32, t: i32) -> i32 {
    let mut index = 0;
    for block_size_index in 0..3 {
        let sub_tile_width = 1 << block_size_index;
        index += (s & sub_tile_width) << block_size_index;
        index += 2 * ((t & sub_tile_width) << block_size_index);
    }
    index
}

/// Sample an enabled texture unit at the interpolated coordinate.
///
/// Only RGB8 is handled; the three bytes of a texel are stored
/// blue-first, so the fetch maps `r = ptr[2], g = ptr[1], b = ptr[0]` with
/// opaque alpha. Units configured with an unknown format read opaque black.
pub fn sample(mem: &dyn GuestMemory, config: &TextureConfig, uv: Vec2<Float24>) -> Vec4<u8> {
    let Some(TextureFormat::Rgb8) = config.format else {
        return Vec4::new(0, 0, 0, 0xFF);
    };
    if config.width == 0 || config.height == 0 {
        log::warn!("sampling texture with zero dimension");
        return Vec4::new(0, 0, 0, 0xFF);
    }

    let s = (uv.u() * Float24::from_f32(config.width as f32)).to_f32() as i32;
    let t = (uv.v() * Float24::from_f32(config.height as f32)).to_f32() as i32;
    let s = wrap_coordinate(config.wrap_s, s, config.width);
    let t = wrap_coordinate(config.wrap_t, t, config.height);

    let coarse_s = (s / TILE_SIZE) * TILE_SIZE;
    let coarse_t = (t / TILE_SIZE) * TILE_SIZE;
    let row_stride = config.width as i32 * 3;
    let offset = coarse_s * TILE_SIZE * 3 + coarse_t * row_stride + texel_index_within_tile(s, t) * 3;

    let mut texel = [0u8; 3];
    mem.read(config.address.wrapping_add(offset as u32), &mut texel);
    Vec4::new(texel[2], texel[1], texel[0], 0xFF)
}
