// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Triangle assembly from the shaded vertex stream.
//!
//! Shaded vertices arrive one at a time; the assembler applies the fixed
//! post-shader transform (perspective divide into `screenpos`) and groups
//! them into triangles according to the configured topology, handing each
//! completed triangle to the rasterizer callback. The clip-space `w` stays
//! on the vertex for perspective-correct interpolation downstream.

use crate::math::Vec3;
use crate::shader::OutputVertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TriangleTopology {
    List = 0,
    Strip = 1,
    Fan = 2,
}

impl TriangleTopology {
    pub fn from_raw(v: u32) -> Self {
        match v {
            0 => Self::List,
            1 => Self::Strip,
            2 => Self::Fan,
            _ => {
                log::warn!("unknown triangle topology {v:#X}, assuming list");
                Self::List
            }
        }
    }
}

/// Perspective divide: screen x/y are `pos.xy / pos.w`, z is carried
/// through unscaled for the depth stage. The viewport transform is folded
/// into the shader program.
pub fn init_screen_coordinates(vtx: &mut OutputVertex) {
    vtx.screenpos = Vec3::new(
        vtx.pos.x / vtx.pos.w,
        vtx.pos.y / vtx.pos.w,
        vtx.pos.z,
    );
}

pub struct PrimitiveAssembler {
    topology: TriangleTopology,
    buffer: [OutputVertex; 2],
    buffer_index: usize,
    /// Strip slot the next vertex evicts; alternates to keep winding.
    strip_replace: usize,
}

impl PrimitiveAssembler {
    pub fn new(topology: TriangleTopology) -> Self {
        Self {
            topology,
            buffer: [OutputVertex::default(); 2],
            buffer_index: 0,
            strip_replace: 0,
        }
    }

    /// Feed one shaded vertex; `emit` receives every completed triangle.
    pub fn submit_vertex(
        &mut self,
        vtx: OutputVertex,
        emit: &mut dyn FnMut(&OutputVertex, &OutputVertex, &OutputVertex),
    ) {
        let mut vtx = vtx;
        init_screen_coordinates(&mut vtx);

        if self.buffer_index < 2 {
            self.buffer[self.buffer_index] = vtx;
            self.buffer_index += 1;
            return;
        }

        match self.topology {
            TriangleTopology::List => {
                emit(&self.buffer[0], &self.buffer[1], &vtx);
                self.buffer_index = 0;
            }
            TriangleTopology::Strip => {
                emit(&self.buffer[0], &self.buffer[1], &vtx);
                self.buffer[self.strip_replace] = vtx;
                self.strip_replace ^= 1;
            }
            TriangleTopology::Fan => {
                emit(&self.buffer[0], &self.buffer[1], &vtx);
                self.buffer[1] = vtx;
            }
        }
    }
}
