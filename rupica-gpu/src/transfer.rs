// SPDX-FileCopyrightText: 2026 rupica contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Memory fill and display transfer engines.
//!
//! Both run synchronously when their trigger register is written. The fill
//! engine stamps a byte-swapped word over a physical range; the transfer
//! engine converts a rectangle between framebuffer formats on its way to
//! the display (the width registers hold twice the pixel width, an
//! artifact of the bus programming the hardware expects).

use crate::memory::GuestMemory;
use crate::registers::{DisplayTransferConfig, FramebufferFormat, MemoryFillConfig};

/// Fill `[address_start, address_end)` with the byte-swapped fill value.
/// A zero start address leaves the unit idle.
pub fn memory_fill(mem: &mut dyn GuestMemory, config: &MemoryFillConfig) {
    if config.address_start == 0 {
        return;
    }

    let value = config.value.swap_bytes();
    let mut addr = config.address_start;
    while addr < config.address_end {
        mem.write_u32(addr, value);
        addr += 4;
    }

    log::debug!(
        "memory fill from {:#010X} to {:#010X}",
        config.address_start,
        config.address_end
    );
}

/// Convert a rectangle from the input framebuffer format to the output
/// format. Only RGBA8 → RGB8 is implemented; the alpha byte is dropped and
/// the three remaining bytes are copied in storage order.
pub fn display_transfer(mem: &mut dyn GuestMemory, config: &DisplayTransferConfig) {
    for y in 0..config.output_height {
        for x in 0..config.output_width / 2 {
            let mut source_color = [0u8; 4];

            match config.input_format {
                FramebufferFormat::Rgba8 => {
                    let addr = config.input_address + x * 4 + y * config.input_width * 4 / 2;
                    mem.read(addr, &mut source_color);
                }
                _ => {
                    log::error!(
                        "unknown source framebuffer format {:?}",
                        config.input_format
                    );
                }
            }

            match config.output_format {
                FramebufferFormat::Rgb8 => {
                    let addr = config.output_address + x * 3 + y * config.output_width * 3 / 2;
                    mem.write(addr, &source_color[..3]);
                }
                _ => {
                    log::error!(
                        "unknown destination framebuffer format {:?}",
                        config.output_format
                    );
                }
            }
        }
    }

    log::debug!(
        "display transfer {:#010X} ({}x{}) -> {:#010X} ({}x{})",
        config.input_address,
        config.input_width,
        config.input_height,
        config.output_address,
        config.output_width,
        config.output_height
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;

    #[test]
    fn test_fill_writes_swapped_value() {
        let mut mem = FlatMemory::new(0, 0x2000);
        let config = MemoryFillConfig {
            address_start: 0x1000,
            address_end: 0x1010,
            value: 0x1122_3344,
        };
        memory_fill(&mut mem, &config);

        for i in 0..4 {
            assert_eq!(mem.read_u32(0x1000 + i * 4), 0x4433_2211);
        }
        // The end of the range is exclusive.
        assert_eq!(mem.read_u32(0x1010), 0);
        assert_eq!(mem.read_u32(0x0FFC), 0);
    }

    #[test]
    fn test_fill_with_zero_start_is_idle() {
        let mut mem = FlatMemory::new(0, 0x100);
        let config = MemoryFillConfig {
            address_start: 0,
            address_end: 0x10,
            value: 0xFFFF_FFFF,
        };
        memory_fill(&mut mem, &config);
        assert!(mem.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_transfer_rgba8_to_rgb8() {
        let mut mem = FlatMemory::new(0, 0x1000);
        // Two pixels of RGBA8 input.
        mem.write(0x100, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        let config = DisplayTransferConfig {
            input_address: 0x100,
            output_address: 0x800,
            input_width: 4,
            input_height: 1,
            output_width: 4,
            output_height: 1,
            input_format: FramebufferFormat::Rgba8,
            output_format: FramebufferFormat::Rgb8,
        };
        display_transfer(&mut mem, &config);

        // The alpha byte of each pixel is dropped, byte order preserved.
        let mut out = [0u8; 6];
        mem.read(0x800, &mut out);
        assert_eq!(out, [0x11, 0x22, 0x33, 0x55, 0x66, 0x77]);
    }

    #[test]
    fn test_transfer_walks_rows_with_doubled_width() {
        let mut mem = FlatMemory::new(0, 0x1000);
        // 2 rows, register width 4 = 2 real pixels per row.
        for i in 0..16u8 {
            mem.write(0x100 + i as u32, &[i]);
        }
        let config = DisplayTransferConfig {
            input_address: 0x100,
            output_address: 0x800,
            input_width: 4,
            input_height: 2,
            output_width: 4,
            output_height: 2,
            input_format: FramebufferFormat::Rgba8,
            output_format: FramebufferFormat::Rgb8,
        };
        display_transfer(&mut mem, &config);

        let mut out = [0u8; 12];
        mem.read(0x800, &mut out);
        // Row 0: pixels at input 0 and 4; row 1: pixels at input 8 and 12.
        assert_eq!(
            out,
            [0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14]
        );
    }

    #[test]
    fn test_transfer_unknown_output_format_writes_nothing() {
        let mut mem = FlatMemory::new(0, 0x1000);
        mem.write(0x100, &[0xAA; 16]);
        let config = DisplayTransferConfig {
            input_address: 0x100,
            output_address: 0x800,
            input_width: 4,
            input_height: 1,
            output_width: 4,
            output_height: 1,
            input_format: FramebufferFormat::Rgba8,
            output_format: FramebufferFormat::Unknown,
        };
        display_transfer(&mut mem, &config);
        assert_eq!(mem.read_u32(0x800), 0);
    }
}
