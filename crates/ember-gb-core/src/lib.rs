//! Cycle-accurate Game Boy / Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/bus/PPU/APU/
//! timer/cartridge). Frontends (windowing, audio device, input mapping) live
//! in separate crates and drive the core via the [`gameboy`] facade: call
//! [`gameboy::GameBoy::step`] until [`gameboy::GameBoy::frame_ready`] reports
//! a completed frame, present the framebuffer, and drain the audio buffer.
//!
//! The CPU is the master clock. Every memory access it performs first
//! advances the rest of the machine by one M-cycle (4 T-cycles) through
//! [`bus::Bus::tick`], then resolves, so timer overflows, PPU mode
//! transitions, and HDMA bursts land on the correct instruction boundary.

/// Audio Processing Unit (APU) emulation.
pub mod apu;

/// Memory map, I/O registers, DMA engines, and the shared M-cycle tick.
pub mod bus;

/// Cartridge mappers (MBC) and ROM/RAM/RTC handling.
pub mod cartridge;

/// LR35902 CPU core.
pub mod cpu;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod gameboy;

/// Joypad input register and interrupt behavior.
pub mod input;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Serial port capture used by the test-ROM harness.
pub mod serial;

/// Save-state encoding: little-endian blobs behind a magic/version header.
pub mod state;

/// Divider/timer unit.
pub mod timer;
