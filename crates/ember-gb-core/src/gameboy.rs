use std::{fs, io, path::Path};

use crate::{
    bus::Bus,
    cartridge::{Cartridge, CartridgeError},
    cpu::Cpu,
    input::Joypad,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
    serial::TestResult,
    state,
};

/// The assembled machine. The CPU drives everything: each `step()` runs one
/// instruction (or one interrupt dispatch), advancing the bus in M-cycle
/// lock-step.
#[derive(Clone)]
pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl GameBoy {
    /// Build a machine around a loaded cartridge, starting from the
    /// post-boot state. The cartridge's CGB flag selects the hardware mode.
    pub fn new(cart: Cartridge) -> Self {
        let cgb = cart.is_cgb();
        Self {
            cpu: Cpu::new(cgb),
            bus: Bus::new(cart),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        Ok(Self::new(Cartridge::from_file(path)?))
    }

    pub fn is_cgb(&self) -> bool {
        self.bus.is_cgb()
    }

    /// Run one instruction (or interrupt dispatch) and return the T-cycles
    /// consumed.
    pub fn step(&mut self) -> u32 {
        self.bus.reset_cycle_count();
        self.cpu.step(&mut self.bus);
        self.bus.cycle_count()
    }

    /// Run until the PPU reports a completed frame. Returns the T-cycles
    /// consumed; bails out after a frame's worth of headroom if the flag
    /// never fires.
    pub fn step_frame(&mut self) -> u32 {
        let mut cycles = 0u32;
        while !self.frame_ready() && cycles < 1_000_000 {
            cycles += self.step();
        }
        cycles
    }

    /// One-shot: true once per completed frame, clearing on read.
    pub fn frame_ready(&mut self) -> bool {
        self.bus.ppu.take_frame_ready()
    }

    /// 160x144 ARGB8888 pixels.
    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.bus.ppu.framebuffer()
    }

    /// Mono samples at 44.1 kHz accumulated since the last clear.
    pub fn audio_samples(&self) -> &[f32] {
        self.bus.apu.samples()
    }

    pub fn clear_audio(&mut self) {
        self.bus.apu.clear_samples();
    }

    pub fn joypad(&mut self) -> &mut Joypad {
        &mut self.bus.joypad
    }

    /// Enable serial capture so Blargg-style test ROMs can report Passed or
    /// Failed without a display.
    pub fn set_test_harness(&mut self, enabled: bool) {
        self.bus.serial.set_harness_enabled(enabled);
    }

    pub fn test_result(&self) -> TestResult {
        self.bus.serial.test_result()
    }

    pub fn serial_output(&self) -> String {
        self.bus.serial.output()
    }

    /// Write battery-backed cartridge RAM to disk.
    pub fn save_ram(&mut self) -> io::Result<()> {
        self.bus.cart.save_ram()
    }

    /// Serialize the full core state (everything except the ROM image).
    pub fn save_state_bytes(&self) -> Vec<u8> {
        let mut out = state::Writer::new();
        self.cpu.save_state(&mut out);
        self.bus.save_state(&mut out);
        self.bus.timer.save_state(&mut out);
        self.bus.ppu.save_state(&mut out);
        self.bus.apu.save_state(&mut out);
        self.bus.cart.save_state(&mut out);
        out.into_bytes()
    }

    /// Restore from a save-state blob. The load lands in a scratch copy
    /// first: a bad magic, wrong version, or truncated blob leaves the
    /// running machine untouched.
    pub fn load_state_bytes(&mut self, bytes: &[u8]) -> Result<(), state::StateError> {
        let mut r = state::Reader::new(bytes)?;
        let mut scratch = self.clone();
        scratch.cpu.load_state(&mut r)?;
        scratch.bus.load_state(&mut r)?;
        scratch.bus.timer.load_state(&mut r)?;
        scratch.bus.ppu.load_state(&mut r)?;
        scratch.bus.apu.load_state(&mut r)?;
        scratch.bus.cart.load_state(&mut r)?;
        *self = scratch;
        Ok(())
    }

    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<(), state::StateError> {
        fs::write(path, self.save_state_bytes())?;
        Ok(())
    }

    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<(), state::StateError> {
        let bytes = fs::read(path)?;
        self.load_state_bytes(&bytes)
    }
}
