use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::Joypad,
    ppu::Ppu,
    serial::Serial,
    state,
    timer::Timer,
};

const WRAM_BANK_SIZE: usize = 0x1000;

/// The shared bus: address decoding, I/O registers, the DMA engines, and the
/// single M-cycle tick that keeps every component in lock-step with the CPU.
#[derive(Clone)]
pub struct Bus {
    pub cart: Cartridge,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub serial: Serial,
    pub joypad: Joypad,

    /// 32 KiB: 8 banks of 4 KiB. DMG uses banks 0-1 only.
    wram: Box<[[u8; WRAM_BANK_SIZE]; 8]>,
    /// SVBK (0xFF70): bank mapped at 0xD000-0xDFFF, 0 promoted to 1.
    wram_bank: usize,
    hram: [u8; 0x7F],
    /// Low 5 bits only; the 0xE0 is ORed in on read.
    pub if_reg: u8,
    pub ie_reg: u8,

    cycle_count: u32,
    cgb_mode: bool,

    // CGB double speed (KEY1)
    double_speed: bool,
    speed_switch_armed: bool,

    // CGB HDMA. `hdma_dst` is relative to VRAM.
    hdma_src: u16,
    hdma_dst: u16,
    hdma_length: u8,
    hdma_active: bool,
}

impl Bus {
    pub fn new(cart: Cartridge) -> Self {
        let cgb_mode = cart.is_cgb();
        Self {
            cart,
            timer: Timer::new(),
            ppu: Ppu::new(cgb_mode),
            apu: Apu::new(),
            serial: Serial::new(),
            joypad: Joypad::new(),
            wram: Box::new([[0; WRAM_BANK_SIZE]; 8]),
            wram_bank: 1,
            hram: [0; 0x7F],
            if_reg: 0x01,
            ie_reg: 0,
            cycle_count: 0,
            cgb_mode,
            double_speed: false,
            speed_switch_armed: false,
            hdma_src: 0,
            hdma_dst: 0,
            hdma_length: 0xFF,
            hdma_active: false,
        }
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb_mode
    }

    pub fn is_double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn is_speed_switch_armed(&self) -> bool {
        self.speed_switch_armed
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn reset_cycle_count(&mut self) {
        self.cycle_count = 0;
    }

    /// Advance everything but the CPU by one M-cycle. Called by the CPU
    /// before each of its memory accesses resolves, and for its internal
    /// delay cycles.
    pub fn tick(&mut self) {
        self.cycle_count += 4;

        // Timer always runs at CPU speed; DIV is on the CPU clock.
        self.timer.step(4, &mut self.if_reg);

        // PPU and APU stay at 1x in double-speed mode.
        let dots: u16 = if self.double_speed { 2 } else { 4 };
        self.ppu.step(dots);
        if self.ppu.take_vblank_interrupt() {
            self.if_reg |= 0x01;
        }
        if self.ppu.take_stat_interrupt() {
            self.if_reg |= 0x02;
        }

        self.apu.step(dots as u32);

        if self.joypad.take_interrupt() {
            self.if_reg |= 0x10;
        }

        // HBlank DMA moves one 16-byte block per HBlank entry. The flag is
        // consumed unconditionally so a later start cannot see a stale edge.
        let hblank_started = self.ppu.take_hblank_started();
        if self.hdma_active && hblank_started {
            self.hdma_block();
            if self.hdma_length == 0 {
                self.hdma_active = false;
                self.hdma_length = 0xFF;
            } else {
                self.hdma_length -= 1;
            }
        }
    }

    fn hdma_block(&mut self) {
        for i in 0..16u16 {
            let byte = self.read(self.hdma_src.wrapping_add(i));
            self.ppu.write_vram(self.hdma_dst.wrapping_add(i), byte);
        }
        self.hdma_src = self.hdma_src.wrapping_add(16);
        self.hdma_dst = self.hdma_dst.wrapping_add(16);
    }

    /// Flip the speed, disarm the switch, and reset DIV. Invoked by STOP.
    pub fn perform_speed_switch(&mut self) {
        self.double_speed = !self.double_speed;
        self.speed_switch_armed = false;
        self.timer.write(0xFF04, 0, &mut self.if_reg);
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.read(addr),
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.high_wram_bank()][(addr - 0xD000) as usize],
            0xE000..=0xFDFF => self.read(addr - 0x2000),
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF4D if self.cgb_mode => {
                let mut val = 0x7E;
                if self.double_speed {
                    val |= 0x80;
                }
                if self.speed_switch_armed {
                    val |= 0x01;
                }
                val
            }
            0xFF4F if self.cgb_mode => self.ppu.read_reg(addr),
            0xFF55 if self.cgb_mode => {
                self.hdma_length | if self.hdma_active { 0x00 } else { 0x80 }
            }
            0xFF68..=0xFF6B if self.cgb_mode => self.ppu.read_reg(addr),
            0xFF70 if self.cgb_mode => self.wram_bank as u8 | 0xF8,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val),
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => {
                self.wram[self.high_wram_bank()][(addr - 0xD000) as usize] = val;
            }
            0xE000..=0xFDFF => self.write(addr - 0x2000, val),
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => {
                // OAM DMA: copy 160 bytes from val<<8 to OAM, completing
                // immediately; CPU access restrictions are not modelled.
                self.ppu.dma = val;
                let src = (val as u16) << 8;
                for i in 0..0xA0u16 {
                    let byte = self.read(src.wrapping_add(i));
                    self.ppu.oam[i as usize] = byte;
                }
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF4D if self.cgb_mode => self.speed_switch_armed = val & 0x01 != 0,
            0xFF4F if self.cgb_mode => self.ppu.write_reg(addr, val),
            0xFF51 if self.cgb_mode => {
                self.hdma_src = (self.hdma_src & 0x00FF) | ((val as u16) << 8);
            }
            0xFF52 if self.cgb_mode => {
                self.hdma_src = (self.hdma_src & 0xFF00) | (val & 0xF0) as u16;
            }
            0xFF53 if self.cgb_mode => {
                self.hdma_dst = (self.hdma_dst & 0x00FF) | (((val & 0x1F) as u16) << 8);
            }
            0xFF54 if self.cgb_mode => {
                self.hdma_dst = (self.hdma_dst & 0xFF00) | (val & 0xF0) as u16;
            }
            0xFF55 if self.cgb_mode => self.write_hdma_control(val),
            0xFF68..=0xFF6B if self.cgb_mode => self.ppu.write_reg(addr, val),
            0xFF70 if self.cgb_mode => {
                let bank = (val & 0x07) as usize;
                self.wram_bank = if bank == 0 { 1 } else { bank };
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    fn write_hdma_control(&mut self, val: u8) {
        if self.hdma_active && val & 0x80 == 0 {
            // Cancelling leaves the remaining length visible.
            self.hdma_active = false;
            self.hdma_length = val & 0x7F;
            return;
        }
        self.hdma_length = val & 0x7F;
        if val & 0x80 != 0 {
            // HBlank DMA: one block per HBlank, driven from tick().
            self.hdma_active = true;
        } else {
            // General DMA: the whole transfer happens now.
            self.hdma_active = false;
            let blocks = self.hdma_length as u16 + 1;
            for _ in 0..blocks {
                self.hdma_block();
            }
            self.hdma_length = 0xFF;
        }
    }

    fn high_wram_bank(&self) -> usize {
        if self.cgb_mode { self.wram_bank } else { 1 }
    }

    pub fn save_state(&self, out: &mut state::Writer) {
        for bank in self.wram.iter() {
            out.bytes(bank);
        }
        out.bytes(&self.hram);
        out.u8(self.if_reg);
        out.u8(self.ie_reg);
        self.joypad.save_state(out);
        self.serial.save_state(out);
        out.u8(self.wram_bank as u8);
        out.bool(self.double_speed);
        out.bool(self.speed_switch_armed);
        out.u16(self.hdma_src);
        out.u16(self.hdma_dst);
        out.u8(self.hdma_length);
        out.bool(self.hdma_active);
    }

    pub fn load_state(&mut self, r: &mut state::Reader) -> Result<(), state::StateError> {
        for bank in self.wram.iter_mut() {
            r.bytes(bank)?;
        }
        r.bytes(&mut self.hram)?;
        self.if_reg = r.u8()? & 0x1F;
        self.ie_reg = r.u8()?;
        self.joypad.load_state(r)?;
        self.serial.load_state(r)?;
        self.wram_bank = (r.u8()? & 0x07).max(1) as usize;
        self.double_speed = r.bool()?;
        self.speed_switch_armed = r.bool()?;
        self.hdma_src = r.u16()?;
        self.hdma_dst = r.u16()?;
        self.hdma_length = r.u8()?;
        self.hdma_active = r.bool()?;
        Ok(())
    }
}
