use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;

use crate::state;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read ROM: {0}")]
    Io(#[from] io::Error),
    #[error("ROM image too small ({len} bytes)")]
    TooSmall { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc3,
    Mbc5,
}

const VALID_NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

/// Cartridge header fields, parsed once at load.
#[derive(Debug, Clone)]
pub struct Header {
    pub entry_point: [u8; 4],
    pub nintendo_logo: [u8; 48],
    pub title: String,
    pub manufacturer_code: [u8; 4],
    pub cgb_flag: u8,
    pub new_licensee_code: [u8; 2],
    pub sgb_flag: u8,
    pub cartridge_type: u8,
    pub rom_size: u8,
    pub ram_size: u8,
    pub destination_code: u8,
    pub old_licensee_code: u8,
    pub version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl Header {
    fn parse(data: &[u8]) -> Self {
        let byte = |addr: usize| data.get(addr).copied().unwrap_or(0);

        let mut entry_point = [0; 4];
        for (i, b) in entry_point.iter_mut().enumerate() {
            *b = byte(0x0100 + i);
        }
        let mut nintendo_logo = [0; 48];
        for (i, b) in nintendo_logo.iter_mut().enumerate() {
            *b = byte(0x0104 + i);
        }

        let mut title = String::new();
        for i in 0..16 {
            let c = byte(0x0134 + i);
            if c == 0 {
                break;
            }
            title.push(c as char);
        }

        let mut manufacturer_code = [0; 4];
        for (i, b) in manufacturer_code.iter_mut().enumerate() {
            *b = byte(0x013F + i);
        }

        Self {
            entry_point,
            nintendo_logo,
            title,
            manufacturer_code,
            cgb_flag: byte(0x0143),
            new_licensee_code: [byte(0x0144), byte(0x0145)],
            sgb_flag: byte(0x0146),
            cartridge_type: byte(0x0147),
            rom_size: byte(0x0148),
            ram_size: byte(0x0149),
            destination_code: byte(0x014A),
            old_licensee_code: byte(0x014B),
            version: byte(0x014C),
            header_checksum: byte(0x014D),
            global_checksum: ((byte(0x014E) as u16) << 8) | byte(0x014F) as u16,
        }
    }

    /// CGB flag 0x80 (dual) or 0xC0 (CGB only) selects color mode.
    pub fn cgb_supported(&self) -> bool {
        self.cgb_flag & 0x80 != 0
    }

    pub fn declared_rom_size(&self) -> usize {
        0x8000usize << self.rom_size.min(8)
    }

    pub fn declared_ram_size(&self) -> usize {
        match self.ram_size {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }
}

/// MBC3 real-time clock registers. `days` carries the full 9-bit counter;
/// halt/carry are bits 6/7 of the DaysHigh register on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn days_low(&self) -> u8 {
        (self.days & 0xFF) as u8
    }

    fn days_high(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn set_days_high(&mut self, val: u8) {
        self.days = (self.days & 0x00FF) | (((val & 0x01) as u16) << 8);
        self.halt = val & 0x40 != 0;
        self.carry = val & 0x80 != 0;
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds,
            0x09 => self.minutes,
            0x0A => self.hours,
            0x0B => self.days_low(),
            0x0C => self.days_high(),
            _ => 0xFF,
        }
    }
}

/// Wall-clock backed RTC: registers are only folded forward when the game
/// latches or writes them, from the elapsed time since `base_timestamp`.
#[derive(Debug, Clone)]
struct Mbc3Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    base_timestamp: i64,
    /// Previous value written to the 0x6000-0x7FFF latch port.
    latch_prev: u8,
}

impl Mbc3Rtc {
    fn new(now: i64) -> Self {
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            base_timestamp: now,
            latch_prev: 0xFF,
        }
    }

    /// Fold wall-clock time elapsed since the base timestamp into the
    /// registers. Days wrap at 512, setting the carry bit.
    fn update(&mut self, now: i64) {
        if self.regs.halt {
            return;
        }
        let elapsed = now - self.base_timestamp;
        if elapsed <= 0 {
            return;
        }
        self.base_timestamp = now;

        let mut total = self.regs.days as i64 * 86_400
            + self.regs.hours as i64 * 3_600
            + self.regs.minutes as i64 * 60
            + self.regs.seconds as i64
            + elapsed;

        self.regs.seconds = (total % 60) as u8;
        total /= 60;
        self.regs.minutes = (total % 60) as u8;
        total /= 60;
        self.regs.hours = (total % 24) as u8;
        total /= 24;

        if total > 511 {
            self.regs.carry = true;
        }
        self.regs.days = (total & 0x01FF) as u16;
    }

    /// Latch port write. A 0x00 -> 0x01 sequence snapshots the counters.
    fn write_latch(&mut self, val: u8, now: i64) {
        if self.latch_prev == 0x00 && val == 0x01 {
            self.update(now);
            self.latched = self.regs;
        }
        self.latch_prev = val;
    }

    fn write_register(&mut self, reg: u8, val: u8, now: i64) {
        // Fold elapsed time in first so it is not lost, then re-base.
        self.update(now);
        match reg {
            0x08 => self.regs.seconds = val & 0x3F,
            0x09 => self.regs.minutes = val & 0x3F,
            0x0A => self.regs.hours = val & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | val as u16,
            0x0C => self.regs.set_days_high(val & 0xC1),
            _ => {}
        }
        self.base_timestamp = now;
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Mbc3Rtc>,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub header: Header,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Load a ROM image from a file, restoring battery-backed RAM (and the
    /// RTC tail) from the `.sav` next to it when the cartridge declares a
    /// battery.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        if data.len() < 0x150 {
            return Err(CartridgeError::TooSmall { len: data.len() });
        }
        let mut cart = Self::load(data);

        if cart.has_battery() {
            let save = path.as_ref().with_extension("sav");
            if let Ok(bytes) = fs::read(&save) {
                cart.restore_save_ram(&bytes);
            }
            cart.save_path = Some(save);
        }

        log::info!(
            "loaded ROM: {} (MBC: {:?}, CGB: {})",
            cart.header.title,
            cart.mbc,
            if cart.is_cgb() { "yes" } else { "no" }
        );
        Ok(cart)
    }

    /// Construct from an in-memory ROM image. Header validation is advisory:
    /// a bad logo or checksum is logged but never rejected.
    pub fn load(data: Vec<u8>) -> Self {
        let header = Header::parse(&data);
        let ram_size = header.declared_ram_size();
        let now = unix_now();

        let mbc = match header.cartridge_type {
            0x00 | 0x08 | 0x09 => MbcType::NoMbc,
            0x01..=0x03 => MbcType::Mbc1,
            0x0F..=0x13 => MbcType::Mbc3,
            0x19..=0x1E => MbcType::Mbc5,
            other => {
                log::warn!("unknown cartridge type {other:#04X}, treating as ROM-only");
                MbcType::NoMbc
            }
        };

        let has_rtc = matches!(header.cartridge_type, 0x0F | 0x10);
        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: has_rtc.then(|| Mbc3Rtc::new(now)),
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        let cart = Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            header,
            save_path: None,
            mbc_state,
        };

        if cart.header.nintendo_logo != VALID_NINTENDO_LOGO {
            log::warn!("cartridge logo does not match the boot ROM's copy");
        }
        if !cart.validate_header_checksum() {
            log::warn!("cartridge header checksum mismatch");
        }
        cart
    }

    /// Test/embedding constructor with an explicit RAM size.
    pub fn from_bytes_with_ram(data: Vec<u8>, ram_size: usize) -> Self {
        let mut cart = Self::load(data);
        cart.ram = vec![0; ram_size];
        cart
    }

    pub fn is_cgb(&self) -> bool {
        self.header.cgb_supported()
    }

    pub fn validate_header_checksum(&self) -> bool {
        let mut checksum = 0u8;
        for addr in 0x0134..=0x014C {
            let byte = self.rom.get(addr).copied().unwrap_or(0);
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        checksum == self.header.header_checksum
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / 0x4000).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    ram_bank, mode, ..
                },
                0x0000..=0x3FFF,
            ) => {
                // Mode 1 on large carts routes the upper selector into the
                // fixed window as well.
                let bank = if *mode == 1 && self.rom.len() >= 0x10_0000 {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                } else {
                    0
                };
                let offset = bank * 0x4000 + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                let offset = (bank % rom_bank_count) * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (if *rom_bank == 0 { 1 } else { *rom_bank }) as usize % rom_bank_count;
                let offset = bank * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = *rom_bank as usize % rom_bank_count;
                let offset = bank * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => self
                .ram
                .get(addr as usize - 0xA000)
                .copied()
                .unwrap_or(0xFF),
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = self.ram_index(addr);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = self.ram_index(addr);
                            self.ram.get(idx).copied().unwrap_or(0xFF)
                        }
                        // RTC reads come from the latched snapshot.
                        0x08..=0x0C => rtc
                            .as_ref()
                            .map(|r| r.latched.read(*ram_bank))
                            .unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = self.ram_index(addr);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let now = unix_now();
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (MbcState::Mbc3 { rtc, .. }, 0x6000..=0x7FFF) => {
                if let Some(rtc) = rtc.as_mut() {
                    rtc.write_latch(val, now);
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = self.ram_index(addr);
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(*ram_bank, val, now);
                            }
                        }
                        _ => {}
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let ram_bank_count = self.ram.len().div_ceil(0x2000);
        let offset = addr as usize - 0xA000;
        match &self.mbc_state {
            MbcState::NoMbc => offset,
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                if *mode == 0 || ram_bank_count == 0 {
                    offset
                } else {
                    ((*ram_bank as usize) % ram_bank_count) * 0x2000 + offset
                }
            }
            MbcState::Mbc3 { ram_bank, .. } => {
                if ram_bank_count == 0 {
                    offset
                } else {
                    (((*ram_bank as usize) & 0x03) % ram_bank_count) * 0x2000 + offset
                }
            }
            MbcState::Mbc5 { ram_bank, .. } => {
                if ram_bank_count == 0 {
                    offset
                } else {
                    ((*ram_bank as usize) % ram_bank_count) * 0x2000 + offset
                }
            }
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.header.cartridge_type,
            0x03 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    fn has_rtc(&self) -> bool {
        matches!(self.header.cartridge_type, 0x0F | 0x10)
    }

    fn rtc(&self) -> Option<&Mbc3Rtc> {
        match &self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    fn rtc_mut(&mut self) -> Option<&mut Mbc3Rtc> {
        match &mut self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    /// Serialize battery-backed RAM, with the VBA-M RTC tail (10 LE u32
    /// register words plus an LE i64 Unix timestamp) when a timer is fitted.
    pub fn save_ram_bytes(&self) -> Vec<u8> {
        let mut out = self.ram.clone();
        if let Some(rtc) = self.rtc() {
            let regs = [
                rtc.regs.seconds,
                rtc.regs.minutes,
                rtc.regs.hours,
                rtc.regs.days_low(),
                rtc.regs.days_high(),
                rtc.latched.seconds,
                rtc.latched.minutes,
                rtc.latched.hours,
                rtc.latched.days_low(),
                rtc.latched.days_high(),
            ];
            for reg in regs {
                out.extend_from_slice(&(reg as u32).to_le_bytes());
            }
            out.extend_from_slice(&rtc.base_timestamp.to_le_bytes());
        }
        out
    }

    /// Restore from a `.sav` image. Accepts a bare RAM dump or one carrying
    /// the RTC tail; anything else is ignored.
    pub fn restore_save_ram(&mut self, bytes: &[u8]) {
        let ram_len = self.ram.len();
        let expected_with_rtc = ram_len + 48;
        if bytes.len() != ram_len && bytes.len() != expected_with_rtc {
            log::warn!(
                "save file size {} does not match RAM size {ram_len}, ignoring",
                bytes.len()
            );
            return;
        }

        self.ram.copy_from_slice(&bytes[..ram_len]);

        if self.has_rtc() && bytes.len() == expected_with_rtc {
            let tail = &bytes[ram_len..];
            let word = |i: usize| {
                u32::from_le_bytes(tail[i * 4..i * 4 + 4].try_into().unwrap()) as u8
            };
            if let Some(rtc) = self.rtc_mut() {
                rtc.regs.seconds = word(0);
                rtc.regs.minutes = word(1);
                rtc.regs.hours = word(2);
                rtc.regs.days = word(3) as u16;
                rtc.regs.set_days_high(word(4));
                rtc.latched.seconds = word(5);
                rtc.latched.minutes = word(6);
                rtc.latched.hours = word(7);
                rtc.latched.days = word(8) as u16;
                rtc.latched.set_days_high(word(9));
                rtc.base_timestamp = i64::from_le_bytes(tail[40..48].try_into().unwrap());
                rtc.update(unix_now());
            }
        }
    }

    /// Write battery-backed RAM to the save path recorded at load time.
    pub fn save_ram(&mut self) -> io::Result<()> {
        if !self.has_battery() || (self.ram.is_empty() && !self.has_rtc()) {
            return Ok(());
        }
        if let Some(rtc) = self.rtc_mut() {
            rtc.update(unix_now());
        }
        if let Some(path) = &self.save_path {
            fs::write(path, self.save_ram_bytes())?;
        }
        Ok(())
    }

    pub fn save_state(&self, out: &mut state::Writer) {
        let (rom_bank, ram_bank, ram_enable, mode) = match &self.mbc_state {
            MbcState::NoMbc => (0u16, 0u8, false, 0u8),
            MbcState::Mbc1 {
                rom_bank,
                ram_bank,
                mode,
                ram_enable,
            } => (*rom_bank as u16, *ram_bank, *ram_enable, *mode),
            MbcState::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enable,
                ..
            } => (*rom_bank as u16, *ram_bank, *ram_enable, 0),
            MbcState::Mbc5 {
                rom_bank,
                ram_bank,
                ram_enable,
            } => (*rom_bank, *ram_bank, *ram_enable, 0),
        };
        out.u16(rom_bank);
        out.u8(ram_bank);
        out.bool(ram_enable);
        out.u8(mode);
        out.vec(&self.ram);

        // The save-state blob carries the latch bookkeeping byte that the
        // battery .sav layout leaves out.
        if let Some(rtc) = self.rtc() {
            out.u8(rtc.regs.seconds);
            out.u8(rtc.regs.minutes);
            out.u8(rtc.regs.hours);
            out.u8(rtc.regs.days_low());
            out.u8(rtc.regs.days_high());
            out.u8(rtc.latched.seconds);
            out.u8(rtc.latched.minutes);
            out.u8(rtc.latched.hours);
            out.u8(rtc.latched.days_low());
            out.u8(rtc.latched.days_high());
            out.i64(rtc.base_timestamp);
            out.u8(rtc.latch_prev);
        }
    }

    pub fn load_state(&mut self, r: &mut state::Reader) -> Result<(), state::StateError> {
        let rom_bank = r.u16()?;
        let ram_bank = r.u8()?;
        let ram_enable = r.bool()?;
        let mode = r.u8()?;
        let ram = r.vec()?;

        match &mut self.mbc_state {
            MbcState::NoMbc => {}
            MbcState::Mbc1 {
                rom_bank: rb,
                ram_bank: xb,
                mode: m,
                ram_enable: en,
            } => {
                *rb = (rom_bank as u8) & 0x1F;
                *xb = ram_bank & 0x03;
                *m = mode & 0x01;
                *en = ram_enable;
            }
            MbcState::Mbc3 {
                rom_bank: rb,
                ram_bank: xb,
                ram_enable: en,
                ..
            } => {
                *rb = (rom_bank as u8) & 0x7F;
                *xb = ram_bank;
                *en = ram_enable;
            }
            MbcState::Mbc5 {
                rom_bank: rb,
                ram_bank: xb,
                ram_enable: en,
            } => {
                *rb = rom_bank & 0x1FF;
                *xb = ram_bank & 0x0F;
                *en = ram_enable;
            }
        }
        if ram.len() == self.ram.len() {
            self.ram = ram;
        }

        if self.has_rtc() {
            let seconds = r.u8()?;
            let minutes = r.u8()?;
            let hours = r.u8()?;
            let days_low = r.u8()?;
            let days_high = r.u8()?;
            let lat_seconds = r.u8()?;
            let lat_minutes = r.u8()?;
            let lat_hours = r.u8()?;
            let lat_days_low = r.u8()?;
            let lat_days_high = r.u8()?;
            let base_timestamp = r.i64()?;
            let latch_prev = r.u8()?;
            if let Some(rtc) = self.rtc_mut() {
                rtc.regs.seconds = seconds;
                rtc.regs.minutes = minutes;
                rtc.regs.hours = hours;
                rtc.regs.days = days_low as u16;
                rtc.regs.set_days_high(days_high);
                rtc.latched.seconds = lat_seconds;
                rtc.latched.minutes = lat_minutes;
                rtc.latched.hours = lat_hours;
                rtc.latched.days = lat_days_low as u16;
                rtc.latched.set_days_high(lat_days_high);
                rtc.base_timestamp = base_timestamp;
                rtc.latch_prev = latch_prev;
            }
        }
        Ok(())
    }
}
