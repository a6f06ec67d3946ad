#![allow(dead_code)]

use ember_gb_core::{cartridge::Cartridge, gameboy::GameBoy};

/// Canonical logo bytes so synthetic images look like real cartridges.
pub const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

/// Build a ROM image with a plausible header. `banks` is the number of
/// 16 KiB ROM banks (minimum 2).
pub fn rom_image(cart_type: u8, banks: usize, ram_size_code: u8) -> Vec<u8> {
    let banks = banks.max(2);
    let mut rom = vec![0u8; banks * 0x4000];
    rom[0x0104..0x0134].copy_from_slice(&NINTENDO_LOGO);
    for (i, b) in b"EMBER TEST".iter().enumerate() {
        rom[0x0134 + i] = *b;
    }
    rom[0x0147] = cart_type;
    rom[0x0148] = (banks / 2).trailing_zeros() as u8;
    rom[0x0149] = ram_size_code;

    let mut checksum = 0u8;
    for addr in 0x0134..=0x014C {
        checksum = checksum.wrapping_sub(rom[addr]).wrapping_sub(1);
    }
    rom[0x014D] = checksum;
    rom
}

/// 32 KiB ROM-only image with `code` placed at the entry point 0x0100.
pub fn program_rom(code: &[u8]) -> Vec<u8> {
    let mut rom = rom_image(0x00, 2, 0x00);
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom
}

/// Same, with the CGB flag set so the machine comes up in color mode.
pub fn program_rom_cgb(code: &[u8]) -> Vec<u8> {
    let mut rom = program_rom(code);
    rom[0x0143] = 0x80;
    rom
}

/// A DMG machine executing `code` from 0x0100.
pub fn gameboy_with(code: &[u8]) -> GameBoy {
    GameBoy::new(Cartridge::load(program_rom(code)))
}

/// A CGB machine executing `code` from 0x0100.
pub fn gameboy_with_cgb(code: &[u8]) -> GameBoy {
    GameBoy::new(Cartridge::load(program_rom_cgb(code)))
}
