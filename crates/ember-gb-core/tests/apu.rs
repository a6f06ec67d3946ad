use ember_gb_core::apu::Apu;

fn trigger_square1(apu: &mut Apu, freq: u16, envelope: u8) {
    apu.write_reg(0xFF12, envelope);
    apu.write_reg(0xFF13, freq as u8);
    apu.write_reg(0xFF14, 0x80 | ((freq >> 8) as u8 & 0x07));
}

#[test]
fn trigger_sets_channel_active_flag() {
    let mut apu = Apu::new();
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);
    trigger_square1(&mut apu, 0x400, 0xF0);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn trigger_with_dac_off_does_not_enable() {
    let mut apu = Apu::new();
    // Top 5 bits of NRx2 clear -> DAC off.
    trigger_square1(&mut apu, 0x400, 0x00);
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn clearing_dac_kills_running_channel() {
    let mut apu = Apu::new();
    trigger_square1(&mut apu, 0x400, 0xF0);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
    apu.write_reg(0xFF12, 0x07); // volume 0, no add -> DAC off
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn length_counter_disables_channel() {
    let mut apu = Apu::new();
    apu.write_reg(0xFF11, 0x3E); // length counter = 64 - 62 = 2
    apu.write_reg(0xFF12, 0xF0);
    apu.write_reg(0xFF13, 0x00);
    apu.write_reg(0xFF14, 0xC0); // trigger with length enable

    // Length clocks at 256 Hz: two ticks need two sequencer steps that
    // clock length (steps 0 and 2), i.e. under 4 sequencer periods.
    apu.step(8192);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
    apu.step(8192 * 2);
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn length_without_enable_bit_keeps_running() {
    let mut apu = Apu::new();
    apu.write_reg(0xFF11, 0x3E);
    apu.write_reg(0xFF12, 0xF0);
    apu.write_reg(0xFF14, 0x80); // trigger, length disabled
    apu.step(8192 * 8);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn triggering_with_zero_length_reloads_max() {
    let mut apu = Apu::new();
    apu.write_reg(0xFF11, 0x3F); // length counter = 1
    apu.write_reg(0xFF12, 0xF0);
    apu.write_reg(0xFF14, 0xC0);
    apu.step(8192 * 2); // first length clock kills it
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);

    // Re-trigger with the counter at zero: reloads to 64.
    apu.write_reg(0xFF14, 0xC0);
    apu.step(8192 * 8); // a few length ticks, nowhere near 64
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn envelope_decreases_volume_towards_zero() {
    let mut apu = Apu::new();
    // Start at volume 2, decreasing, period 1: after two envelope ticks the
    // DAC input is silent but the channel stays enabled.
    trigger_square1(&mut apu, 0x400, 0x21);

    // Envelope clocks on sequencer step 7, once per 8 steps.
    apu.step(8192 * 8 * 3);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);

    // Volume saturated at zero: mixed output is silence.
    apu.clear_samples();
    apu.step(8192);
    assert!(apu.samples().iter().all(|s| *s == 0.0));
}

#[test]
fn sweep_overflow_disables_channel() {
    let mut apu = Apu::new();
    // Period 1, add, shift 1: from a high frequency the first sweep tick
    // overflows past 2047.
    apu.write_reg(0xFF10, 0x11);
    apu.write_reg(0xFF12, 0xF0);
    apu.write_reg(0xFF13, 0xFF);
    apu.write_reg(0xFF14, 0x80 | 0x07); // freq = 0x7FF
    // Immediate overflow check already killed it at trigger time.
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);

    // A moderate frequency survives the trigger check, then the sweep
    // iterations walk it over the edge.
    apu.write_reg(0xFF13, 0x00);
    apu.write_reg(0xFF14, 0x80 | 0x04); // freq = 0x400
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
    apu.step(8192 * 8);
    assert_eq!(apu.read_reg(0xFF26) & 0x01, 0);
}

#[test]
fn sweep_updates_frequency_registers() {
    let mut apu = Apu::new();
    apu.write_reg(0xFF10, 0x21); // period 2, add, shift 1
    apu.write_reg(0xFF12, 0xF0);
    apu.write_reg(0xFF13, 0x00);
    apu.write_reg(0xFF14, 0x81); // freq = 0x100

    // Sweep clocks on steps 2 and 6; after one sweep tick freq becomes
    // 0x100 + 0x80 = 0x180.
    apu.step(8192 * 8);
    assert_ne!(apu.read_reg(0xFF26) & 0x01, 0);
    // NR13 is write-only, but NR14's low bits read back through the mask.
    // Frequency low byte is observable via the next sweep arithmetic only;
    // check the channel is still alive and the high bits moved.
    assert_eq!(apu.read_reg(0xFF14) & 0xBF, 0xBF);
}

#[test]
fn noise_lfsr_advances_and_resets_on_trigger() {
    let mut apu = Apu::new();
    apu.write_reg(0xFF21, 0xF0);
    apu.write_reg(0xFF22, 0x00); // divisor 8, shift 0
    apu.write_reg(0xFF23, 0x80);
    assert_ne!(apu.read_reg(0xFF26) & 0x08, 0);

    // Noise at divisor 8 clocks every 8 cycles; the all-ones LFSR starts
    // producing zero outputs (bit0 = 1 -> silence) and then toggles.
    apu.clear_samples();
    apu.step(4096);
    // Channel keeps running.
    assert_ne!(apu.read_reg(0xFF26) & 0x08, 0);
}

#[test]
fn power_off_clears_registers_but_keeps_wave_ram() {
    let mut apu = Apu::new();
    trigger_square1(&mut apu, 0x400, 0xF0);
    apu.write_reg(0xFF24, 0x77);
    apu.write_reg(0xFF25, 0xFF);
    apu.write_reg(0xFF30, 0xAB);

    apu.write_reg(0xFF26, 0x00);
    assert_eq!(apu.read_reg(0xFF26) & 0x8F, 0x00);
    assert_eq!(apu.read_reg(0xFF24), 0x00);
    assert_eq!(apu.read_reg(0xFF25), 0x00);
    assert_eq!(apu.read_reg(0xFF30), 0xAB);

    // Writes are ignored while off, except NR52 and wave RAM.
    apu.write_reg(0xFF24, 0x55);
    assert_eq!(apu.read_reg(0xFF24), 0x00);
    apu.write_reg(0xFF31, 0xCD);
    assert_eq!(apu.read_reg(0xFF31), 0xCD);

    // Power back on: registers writable again.
    apu.write_reg(0xFF26, 0x80);
    apu.write_reg(0xFF24, 0x55);
    assert_eq!(apu.read_reg(0xFF24), 0x55);
}

#[test]
fn sample_cadence_matches_44100hz() {
    let mut apu = Apu::new();
    // One sample per (4194304 / 44100) = 95 T-cycles.
    apu.step(95 * 100);
    assert_eq!(apu.samples().len(), 100);

    apu.clear_samples();
    assert!(apu.samples().is_empty());

    // The buffer saturates instead of wrapping; the host drains it.
    apu.step(65_535);
    apu.step(65_535);
    apu.step(65_535);
    assert!(apu.samples().len() <= 2048);
    assert!(apu.buffer_full());
}

#[test]
fn wave_channel_volume_shift() {
    let mut apu = Apu::new();
    // Wave RAM: all samples at max (0xF nibbles).
    for i in 0..16u16 {
        apu.write_reg(0xFF30 + i, 0xFF);
    }
    apu.write_reg(0xFF1A, 0x80); // DAC on
    apu.write_reg(0xFF1C, 0x20); // 100% volume
    apu.write_reg(0xFF1D, 0x00);
    apu.write_reg(0xFF1E, 0x84); // trigger, freq 0x400
    assert_ne!(apu.read_reg(0xFF26) & 0x04, 0);

    // Route only channel 3, full master volume, and look at the mix.
    apu.write_reg(0xFF24, 0x77);
    apu.write_reg(0xFF25, 0x44);
    apu.clear_samples();
    apu.step(8192);
    let max = apu
        .samples()
        .iter()
        .cloned()
        .fold(0.0f32, |a, b| a.max(b.abs()));
    assert!(max > 0.2, "wave channel should be audible, got {max}");

    // 25% volume code shifts samples right twice.
    apu.write_reg(0xFF1C, 0x60);
    apu.clear_samples();
    apu.step(8192);
    let quarter = apu
        .samples()
        .iter()
        .cloned()
        .fold(0.0f32, |a, b| a.max(b.abs()));
    assert!(quarter < max / 2.0);
}
