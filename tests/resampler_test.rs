//! Round trips through the polyphase resampler at the supported SDR ratios.

use approx::assert_relative_eq;
use sdrmodem::constants::FM_SAMPLE_RATE;
use sdrmodem::fixed_point::Q15;
use sdrmodem::signal_processing::RationalResampler;
use sdrmodem::simulation::{measure_tone, multitone, tone};

const FS: f64 = FM_SAMPLE_RATE as f64;

/// Baseband to `sdr_rate` and back, in one call each way.
fn round_trip(input: &[Q15], sdr_rate: u32) -> Vec<Q15> {
    let mut up = RationalResampler::for_rates(FM_SAMPLE_RATE, sdr_rate).unwrap();
    let mut down = RationalResampler::for_rates(sdr_rate, FM_SAMPLE_RATE).unwrap();

    let mut wide = vec![0; up.output_length(input.len())];
    let n = up.resample(input, &mut wide);
    let mut out = vec![0; down.output_length(n)];
    let m = down.resample(&wide[..n], &mut out);
    out.truncate(m);
    out
}

fn check_tone_round_trip(sdr_rate: u32) {
    let input = tone(1000.0, 10000.0, FS, 4800);
    let output = round_trip(&input, sdr_rate);
    assert!(
        output.len() >= 4790,
        "{} Hz: only {} samples came back",
        sdr_rate,
        output.len()
    );

    // 100 whole cycles clear of the start-up transient
    let m = measure_tone(&output[240..2640], 1000.0, FS);
    assert_relative_eq!(m.amplitude, 10000.0, max_relative = 0.02);
    assert!(m.dc.abs() < 20.0, "{} Hz: dc {}", sdr_rate, m.dc);
    assert!(m.snr_db() > 35.0, "{} Hz: SNR {:.1} dB", sdr_rate, m.snr_db());
}

#[test]
fn test_round_trip_96k() {
    check_tone_round_trip(96_000);
}

#[test]
fn test_round_trip_32k() {
    check_tone_round_trip(32_000);
}

#[test]
fn test_round_trip_1mhz() {
    check_tone_round_trip(1_000_000);
}

#[test]
fn test_passband_is_flat_for_multitone() {
    let tones = [(500.0, 6000.0), (1300.0, 6000.0), (2900.0, 6000.0)];
    let input = multitone(&tones, FS, 4800);
    let output = round_trip(&input, 96_000);

    // 2400 samples hold a whole number of cycles of every tone, so the fits
    // do not leak into each other.
    let window = &output[480..2880];
    for &(freq, amplitude) in &tones {
        let m = measure_tone(window, freq, FS);
        assert_relative_eq!(m.amplitude, amplitude, max_relative = 0.03);
    }
}

#[test]
fn test_chunked_processing_matches_single_call() {
    let input = tone(700.0, 12000.0, FS, 3000);

    let mut whole = RationalResampler::for_rates(FM_SAMPLE_RATE, 32_000).unwrap();
    let mut expected = vec![0; whole.output_length(input.len())];
    let n = whole.resample(&input, &mut expected);
    expected.truncate(n);

    let mut chunked = RationalResampler::for_rates(FM_SAMPLE_RATE, 32_000).unwrap();
    let mut got = Vec::new();
    for chunk in input.chunks(37) {
        let mut out = vec![0; chunked.output_length(chunk.len())];
        let k = chunked.resample(chunk, &mut out);
        got.extend_from_slice(&out[..k]);
    }

    assert_eq!(got, expected);
}

#[test]
fn test_image_above_baseband_is_rejected() {
    // 20 kHz is in the stopband of the way down and must not alias into the
    // audio.
    let wide = tone(20_000.0, 10000.0, 96_000.0, 9600);
    let mut down = RationalResampler::for_rates(96_000, FM_SAMPLE_RATE).unwrap();
    let mut out = vec![0; down.output_length(wide.len())];
    let n = down.resample(&wide, &mut out);

    // 20 kHz folds to 4 kHz at 24 kHz.
    let m = measure_tone(&out[240..n.min(2640)], 4000.0, FS);
    assert!(m.amplitude < 50.0, "alias amplitude {}", m.amplitude);
}
