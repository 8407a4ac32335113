//! Criterion benchmarks for the CH9329 frame codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package usbkvm-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use usbkvm_core::protocol::ch9329::{
    absolute_mouse_payload, encode_frame, keyboard_payload, relative_mouse_payload, ChipCommand,
    FrameDecoder,
};
use usbkvm_core::{HidKeyCode, KeyboardKeyBuffer, MouseStateBuffer, Resolution};

fn bench_encode_keyboard(c: &mut Criterion) {
    let mut keys = KeyboardKeyBuffer::new();
    for key in [
        HidKeyCode::ShiftLeft,
        HidKeyCode::KeyA,
        HidKeyCode::KeyS,
        HidKeyCode::KeyD,
    ] {
        keys.press(key);
    }
    let snapshot = keys.snapshot();

    c.bench_function("encode_keyboard_frame", |b| {
        b.iter(|| encode_frame(ChipCommand::SendKeyboard, &keyboard_payload(black_box(&snapshot))))
    });
}

fn bench_encode_mouse(c: &mut Criterion) {
    let mut absolute = MouseStateBuffer::new();
    absolute.set_point_absolute(0.33, 0.66);
    let absolute = absolute.snapshot();

    let mut relative = MouseStateBuffer::new();
    relative.set_point_relative_delta(12, -7);
    let relative = relative.snapshot();

    let screen = Resolution::new(1920, 1080);
    let mut group = c.benchmark_group("encode_mouse_frame");
    group.bench_function("absolute", |b| {
        b.iter(|| {
            encode_frame(
                ChipCommand::SendMouseAbsolute,
                &absolute_mouse_payload(black_box(&absolute), screen),
            )
        })
    });
    group.bench_function("relative", |b| {
        b.iter(|| {
            encode_frame(
                ChipCommand::SendMouseRelative,
                &relative_mouse_payload(black_box(&relative)),
            )
        })
    });
    group.finish();
}

/// Decodes a GET_INFO reply fed one byte at a time, the worst case for a
/// slow serial line.
fn bench_decode_bytewise(c: &mut Criterion) {
    let reply = [
        0x57, 0xAB, 0x00, 0x81, 0x08, 0x30, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xBE,
    ];

    c.bench_function("decode_info_reply_bytewise", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut frames = 0;
            for byte in reply {
                decoder.push(&[byte]);
                while let Some(Ok(_)) = decoder.next_frame() {
                    frames += 1;
                }
            }
            black_box(frames)
        })
    });
}

criterion_group!(benches, bench_encode_keyboard, bench_encode_mouse, bench_decode_bytewise);
criterion_main!(benches);
