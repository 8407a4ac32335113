//! Integration tests for the usbkvm-core input pipeline.
//!
//! These tests drive buffers, geometry and the frame codec together through
//! the public API, the same way the client crate does for one input event.

use usbkvm_core::protocol::ch9329::{
    absolute_mouse_payload, encode_frame, keyboard_payload, relative_mouse_payload, ChipCommand,
    FrameDecoder,
};
use usbkvm_core::{
    expand_text, AbsoluteMapper, ButtonState, HidKeyCode, KeyState, KeyboardKeyBuffer,
    MouseButton, MouseStateBuffer, Point, RelativeTracker, Resolution, Viewport, WheelState,
};

#[test]
fn test_keyboard_report_never_exceeds_six_keys() {
    // Arrange
    let mut buffer = KeyboardKeyBuffer::new();
    let keys = [
        HidKeyCode::KeyQ,
        HidKeyCode::KeyW,
        HidKeyCode::KeyE,
        HidKeyCode::KeyR,
        HidKeyCode::KeyT,
        HidKeyCode::KeyY,
        HidKeyCode::KeyU,
        HidKeyCode::KeyI,
    ];

    // Act
    for key in keys {
        buffer.press(key);
    }
    let data = keyboard_payload(&buffer.snapshot());

    // Assert
    assert_eq!(&data[2..], &[0x14, 0x1A, 0x08, 0x15, 0x17, 0x1C]);
    assert_eq!(buffer.key_state(HidKeyCode::KeyU), KeyState::Released);
    assert_eq!(buffer.key_state(HidKeyCode::KeyI), KeyState::Released);
}

#[test]
fn test_tap_sequence_frees_slot_after_report() {
    let mut buffer = KeyboardKeyBuffer::new();
    for key in [
        HidKeyCode::Digit1,
        HidKeyCode::Digit2,
        HidKeyCode::Digit3,
        HidKeyCode::Digit4,
        HidKeyCode::Digit5,
        HidKeyCode::Digit6,
    ] {
        buffer.press(key);
    }

    // Releasing one key and flushing makes room for a new one.
    buffer.release(HidKeyCode::Digit1);
    let _ = keyboard_payload(&buffer.snapshot());
    buffer.clear_released();
    buffer.press(HidKeyCode::Digit7);

    assert_eq!(buffer.key_state(HidKeyCode::Digit7), KeyState::Pressed);
    assert_eq!(buffer.snapshot().keys.len(), 6);
}

#[test]
fn test_typing_hello_with_caps_lock_on() {
    let strokes = expand_text("Hello!", true);

    assert_eq!(strokes.len(), 7);
    assert_eq!(strokes[0].key, HidKeyCode::CapsLock);
    let shifted: Vec<HidKeyCode> = strokes.iter().filter(|s| s.shift).map(|s| s.key).collect();
    assert_eq!(shifted, vec![HidKeyCode::KeyH, HidKeyCode::Digit1]);
}

#[test]
fn test_absolute_pointer_to_frame() {
    // Arrange: 1000x1000 viewport showing a 1920x1080 screen
    let mapper = AbsoluteMapper::new(Resolution::new(1920, 1080), true);
    let viewport = Viewport::new(0.0, 0.0, 1000.0, 1000.0);
    let mut mouse = MouseStateBuffer::new();

    // Act: pointer in the top bar clamps to y = 0
    let (x, y) = mapper.normalize(&viewport, Point::new(1000.0, 5.0));
    mouse.set_point_absolute(x, y);
    let data = absolute_mouse_payload(&mouse.snapshot(), Resolution::new(1920, 1080));

    // Assert
    assert_eq!((x, y), (1.0, 0.0));
    assert_eq!(u16::from_le_bytes([data[2], data[3]]), 4096);
    assert_eq!(u16::from_le_bytes([data[4], data[5]]), 0);
}

#[test]
fn test_relative_motion_accumulates_into_one_report() {
    // Arrange
    let center = Point::new(400.0, 300.0);
    let mut tracker = RelativeTracker::new(1.0);
    let mut mouse = MouseStateBuffer::new();

    // Act
    let seed = tracker.sample(center, center);
    if seed.seeded {
        mouse.clear_point();
    }
    for pointer in [Point::new(402.0, 303.0), Point::new(401.0, 304.0)] {
        let sample = tracker.sample(pointer, center);
        mouse.set_point_relative_delta(sample.delta.0, sample.delta.1);
    }
    let data = relative_mouse_payload(&mouse.snapshot());
    mouse.clear_point();

    // Assert: (2, 3) + (-1, 1) = (1, 4)
    assert_eq!(data[2] as i8, 1);
    assert_eq!(data[3] as i8, 4);
    assert_eq!(mouse.snapshot().relative_delta(), (0, 0));
}

#[test]
fn test_wheel_is_one_shot_across_reports() {
    let mut mouse = MouseStateBuffer::new();
    mouse.set_button(MouseButton::Right, ButtonState::Pressed);
    mouse.set_wheel(WheelState::Down);

    let first = relative_mouse_payload(&mouse.snapshot());
    mouse.clear_wheel();
    let second = relative_mouse_payload(&mouse.snapshot());

    assert_eq!(first[4], 0x01);
    assert_eq!(second[4], 0x00);
    assert_eq!(second[1], 0x02, "button stays held across reports");
}

#[test]
fn test_encoded_frame_decodes_back() {
    let mut buffer = KeyboardKeyBuffer::new();
    buffer.press(HidKeyCode::ControlLeft);
    buffer.press(HidKeyCode::KeyC);
    let bytes = encode_frame(ChipCommand::SendKeyboard, &keyboard_payload(&buffer.snapshot()))
        .expect("keyboard frame fits");

    let mut decoder = FrameDecoder::new();
    decoder.push(&bytes);
    let frame = decoder
        .next_frame()
        .expect("complete frame")
        .expect("valid checksum");

    assert_eq!(frame.command, ChipCommand::SendKeyboard.code());
    assert_eq!(frame.data, vec![0x01, 0x00, 0x06, 0, 0, 0, 0, 0]);
}
