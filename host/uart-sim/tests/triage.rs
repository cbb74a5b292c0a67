//! Frame extraction through the real module and a simulated DMA stream.

use uart_core::{Module, ModuleConfig, Triage, UartModule};
use uart_sim::{SimClock, SimUart};

fn module(rx_len: usize) -> (UartModule<SimUart, SimClock>, SimUart) {
    module_with(rx_len, SimUart::new().with_lap_reporting(true))
}

fn module_with(rx_len: usize, port: SimUart) -> (UartModule<SimUart, SimClock>, SimUart) {
    let config = ModuleConfig::with_buffers(rx_len, rx_len);
    let uart = UartModule::new("test", port.clone(), SimClock::default(), config);
    (uart, port)
}

fn pending_bytes(uart: &UartModule<SimUart, SimClock>) -> Vec<u8> {
    let mut bytes = vec![0u8; uart.available_bytes()];
    uart.peek(&mut bytes);
    bytes
}

#[test]
fn test_triage_start_delimited() {
    let (mut uart, port) = module(512);
    uart.set_start_sequence(b"sof");

    port.inject(b"Hello World!");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 12);

    port.inject(b"sofmsgsofsmgsof");
    uart.run();
    assert_eq!(uart.available_frames(), 2);
    assert_eq!(uart.available_bytes(), 3);

    assert_eq!(uart.receive_frame(), "msg");
    assert_eq!(uart.available_frames(), 1);
    assert_eq!(uart.receive_frame(), "smg");
    assert_eq!(uart.available_frames(), 0);
}

#[test]
fn test_triage_end_delimited() {
    let (mut uart, port) = module(512);
    uart.set_end_sequence(b"eof");

    port.inject(b"Hello World!");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 12);

    port.inject(b"eofmsgeofsmgeof");
    uart.run();
    assert_eq!(uart.available_frames(), 3);
    assert_eq!(uart.available_bytes(), 0);

    assert_eq!(uart.receive_frame(), "Hello World!");
    assert_eq!(uart.receive_frame(), "msg");
    assert_eq!(uart.receive_frame(), "smg");
    assert_eq!(uart.available_frames(), 0);
}

#[test]
fn test_triage_fixed_length() {
    let (mut uart, port) = module(512);
    uart.set_expected_rx_len(10);

    port.inject(b"123456789");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 9);

    port.inject(b"0");
    uart.run();
    assert_eq!(uart.available_frames(), 1);
    assert_eq!(uart.available_bytes(), 0);

    port.inject(b"123456789012345678901");
    uart.run();
    assert_eq!(uart.available_frames(), 3);
    assert_eq!(uart.available_bytes(), 1);

    for _ in 0..3 {
        assert_eq!(uart.receive_frame(), "1234567890");
    }
    assert_eq!(uart.available_frames(), 0);
}

#[test]
fn test_triage_cleared_framing_keeps_bytes() {
    let (mut uart, port) = module(512);
    port.inject(b"1234567890");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 10);

    uart.set_start_sequence(b"1");
    uart.set_end_sequence(b"0");
    uart.clear_start_sequence();
    uart.clear_end_sequence();
    assert_eq!(uart.triage(), Triage::Unconfigured);
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 10);

    uart.set_expected_rx_len(10);
    uart.clear_expected_rx_len();
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 10);
}

#[test]
fn test_whole_lap_bursts_with_lap_reporting() {
    let (mut uart, port) = module(10);
    uart.set_start_sequence(b"1");
    uart.set_end_sequence(b"0");

    port.inject(b"12345");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    port.inject(b"67890");
    uart.run();
    assert_eq!(uart.available_frames(), 1);

    port.inject(b"12345");
    uart.run();
    assert_eq!(uart.available_frames(), 1);
    port.inject(b"67890");
    uart.run();
    assert_eq!(uart.available_frames(), 2);

    // Exactly one lap between two runs
    port.inject(b"1234567890");
    uart.run();
    assert_eq!(uart.available_frames(), 3);

    // More than a lap: the oldest bytes are gone, the newest frame survives
    port.inject(b"1234567890120");
    uart.run();
    assert_eq!(uart.available_frames(), 4);

    let frames: Vec<_> = (0..4).map(|_| uart.receive_frame()).collect();
    assert_eq!(frames[0], "23456789");
    assert_eq!(frames[2], "23456789");
    assert_eq!(frames[3], "2");
    assert_eq!(uart.available_bytes(), 0);
}

#[test]
fn test_whole_lap_burst_is_invisible_without_lap_reporting() {
    let (mut uart, port) = module_with(10, SimUart::new());
    uart.set_start_sequence(b"1");
    uart.set_end_sequence(b"0");

    port.inject(b"1234567890");
    uart.run();
    assert_eq!(uart.available_frames(), 0);
    assert_eq!(uart.available_bytes(), 0);

    port.inject(b"120");
    uart.run();
    assert_eq!(uart.receive_frame(), "2");
}

#[test]
fn test_sequence_through_small_ring() {
    let (mut uart, port) = module(50);
    uart.set_start_sequence(b"[");
    uart.set_end_sequence(b"]");

    for _ in 0..5 {
        port.inject(b"gibberish[Ceci est une trame]more gibberish");
        uart.run();
        assert_eq!(uart.available_frames(), 1);
        assert_eq!(uart.receive_frame(), "Ceci est une trame");
        assert_eq!(pending_bytes(&uart), b"more gibberish");
    }
}

#[test]
fn test_latest_start_wins() {
    let (mut uart, port) = module(64);
    uart.set_start_sequence(b"[");
    uart.set_end_sequence(b"]");

    port.inject(b"[a[b]c]x[");
    uart.run();
    assert_eq!(uart.available_frames(), 1);
    assert_eq!(uart.receive_frame(), "b");
    assert_eq!(pending_bytes(&uart), b"[");

    port.inject(b"d]");
    uart.run();
    assert_eq!(uart.receive_frame(), "d");
    assert_eq!(uart.available_bytes(), 0);
}

#[test]
fn test_shared_start_and_end_flag() {
    let (mut uart, port) = module(64);
    uart.set_start_sequence(b"~");
    uart.set_end_sequence(b"~");
    assert_eq!(uart.triage(), Triage::StartAndEnd);

    port.inject(b"xx~abc~~def~");
    uart.run();
    assert_eq!(uart.available_frames(), 2);
    assert_eq!(uart.receive_frame(), "abc");
    assert_eq!(uart.receive_frame(), "def");
    assert_eq!(pending_bytes(&uart), b"~");

    port.inject(b"ghi~");
    uart.run();
    assert_eq!(uart.receive_frame(), "ghi");
    assert_eq!(pending_bytes(&uart), b"~");
}

#[test]
fn test_shared_flag_loopback_with_escape() {
    let (mut uart, _port) = module_with(64, SimUart::new().with_loopback(true));
    uart.set_start_sequence(b"~");
    uart.set_end_sequence(b"~");
    uart.set_escape_sequence(b"}");

    uart.transmit(b"a~b").unwrap();
    uart.transmit(b"c}").unwrap();
    uart.run();
    assert_eq!(uart.receive_frame(), "a~b");
    assert_eq!(uart.receive_frame(), "c}");
    assert_eq!(uart.available_frames(), 0);
}

#[test]
fn test_escaped_delimiters_are_content() {
    let (mut uart, port) = module(64);
    uart.set_start_sequence(b"<");
    uart.set_end_sequence(b">");
    uart.set_escape_sequence(b"!");

    port.inject(b"<1!>2!<3!!>");
    uart.run();
    assert_eq!(uart.available_frames(), 1);
    assert_eq!(uart.receive_frame(), "1>2<3!");
}

#[test]
fn test_deep_backlog_drains_over_runs() {
    let port = SimUart::new().with_lap_reporting(true);
    let config = ModuleConfig {
        scan_depth: 3,
        ..ModuleConfig::with_buffers(64, 64)
    };
    let mut uart = UartModule::new("deep", port.clone(), SimClock::default(), config);
    uart.set_end_sequence(b";");

    port.inject(b"a;b;c;d;e;");
    uart.run();
    assert_eq!(uart.available_frames(), 2);

    // No new byte, the rescan finishes the job
    uart.run();
    assert_eq!(uart.available_frames(), 5);
    assert_eq!(uart.available_bytes(), 0);
}

#[test]
fn test_full_frame_queue_drops_new_frames() {
    let port = SimUart::new();
    let config = ModuleConfig {
        frame_depth: 2,
        ..ModuleConfig::default()
    };
    let mut uart = UartModule::new("small", port.clone(), SimClock::default(), config);
    uart.set_expected_rx_len(1);

    port.inject(b"abcd");
    uart.run();
    assert_eq!(uart.available_frames(), 2);
    assert_eq!(uart.dropped_frames(), 2);
    assert_eq!(uart.receive_frame(), "a");
    assert_eq!(uart.receive_frame(), "b");
}

#[test]
fn test_frames_carry_decode_time() {
    let port = SimUart::new();
    let clock = SimClock::new(0);
    let mut uart = UartModule::new("clock", port.clone(), clock.clone(), ModuleConfig::default());
    uart.set_end_sequence(b"\n");

    clock.advance(1234);
    port.inject(b"tick\n");
    uart.run();
    let frame = uart.receive_frame();
    assert_eq!(frame, "tick");
    assert_eq!(frame.timestamp, 1234);
}
