use linmaster::database::SignalDatabase;
use linmaster::dispatch::{FrameReport, RxSink};
use linmaster::master::{BusMaster, MasterError, DEFAULT_BAUD_RATE, FADER_PERIOD_MS};
use linmaster::transport::{ErrorFlags, RxFrame, SimBus};
use linmaster::ShellCommand;

#[derive(Default)]
struct RecordingSink {
    reports: Vec<FrameReport>,
}

impl RxSink for RecordingSink {
    fn report(&mut self, report: &FrameReport) {
        self.reports.push(report.clone());
    }
}

fn demo_master(boards: &[u8]) -> BusMaster<SimBus> {
    let db = SignalDatabase::eval_network(boards).unwrap();
    let mut master = BusMaster::new(db, SimBus::new(boards), DEFAULT_BAUD_RATE).unwrap();
    for &board in boards {
        master.register_board(board).unwrap();
        master.add_demo_generators(board).unwrap();
    }
    master
}

fn shell_master(boards: &[u8]) -> BusMaster<SimBus> {
    let db = SignalDatabase::eval_network(boards).unwrap();
    let mut master = BusMaster::new(db, SimBus::new(boards), DEFAULT_BAUD_RATE).unwrap();
    master.register_publishable().unwrap();
    master.start_schedule().unwrap();
    master
}

#[test]
fn test_demo_ticks_advance_fader_and_receive_traffic() {
    let mut master = demo_master(&[0]);
    master.start_schedule().unwrap();
    let mut sink = RecordingSink::default();

    // Five scheduler rounds; the driver read inside each tick also pulls
    // simulated bus traffic back in.
    for round in 1..=5u64 {
        master.tick(round * FADER_PERIOD_MS, &mut sink).unwrap();
    }

    // Four fader steps beyond the initial black frame.
    assert_eq!(master.driver().payload(0), Some(&[120, 0, 0][..]));
    assert!(!sink.reports.is_empty());
    let stats = master.stats();
    assert_eq!(stats.frames_registered, 3);
    assert!(stats.scheduler.total_fired >= 5);
    assert_eq!(stats.dispatch.frames_received as usize, sink.reports.len());
}

#[test]
fn test_received_photores_response_is_decoded() {
    let mut master = demo_master(&[0]);
    master.start_schedule().unwrap();
    let mut sink = RecordingSink::default();

    // Queue a slave response directly; the next tick must decode it.
    // 0x03E8 little-endian is 1000 mV.
    master.driver_mut().inject(RxFrame::new(2, &[0xE8, 0x03]));
    master.tick(0, &mut sink).unwrap();

    let decoded = sink.reports.iter().find_map(|report| match report {
        FrameReport::Data {
            id: 2,
            decoded: Some(values),
            ..
        } => values.get("eval_0_photores_val").map(|v| v.raw()),
        _ => None,
    });
    assert_eq!(decoded, Some(1000));
}

#[test]
fn test_error_frame_classified_not_decoded() {
    let mut master = demo_master(&[0]);
    master.start_schedule().unwrap();
    let mut sink = RecordingSink::default();

    master
        .driver_mut()
        .inject_error(2, ErrorFlags::CHECKSUM | ErrorFlags::FRAMING);
    master.tick(0, &mut sink).unwrap();

    assert!(matches!(
        sink.reports[0],
        FrameReport::BusError { id: 2, flags } if flags.contains(ErrorFlags::CHECKSUM)
    ));
    assert_eq!(master.stats().dispatch.bus_errors, 1);
}

#[test]
fn test_rgb_command_updates_wire_payload() {
    let mut master = shell_master(&[0, 1]);
    let mut sink = RecordingSink::default();

    let keep_going = master
        .execute(
            ShellCommand::Rgb {
                board: 1,
                r: 1,
                g: 2,
                b: 3,
            },
            &mut sink,
        )
        .unwrap();
    assert!(keep_going);
    // Board 1's RGB frame is identifier 5.
    assert_eq!(master.driver().payload(5), Some(&[1, 2, 3][..]));
    // Board 0 untouched.
    assert_eq!(master.driver().payload(0), Some(&[0, 0, 0][..]));
}

#[test]
fn test_led_commands_accumulate_bits() {
    let mut master = shell_master(&[0]);
    let mut sink = RecordingSink::default();

    for (index, on) in [(0, true), (2, true), (0, false)] {
        master
            .execute(ShellCommand::Led { board: 0, index, on }, &mut sink)
            .unwrap();
    }
    // LED 2 set, LED 0 set then cleared.
    assert_eq!(master.driver().payload(1), Some(&[0b0100][..]));
}

#[test]
fn test_off_scoped_to_one_board() {
    let mut master = shell_master(&[0, 1]);
    let mut sink = RecordingSink::default();

    for board in [0, 1] {
        master
            .execute(
                ShellCommand::Rgb {
                    board,
                    r: 9,
                    g: 9,
                    b: 9,
                },
                &mut sink,
            )
            .unwrap();
    }
    master
        .execute(ShellCommand::Off { board: Some(0) }, &mut sink)
        .unwrap();

    assert_eq!(master.driver().payload(0), Some(&[0, 0, 0][..]));
    assert_eq!(master.driver().payload(5), Some(&[9, 9, 9][..]));
}

#[test]
fn test_command_failure_leaves_master_usable() {
    let mut master = shell_master(&[0]);
    let mut sink = RecordingSink::default();

    // Board 3 is not in the database; the command fails cleanly.
    let result = master.execute(
        ShellCommand::Rgb {
            board: 3,
            r: 1,
            g: 1,
            b: 1,
        },
        &mut sink,
    );
    assert!(matches!(result, Err(MasterError::Frame(_))));

    // The session continues and later commands still work.
    master
        .execute(
            ShellCommand::Rgb {
                board: 0,
                r: 4,
                g: 5,
                b: 6,
            },
            &mut sink,
        )
        .unwrap();
    assert_eq!(master.driver().payload(0), Some(&[4, 5, 6][..]));
}

#[test]
fn test_quit_ends_the_session() {
    let mut master = shell_master(&[0]);
    let mut sink = RecordingSink::default();
    assert!(!master.execute(ShellCommand::Quit, &mut sink).unwrap());
}

#[test]
fn test_monitor_returns_when_stop_flag_raised() {
    let mut master = shell_master(&[0]);
    let mut sink = RecordingSink::default();

    let stop = master.stop_flag();
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    master.monitor(&mut sink).unwrap();

    // The flag is re-armed so the shell keeps running afterwards.
    assert!(!stop.load(std::sync::atomic::Ordering::Relaxed));
}

#[test]
fn test_stop_flag_ends_demo_loop() {
    let mut master = demo_master(&[0]);
    let mut sink = RecordingSink::default();

    let stop = master.stop_flag();
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    // Raised before entry: the loop must exit without a single pass.
    master.run_demo(&mut sink).unwrap();
    assert_eq!(master.stats().scheduler.passes, 0);
}
