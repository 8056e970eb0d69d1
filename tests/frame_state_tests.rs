use linmaster::database::{ConfigError, SignalDatabase, SignalValue};
use linmaster::frame::{FrameError, FrameTable};
use linmaster::transport::SimBus;

fn three_signal_db() -> SignalDatabase {
    SignalDatabase::from_json(
        r#"{
            "frames": [
                {
                    "name": "x",
                    "id": 16,
                    "direction": "publish",
                    "byte_len": 3,
                    "signals": [
                        { "name": "a", "start_bit": 0, "bit_width": 8 },
                        { "name": "b", "start_bit": 8, "bit_width": 8 },
                        { "name": "c", "start_bit": 16, "bit_width": 8 }
                    ]
                }
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_sequential_partial_updates_merge() {
    let db = three_signal_db();
    let mut bus = SimBus::new(&[]);
    let mut frames = FrameTable::new();
    frames.register(&db, &mut bus, "x").unwrap();

    frames
        .update(&db, &mut bus, "x", &[("a".to_string(), SignalValue::Int(1))])
        .unwrap();
    frames
        .update(&db, &mut bus, "x", &[("b".to_string(), SignalValue::Int(2))])
        .unwrap();

    // The second update must not clear the first key; the absent third
    // signal encodes as zero.
    let state = frames.get("x").unwrap();
    assert_eq!(state.signal_values().len(), 2);
    assert_eq!(state.signal_values().get("a").map(|v| v.raw()), Some(1));
    assert_eq!(state.signal_values().get("b").map(|v| v.raw()), Some(2));
    assert_eq!(state.encoded_bytes(), &[1, 2, 0]);
    assert_eq!(bus.payload(16), Some(&[1, 2, 0][..]));
}

#[test]
fn test_disjoint_updates_commute() {
    let db = three_signal_db();

    let mut forward = SimBus::new(&[]);
    let mut table_fw = FrameTable::new();
    table_fw.register(&db, &mut forward, "x").unwrap();
    table_fw
        .update(
            &db,
            &mut forward,
            "x",
            &[("a".to_string(), SignalValue::Int(10))],
        )
        .unwrap();
    table_fw
        .update(
            &db,
            &mut forward,
            "x",
            &[("c".to_string(), SignalValue::Int(30))],
        )
        .unwrap();

    let mut reverse = SimBus::new(&[]);
    let mut table_rv = FrameTable::new();
    table_rv.register(&db, &mut reverse, "x").unwrap();
    table_rv
        .update(
            &db,
            &mut reverse,
            "x",
            &[("c".to_string(), SignalValue::Int(30))],
        )
        .unwrap();
    table_rv
        .update(
            &db,
            &mut reverse,
            "x",
            &[("a".to_string(), SignalValue::Int(10))],
        )
        .unwrap();

    assert_eq!(forward.payload(16), reverse.payload(16));
    assert_eq!(forward.payload(16), Some(&[10, 0, 30][..]));
}

#[test]
fn test_update_overwrites_only_supplied_keys() {
    let db = three_signal_db();
    let mut bus = SimBus::new(&[]);
    let mut frames = FrameTable::new();
    frames.register(&db, &mut bus, "x").unwrap();

    frames
        .update(
            &db,
            &mut bus,
            "x",
            &[
                ("a".to_string(), SignalValue::Int(1)),
                ("b".to_string(), SignalValue::Int(2)),
                ("c".to_string(), SignalValue::Int(3)),
            ],
        )
        .unwrap();
    frames
        .update(
            &db,
            &mut bus,
            "x",
            &[("b".to_string(), SignalValue::Int(99))],
        )
        .unwrap();

    assert_eq!(bus.payload(16), Some(&[1, 99, 3][..]));
}

#[test]
fn test_update_unknown_frame_is_config_error() {
    let db = three_signal_db();
    let mut bus = SimBus::new(&[]);
    let mut frames = FrameTable::new();

    let result = frames.update(&db, &mut bus, "y", &[("a".to_string(), SignalValue::Int(1))]);
    assert!(matches!(
        result,
        Err(FrameError::Config(ConfigError::UnknownFrame(name))) if name == "y"
    ));
}

#[test]
fn test_out_of_range_value_aborts_whole_update() {
    let db = SignalDatabase::from_json(
        r#"{
            "frames": [
                {
                    "name": "narrow",
                    "id": 4,
                    "direction": "publish",
                    "byte_len": 1,
                    "signals": [
                        { "name": "lo", "start_bit": 0, "bit_width": 4 },
                        { "name": "hi", "start_bit": 4, "bit_width": 4 }
                    ]
                }
            ]
        }"#,
    )
    .unwrap();
    let mut bus = SimBus::new(&[]);
    let mut frames = FrameTable::new();
    frames.register(&db, &mut bus, "narrow").unwrap();

    // 16 needs five bits; the valid first key must not be merged either.
    let result = frames.update(
        &db,
        &mut bus,
        "narrow",
        &[
            ("lo".to_string(), SignalValue::Int(3)),
            ("hi".to_string(), SignalValue::Int(16)),
        ],
    );
    assert!(matches!(
        result,
        Err(FrameError::Config(ConfigError::ValueOutOfRange { .. }))
    ));
    assert!(frames.get("narrow").unwrap().signal_values().is_empty());
    assert_eq!(bus.payload(4), Some(&[0][..]));
}
