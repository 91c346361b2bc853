use homer_tuner_core::protocol::{MockTransport, MotorPositions, TunerError};
use homer_tuner_core::{ConnectionState, Tuner, TunerConfig};
use pretty_assertions::assert_eq;

/// Motor-read response for stubs at 0, 513 and 4000 steps
const MOTOR_RESPONSE: [u8; 14] = [128, 28, 48, 0, 0, 1, 2, 160, 15, 119, 0, 89, 128, 16];

fn connected(mock: &MockTransport) -> Tuner {
    let mut tuner = Tuner::new(TunerConfig::default());
    tuner.attach(Box::new(mock.clone()));
    tuner
}

fn data_object(text: &str, end: u8) -> Vec<u8> {
    let mut v = vec![128, 28];
    v.extend_from_slice(text.as_bytes());
    v.extend_from_slice(&[128, end]);
    v
}

#[test]
fn test_set_motor_positions_wire_and_ack() {
    let mock = MockTransport::with_response(&MOTOR_RESPONSE);
    let mut tuner = connected(&mock);

    tuner.set_motor_positions(0, 513, 4000).unwrap();

    assert_eq!(
        mock.sent(),
        vec![vec![
            128, 28, 77, 80, 79, 32, 48, 32, 53, 49, 51, 32, 52, 48, 48, 48, 13, 10, 128, 71
        ]]
    );
    assert_eq!(mock.pending(), 0);
}

#[test]
fn test_set_ack_after_periodic_push_keeps_responses_aligned() {
    let mock = MockTransport::new();
    mock.push_response(&[128, 28, 0x10, 1, 0, 1, 0, 1, 0, 128, 16]);
    mock.push_response(&MOTOR_RESPONSE);
    mock.push_response(&[128, 28, 0x30, 7, 0, 8, 0, 9, 0, 128, 16]);
    let mut tuner = connected(&mock);

    tuner.set_motor_positions(0, 513, 4000).unwrap();
    assert_eq!(mock.pending(), 11);

    assert_eq!(
        tuner.read_motor_positions().unwrap(),
        MotorPositions::new(7, 8, 9)
    );
    assert_eq!(mock.pending(), 0);
}

#[test]
fn test_read_motor_positions() {
    let mock = MockTransport::with_response(&MOTOR_RESPONSE);
    let mut tuner = connected(&mock);

    let positions = tuner.read_motor_positions().unwrap();

    assert_eq!(positions, MotorPositions::new(0, 513, 4000));
    assert_eq!(mock.sent(), vec![vec![128, 74]]);
}

#[test]
fn test_read_after_leading_noise() {
    let mock = MockTransport::new();
    mock.push_response(&[0x00, 0x55, 0xFF]);
    mock.push_response(&MOTOR_RESPONSE);
    let mut tuner = connected(&mock);

    assert_eq!(
        tuner.read_motor_positions().unwrap(),
        MotorPositions::new(0, 513, 4000)
    );
}

#[test]
fn test_all_stubs_home() {
    let mock = MockTransport::with_response(&[128, 4]);
    let mut tuner = connected(&mock);

    tuner.all_stubs_home().unwrap();

    assert_eq!(mock.sent(), vec![vec![128, 69]]);
}

#[test]
fn test_hard_stop_reads_nothing() {
    let mock = MockTransport::with_response(&[128, 4]);
    let mut tuner = connected(&mock);

    tuner.hard_stop_motors().unwrap();

    assert_eq!(mock.sent(), vec![vec![128, 19]]);
    assert_eq!(mock.pending(), 2);
}

#[test]
fn test_selected_stub_home() {
    for n in 1..=3u8 {
        let mock = MockTransport::with_response(&[128, 4]);
        let mut tuner = connected(&mock);
        tuner.selected_stub_home(n).unwrap();
        assert_eq!(mock.sent(), vec![data_object(&format!("M1H {}", n), 99)]);
    }
}

#[test]
fn test_selected_stub_home_rejects_bad_id_before_write() {
    for n in [0u8, 4, 255] {
        let mock = MockTransport::with_response(&[128, 4]);
        let mut tuner = connected(&mock);
        let result = tuner.selected_stub_home(n);
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
        assert_eq!(mock.write_count(), 0);
    }
}

#[test]
fn test_autotuning_commands() {
    let mock = MockTransport::with_response(&[128, 4, 128, 4, 128, 4]);
    let mut tuner = connected(&mock);

    tuner.autotuning(false).unwrap();
    tuner.single_autotuning_step().unwrap();
    tuner.autotuning(true).unwrap();

    assert_eq!(
        mock.sent(),
        vec![
            data_object("ATC 0", 99),
            data_object("ATC S", 99),
            data_object("ATC 1", 99),
        ]
    );
}

#[test]
fn test_single_step_requires_continuous_off() {
    let mock = MockTransport::with_response(&[128, 4]);
    let mut tuner = connected(&mock);

    let result = tuner.single_autotuning_step();

    assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_tune_positions_on_off() {
    let mock = MockTransport::with_response(&[128, 4, 128, 4]);
    let mut tuner = connected(&mock);

    tuner.send_tune_positions(true).unwrap();
    tuner.send_tune_positions(false).unwrap();

    assert_eq!(
        mock.sent(),
        vec![data_object("ATC T", 99), data_object("ATC F", 99)]
    );
}

#[test]
fn test_operations_while_disconnected() {
    let mut tuner = Tuner::new(TunerConfig::default());

    assert!(matches!(
        tuner.set_motor_positions(1, 2, 3),
        Err(TunerError::NotConnected)
    ));
    assert!(matches!(
        tuner.read_motor_positions(),
        Err(TunerError::NotConnected)
    ));
    assert!(matches!(tuner.all_stubs_home(), Err(TunerError::NotConnected)));
    assert!(matches!(tuner.hard_stop_motors(), Err(TunerError::NotConnected)));
    assert!(matches!(tuner.autotuning(true), Err(TunerError::NotConnected)));
    assert!(matches!(
        tuner.single_autotuning_step(),
        Err(TunerError::NotConnected)
    ));
    assert!(matches!(
        tuner.selected_stub_home(1),
        Err(TunerError::NotConnected)
    ));
    assert!(matches!(
        tuner.send_tune_positions(true),
        Err(TunerError::NotConnected)
    ));
    assert!(matches!(tuner.reset(), Err(TunerError::NotConnected)));
}

#[test]
fn test_no_write_after_close() {
    let mock = MockTransport::with_response(&[128, 4]);
    let mut tuner = connected(&mock);
    tuner.close();

    assert!(matches!(tuner.all_stubs_home(), Err(TunerError::NotConnected)));
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_timeout_leaves_connection_open() {
    let mock = MockTransport::new();
    let mut tuner = connected(&mock);

    assert!(matches!(tuner.all_stubs_home(), Err(TunerError::Timeout)));
    assert_eq!(tuner.state(), ConnectionState::Connected);

    // caller may retry once the instrument answers
    mock.push_response(&[128, 4]);
    tuner.all_stubs_home().unwrap();
}

#[test]
fn test_partial_response_times_out() {
    let mock = MockTransport::with_response(&MOTOR_RESPONSE[..10]);
    let mut tuner = connected(&mock);

    assert!(matches!(tuner.read_motor_positions(), Err(TunerError::Timeout)));
    assert!(tuner.is_connected());
}

#[test]
fn test_write_failure_propagates() {
    let mock = MockTransport::new();
    mock.set_fail_writes(true);
    let mut tuner = connected(&mock);

    assert!(matches!(
        tuner.hard_stop_motors(),
        Err(TunerError::Transport(_))
    ));
}

#[test]
fn test_corrupted_checksum() {
    let mut bad = MOTOR_RESPONSE;
    bad[11] = 0;
    let mock = MockTransport::with_response(&bad);
    let mut tuner = connected(&mock);

    assert!(matches!(
        tuner.read_motor_positions(),
        Err(TunerError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_park_and_close() {
    let mock = MockTransport::new();
    mock.push_response(&[128, 4]);
    mock.push_response(&MOTOR_RESPONSE);
    let mut tuner = connected(&mock);

    let positions = tuner.park_and_close();

    assert_eq!(positions, Some(MotorPositions::new(0, 513, 4000)));
    assert_eq!(mock.sent(), vec![vec![128, 69], vec![128, 74]]);
    assert_eq!(tuner.state(), ConnectionState::Disconnected);
}

#[test]
fn test_park_and_close_tolerates_failures() {
    let mock = MockTransport::new();
    let mut tuner = connected(&mock);

    assert_eq!(tuner.park_and_close(), None);
    assert_eq!(mock.write_count(), 2);
    assert_eq!(tuner.state(), ConnectionState::Disconnected);
}

#[test]
fn test_connect_failure_stays_disconnected() {
    let mock = MockTransport::new();
    let mut tuner = connected(&mock);

    let result = tuner.connect("/dev/homer-tuner-does-not-exist", 9600);

    assert!(matches!(result, Err(TunerError::Transport(_))));
    assert_eq!(tuner.state(), ConnectionState::Disconnected);
}
