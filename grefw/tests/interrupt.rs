//! The interrupt checker is process-global, so it gets its own test binary.

use grefw::{Error, MockPort, ScannerSession, UpdateConfig};

#[test]
fn interrupted_session_stops_polling() {
    let mut session = ScannerSession::new(MockPort::new(), UpdateConfig::default());
    assert!(session.poll().is_ok());

    grefw::set_interrupt_checker(|| true);
    assert!(grefw::is_interrupted_requested());
    assert!(matches!(session.poll(), Err(Error::Interrupted)));
}
