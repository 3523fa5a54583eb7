use crate::Error;

#[test]
fn test_error_display() {
    let error = Error::Transport("connection reset".to_string());
    assert_eq!(error.to_string(), "Transport error: connection reset");

    let error = Error::Settings("page_size must be greater than zero".to_string());
    assert_eq!(
        error.to_string(),
        "Settings error: page_size must be greater than zero"
    );

    assert_eq!(Error::SessionClosed.to_string(), "Session driver has shut down");
}

#[test]
fn test_error_from_io() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: Error = io_error.into();
    assert!(matches!(error, Error::Io(_)));
}

#[test]
fn test_error_from_json() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").expect_err("Parsed invalid JSON");
    let error: Error = json_error.into();
    assert!(matches!(error, Error::JsonSerialization(_)));
}
