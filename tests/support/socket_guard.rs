//! Skips wiremock tests where localhost sockets cannot be bound (sandboxed CI).

use std::net::TcpListener;

use wiremock::MockServer;

/// Env var that turns a skipped socket test into a hard failure.
pub const REQUIRE_SOCKET_TESTS_ENV: &str = "MEDIA_RESCUE_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns false (after logging) when localhost sockets are unavailable.
#[track_caller]
pub fn can_bind_localhost() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return true;
    }
    let location = std::panic::Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost at {}:{}",
        location.file(),
        location.line()
    );
    assert!(
        !socket_tests_required(),
        "{message}; unset {REQUIRE_SOCKET_TESTS_ENV} to allow skipping"
    );
    eprintln!("{message}; skipping (set {REQUIRE_SOCKET_TESTS_ENV}=1 to fail instead)");
    false
}

/// Starts a mock server, or returns `None` when the test should be skipped.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if can_bind_localhost() {
        Some(MockServer::start().await)
    } else {
        None
    }
}

/// Binds a mock server or returns `Ok(())` from the enclosing test.
macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = $crate::support::socket_guard::start_mock_server_or_skip().await
        else {
            return Ok(());
        };
        mock_server
    }};
}
