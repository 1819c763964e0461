//! Mock-server startup for sandboxes that forbid binding sockets.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1`/`true`/`yes` to fail instead of skipping when binding fails.
const REQUIRE_SOCKETS_ENV: &str = "THIRD_API_REQUIRE_SOCKET_TESTS";

/// Starts a wiremock server, or returns `None` when localhost cannot be bound.
///
/// # Panics
///
/// Panics when binding fails and [`REQUIRE_SOCKETS_ENV`] is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    let required = std::env::var(REQUIRE_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    assert!(!required, "cannot bind a localhost socket for wiremock");
    eprintln!("cannot bind a localhost socket; skipping wiremock-based test");
    None
}
