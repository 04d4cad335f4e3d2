//! Connection configuration and wire-level constants.

/// Default TCP port a Gridline server listens on.
pub const DEFAULT_PORT: u16 = 1984;

/// Protocol version tag this client implements. None of the request frames
/// in the wire table carry it as a header; it is exposed for a caller that
/// needs to report compatibility to a server variant that asks for it out
/// of band.
pub const PROTOCOL_VERSION: &str = "ps6";

/// Everything [`crate::Engine::connect`] needs to open a session.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub file: String,
    pub password: String,
    /// `true` sends `CREATE`, `false` sends `JOIN`.
    pub create_new: bool,
}

impl ConnectConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        file: impl Into<String>,
        password: impl Into<String>,
        create_new: bool,
    ) -> Self {
        ConnectConfig {
            host: host.into(),
            port,
            file: file.into(),
            password: password.into(),
            create_new,
        }
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        ConnectConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            file: String::new(),
            password: String::new(),
            create_new: false,
        }
    }
}
