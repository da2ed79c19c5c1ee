//! Operator hints keyed on substrings of a connection error.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Credentials,
    Server,
    ClientDriver,
}

impl Hint {
    pub fn lines(self) -> &'static [&'static str] {
        match self {
            Hint::Credentials => &[
                "1. Check your username and password",
                "2. Verify the Azure SQL firewall allows your IP address",
                "3. Ensure 'Allow Azure services and resources to access this server' is enabled",
            ],
            Hint::Server => &[
                "1. Check the server name is correct (e.g. your-server.database.windows.net)",
                "2. Verify the server exists in the Azure portal",
                "3. Check your internet connection and that outbound port 1433 is open",
            ],
            Hint::ClientDriver => &[
                "1. The client could not negotiate TLS with the server",
                "2. Make sure system CA certificates are installed and up to date",
                "3. Azure SQL requires encrypted connections; do not disable encryption",
            ],
        }
    }
}

/// Pick the hint for an error message, if any applies.
pub fn classify(message: &str) -> Option<Hint> {
    let lower = message.to_ascii_lowercase();

    if message.contains("Login failed") {
        return Some(Hint::Credentials);
    }

    const UNREACHABLE: [&str; 6] = [
        "cannot open server",
        "connection refused",
        "timed out",
        "failed to lookup address",
        "no such host",
        "name or service not known",
    ];
    if UNREACHABLE.iter().any(|needle| lower.contains(needle)) {
        return Some(Hint::Server);
    }

    const CLIENT_DRIVER: [&str; 4] = ["odbc driver", "tls", "certificate", "handshake"];
    if CLIENT_DRIVER.iter().any(|needle| lower.contains(needle)) {
        return Some(Hint::ClientDriver);
    }

    None
}

pub fn print_hints(message: &str) {
    if let Some(hint) = classify(message) {
        println!("Troubleshooting:");
        for line in hint.lines() {
            println!("{line}");
        }
    }
}
