use std::time::Duration;

/// Sharing mode requested when connecting to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    Shared,
    Exclusive,
}

impl From<ShareMode> for pcsc::ShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Shared => pcsc::ShareMode::Shared,
            ShareMode::Exclusive => pcsc::ShareMode::Exclusive,
        }
    }
}

/// Scope of the PC/SC context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    System,
}

impl From<Scope> for pcsc::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::User => pcsc::Scope::User,
            Scope::System => pcsc::Scope::System,
        }
    }
}

/// Settings handed to the backends when a [`SessionClient`](crate::SessionClient)
/// is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Timeout of a single USB control transfer.
    pub usb_timeout: Duration,
    /// How long to wait for the key to answer a HID slot command.
    pub response_timeout: Duration,
    pub share_mode: ShareMode,
    pub scope: Scope,
    /// Case-insensitive substring a PC/SC reader name must contain to be
    /// considered a YubiKey.
    pub reader_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            usb_timeout: Duration::new(2, 0),
            response_timeout: Duration::new(2, 0),
            share_mode: ShareMode::Shared,
            scope: Scope::User,
            reader_filter: "yubico".to_string(),
        }
    }
}

impl Config {
    pub fn with_usb_timeout(mut self, timeout: Duration) -> Self {
        self.usb_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_share_mode(mut self, share_mode: ShareMode) -> Self {
        self.share_mode = share_mode;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_reader_filter(mut self, filter: &str) -> Self {
        self.reader_filter = filter.to_string();
        self
    }

    /// Whether `reader` names a PC/SC reader this client should look at.
    pub fn matches_reader(&self, reader: &str) -> bool {
        reader
            .to_lowercase()
            .contains(&self.reader_filter.to_lowercase())
    }
}
