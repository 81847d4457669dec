use std::time::Duration;

/// The default is 5 seconds for every socket.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a [crate::server::GameServer].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Timeout of every send and receive on the query socket
    pub timeout: Duration,
    /// Timeout of connecting, sending and receiving on the rcon socket
    pub rcon_timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            timeout: DEFAULT_TIMEOUT,
            rcon_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl QueryOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rcon_timeout(mut self, timeout: Duration) -> Self {
        self.rcon_timeout = timeout;
        self
    }
}

/// Options for a [crate::master::MasterServer].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterOptions {
    /// Timeout of every send and receive
    pub timeout: Duration,
    /// Timeouts in a row at the same page before giving up on an address
    pub retries: u32,
    /// Upper bound of pages requested in one enumeration. The protocol itself
    /// only ends at the `0.0.0.0:0` address.
    pub max_batches: usize,
}

impl Default for MasterOptions {
    fn default() -> Self {
        MasterOptions {
            timeout: DEFAULT_TIMEOUT,
            retries: 3,
            max_batches: 10_000,
        }
    }
}

impl MasterOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = max_batches;
        self
    }
}
