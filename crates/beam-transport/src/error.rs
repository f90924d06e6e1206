/// Errors that can occur on the pooled backing connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O fault reported by the backing connection.
    #[error("connection fault: {0}")]
    Io(#[from] std::io::Error),

    /// Every connection the pool may open is checked out.
    #[error("connection pool exhausted ({max} connections open)")]
    PoolExhausted { max: usize },

    /// The manager could not establish a new connection.
    #[error("failed to open connection: {0}")]
    Connect(String),

    /// The backing store has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
