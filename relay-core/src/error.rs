use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("Queue Error - {0}")]
    Queue(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Sink Write Error - {0}")]
    SinkWrite(String),

    #[error("Corrupt Message - {0}")]
    CorruptMessage(String),

    #[error("Cancelled - {0}")]
    Cancelled(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),
}

impl From<relay_nats::Error> for Error {
    fn from(value: relay_nats::Error) -> Self {
        match value {
            relay_nats::Error::Connection { .. } => Error::Connection(value.to_string()),
            _ => Error::Queue(value.to_string()),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(value: config::ConfigError) -> Self {
        Error::Config(value.to_string())
    }
}
