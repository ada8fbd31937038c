//! Error taxonomy shared by the resolver, the dispatcher and the binaries.

use thiserror::Error;

/// Everything that can go wrong between reading the credentials and
/// handing a command line to the external client.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// A precondition failed before any remote work began.
    #[error("{0}")]
    Fatal(String),

    /// The credential token could not be decoded.
    #[error("unable to decode credential token: {0}")]
    Credentials(#[from] base64::DecodeError),

    /// Transport or decode failure talking to the inventory API.
    #[error("request to {endpoint} failed: {detail}")]
    Request { endpoint: String, detail: String },

    /// The inventory could not be resolved at all.
    #[error("Unable to proceed: inventory at {base_uri} is unreachable")]
    Unavailable {
        base_uri: String,
        #[source]
        source: Box<ConnectError>,
    },

    #[error("no connection found for target '{0}'")]
    TargetNotFound(String),

    /// A Node-derived field was read on a Service that never joined a Node.
    #[error("service '{service}' references unknown node '{node_id}'")]
    MissingRelation { service: String, node_id: String },

    #[error("no connection command available for service type '{0}'")]
    UnsupportedService(String),

    /// The constructed command line could not be tokenised.
    #[error("invalid command line: {0}")]
    Command(String),

    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ConnectError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        ConnectError::Fatal(msg.into())
    }

    pub fn request(endpoint: &str, detail: impl ToString) -> Self {
        ConnectError::Request {
            endpoint: endpoint.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Process exit code for this error: 2 for an undecodable credential
    /// token, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConnectError::Credentials(_) => 2,
            _ => 1,
        }
    }
}

impl From<figment::Error> for ConnectError {
    fn from(error: figment::Error) -> Self {
        ConnectError::Config(Box::new(error))
    }
}

/// Type alias for Results that may fail with a ConnectError
pub type ConnectResult<T> = Result<T, ConnectError>;
