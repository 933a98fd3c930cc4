use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SimError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SimError::Bind { .. } => "bind_failed",
            SimError::Runtime(_) => "runtime_failed",
            SimError::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = SimError::Bind {
            addr: "127.0.0.1:5000".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:5000: in use");
        assert_eq!(err.error_code(), "bind_failed");
    }
}
