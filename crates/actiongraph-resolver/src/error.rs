use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("malformed '{marker}' query: {message}")]
  Malformed {
    marker: &'static str,
    message: String,
  },
}

impl ResolveError {
  pub(crate) fn malformed(marker: &'static str, message: impl Into<String>) -> Self {
    Self::Malformed {
      marker,
      message: message.into(),
    }
  }
}
