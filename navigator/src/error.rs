use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteValidationError {
    #[error("route has no points")]
    NoPoints,
    #[error("route point {0} has a non-finite coordinate")]
    InvalidPoint(usize),
    #[error("route has no steps")]
    NoSteps,
    #[error("step {0} has a negative or non-finite distance")]
    InvalidStepDistance(usize),
    #[error("route totals must be finite and non-negative")]
    InvalidTotals,
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("invalid route: {0}")]
    InvalidRoute(#[from] RouteValidationError),
    #[error("no active navigation session")]
    NoActiveSession,
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to handle GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("routing provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}
