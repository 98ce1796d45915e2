use thiserror::Error;

use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("manufacturer `{0}` is not a known manufacturer")]
    InvalidManufacturer(String),
    #[error("year `{value}` not valid, must be between {min} and {max}")]
    InvalidYear { value: String, min: i32, max: i32 },
    #[error("mileage `{value}` not valid, must be > 0 and < {max}")]
    InvalidOdometer { value: String, max: i64 },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("outlier mode `{0}` is not supported (expected IQR or SD)")]
    InvalidMode(String),
    #[error("cohort `{cohort}` has {found} usable listings, at least {required} are required")]
    InsufficientData { cohort: String, found: usize, required: usize },
    #[error("a regression is already saved for cohort `{0}`")]
    AlreadyFitted(String),
    #[error("no regression model for cohort `{0}`")]
    NoModelForCohort(String),
    #[error("mean absolute residual `{0}` cannot scale a deal factor")]
    DegenerateResidual(f64),
    #[error("regression for cohort `{cohort}` does not lose value with mileage (decrease {decrease:.2})")]
    NonMonotonicModel { cohort: String, decrease: f64 },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("dataset failure: {0}")]
    Dataset(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The vehicle details could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "There is not enough data to price this vehicle yet.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::NoModelForCohort(_)
                | DomainError::InsufficientData { .. }
                | DomainError::AlreadyFitted(_)),
            ) => Self::NotFound { message: error.to_string(), correlation_id: unassigned },
            ApplicationError::Domain(
                error @ (DomainError::DegenerateResidual(_)
                | DomainError::NonMonotonicModel { .. }),
            ) => Self::Internal { message: error.to_string(), correlation_id: unassigned },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Persistence(message)
            | ApplicationError::Dataset(message)
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}
