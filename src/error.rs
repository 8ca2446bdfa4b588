use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid period {0:?}: expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("Negative unit price {price} for meter {meter_id}")]
    NegativeUnitPrice { meter_id: String, price: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Catalog not found for address {0}")]
    CatalogNotFound(String),

    #[error("Deposit policy missing for tenancy {0}")]
    MissingPolicy(String),

    #[error("Missing configuration value: {0}")]
    MissingConfig(&'static str),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Duplicate reading for meter {meter_id}, apartment {apartment_id}, period {period}")]
    DuplicateReading {
        meter_id: String,
        apartment_id: String,
        period: String,
    },

    #[error("Reading not found for meter {meter_id}, apartment {apartment_id}, period {period}")]
    ReadingNotFound {
        meter_id: String,
        apartment_id: String,
        period: String,
    },

    #[error("Invalid reading transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
