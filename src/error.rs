use std::{collections::TryReserveError, error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainulator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// No idle voice is left in the voice pool. Recoverable: drop the grain and carry on.
    PoolExhausted,
    /// The burst queue is full. Holds the number of grains which got dropped.
    BurstQueueFull(usize),
    /// The spatial bucket index failed to grow its backing storage.
    CapacityGrowthFailure(String),
    /// Unknown parameter id or invalid parameter value type.
    ParameterError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "No idle grain voice available"),
            Self::BurstQueueFull(dropped) => {
                write!(f, "Burst queue is full: dropped {dropped} grain(s)")
            }
            Self::CapacityGrowthFailure(str) => {
                write!(f, "Failed to grow bucket index capacity: {str}")
            }
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(err: TryReserveError) -> Error {
        Error::CapacityGrowthFailure(err.to_string())
    }
}
