//! Settings parameter descriptors and value wrappers.

use std::{any::Any, fmt::Debug, sync::Arc};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Describes the type of a [`Parameter`] to e.g. select a proper visual representation in a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    /// A continuous floating-point value.
    Float,
    /// A discrete integer value.
    Integer,
    /// A boolean toggle.
    Boolean,
}

// -------------------------------------------------------------------------------------------------

/// Describes a single configuration parameter for use in UIs or for automation.
pub trait Parameter: Debug {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// The parameter type.
    fn parameter_type(&self) -> ParameterType;

    /// Default value of parameter, expressed as normalized floating point value in range \[0,1\].
    fn default_normalized_value(&self) -> f32;

    /// Convert the given normalized floating point value to a string value.
    fn normalized_value_to_string(&self, normalized: f32, include_unit: bool) -> String;
}

// -------------------------------------------------------------------------------------------------

/// An update for a [`Parameter`]'s value.
///
/// Values are never rejected: out of range values get clamped into the parameter's range.
#[derive(Debug, Clone)]
pub enum ParameterValueUpdate {
    /// Raw, type-erased internal value (f32, i32 or boolean).
    Raw(Arc<dyn Any + Send + Sync>),
    /// A float value in range `0.0..=1.0`.
    Normalized(f32),
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatParameter, FloatParameterValue};

mod integer;
pub use integer::{IntegerParameter, IntegerParameterValue};

mod boolean;
pub use boolean::{BooleanParameter, BooleanParameterValue};
