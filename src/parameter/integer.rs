use std::{fmt::Display, ops::RangeInclusive, sync::Arc};

use four_cc::FourCC;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A discrete (integer) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<i32>,
    default: i32,
    unit: &'static str,
}

impl IntegerParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<i32>,
        default: i32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Create a raw, ParameterValueUpdate for this parameter.
    #[must_use]
    pub fn value_update(&self, value: i32) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Arc::new(value)))
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub fn range(&self) -> &RangeInclusive<i32> {
        &self.range
    }

    pub const fn default_value(&self) -> i32 {
        self.default
    }

    pub fn clamp_value(&self, value: i32) -> i32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    pub fn normalize_value(&self, value: i32) -> f32 {
        let span = *self.range.end() as f32 - *self.range.start() as f32;
        if span <= 0.0 {
            return 0.0;
        }
        (self.clamp_value(value) as f32 - *self.range.start() as f32) / span
    }

    pub fn denormalize_value(&self, normalized: f32) -> i32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let value = *self.range.start() as f32
            + normalized * (*self.range.end() as f32 - *self.range.start() as f32);
        self.clamp_value(value.round() as i32)
    }

    pub fn value_to_string(&self, value: i32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{} {}", value, self.unit)
        } else {
            value.to_string()
        }
    }
}

impl Parameter for IntegerParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Integer
    }

    fn default_normalized_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn normalized_value_to_string(&self, normalized: f32, include_unit: bool) -> String {
        self.value_to_string(self.denormalize_value(normalized), include_unit)
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds an integer parameter value and its description.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerParameterValue {
    /// The parameter's description and constraints.
    description: IntegerParameter,
    /// The current value of the parameter.
    value: i32,
}

impl IntegerParameterValue {
    pub fn from_description(description: IntegerParameter) -> Self {
        let value = description.default_value();
        Self { value, description }
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.set_value_clamped(value);
        self
    }

    pub fn description(&self) -> &IntegerParameter {
        &self.description
    }

    #[inline(always)]
    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn set_value_clamped(&mut self, value: i32) {
        self.value = self.description.clamp_value(value);
    }

    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match update {
            ParameterValueUpdate::Raw(raw) => {
                if let Some(value) = raw.downcast_ref::<i32>() {
                    self.set_value_clamped(*value);
                } else if let Some(value) = raw.downcast_ref::<usize>() {
                    self.set_value_clamped((*value).min(i32::MAX as usize) as i32);
                } else if let Some(value) = raw.downcast_ref::<f32>() {
                    self.set_value_clamped(value.round() as i32);
                } else {
                    log::warn!(
                        "Invalid value type for integer parameter '{}'",
                        self.description.id()
                    );
                }
            }
            ParameterValueUpdate::Normalized(normalized) => {
                self.value = self.description.denormalize_value(*normalized);
            }
        }
    }
}

impl Display for IntegerParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description.value_to_string(self.value, true))
    }
}
