use std::{
    fmt::{Debug, Display},
    ops::RangeInclusive,
    sync::Arc,
};

use four_cc::FourCC;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
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
    pub fn value_update(&self, value: f32) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Arc::new(value)))
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> f32 {
        self.default
    }

    /// Clamp the given plain value to the parameter's range. NaN values clamp to the default.
    pub fn clamp_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub fn normalize_value(&self, value: f32) -> f32 {
        let span = *self.range.end() - *self.range.start();
        if span <= 0.0 {
            return 0.0;
        }
        (self.clamp_value(value) - *self.range.start()) / span
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        *self.range.start() + normalized * (*self.range.end() - *self.range.start())
    }

    /// Convert the given plain value to a string.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{:.2} {}", value, self.unit)
        } else {
            format!("{:.2}", value)
        }
    }

    /// Convert the given string to a clamped plain value.
    pub fn string_to_value(&self, string: &str) -> Option<f32> {
        let value = string
            .trim()
            .trim_end_matches(self.unit)
            .trim()
            .parse()
            .ok()?;
        Some(self.clamp_value(value))
    }
}

impl Parameter for FloatParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Float
    }

    fn default_normalized_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn normalized_value_to_string(&self, normalized: f32, include_unit: bool) -> String {
        self.value_to_string(self.denormalize_value(normalized), include_unit)
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds a float parameter value and its description.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameterValue {
    /// The parameter's description and constraints.
    description: FloatParameter,
    /// The current value of the parameter.
    value: f32,
}

impl FloatParameterValue {
    /// Create a new parameter value with the given parameter description, initialized to the
    /// parameter's default value.
    pub fn from_description(description: FloatParameter) -> Self {
        let value = description.default_value();
        Self { value, description }
    }

    /// Create a new parameter value with the given value, clamped into the parameter's range.
    pub fn with_value(mut self, value: f32) -> Self {
        self.set_value_clamped(value);
        self
    }

    /// Access the parameter value's description.
    pub fn description(&self) -> &FloatParameter {
        &self.description
    }

    /// Access to the current value.
    #[inline(always)]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set a new value, clamping the given value into the parameter's value bounds if necessary.
    pub fn set_value_clamped(&mut self, value: f32) {
        self.value = self.description.clamp_value(value);
    }

    /// Applies a parameter update.
    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match update {
            ParameterValueUpdate::Raw(raw) => {
                if let Some(value) = raw.downcast_ref::<f32>() {
                    self.set_value_clamped(*value);
                } else if let Some(value) = raw.downcast_ref::<f64>() {
                    self.set_value_clamped(*value as f32);
                } else if let Some(value) = raw.downcast_ref::<i32>() {
                    self.set_value_clamped(*value as f32);
                } else {
                    log::warn!(
                        "Invalid value type for float parameter '{}'",
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

impl Display for FloatParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let include_unit = true;
        f.write_str(&self.description.value_to_string(self.value, include_unit))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CADENCE: FloatParameter =
        FloatParameter::new(FourCC(*b"cdnc"), "Cadence", 1.0..=1000.0, 20.0).with_unit("ms");

    #[test]
    fn clamps_on_write() {
        let mut value = FloatParameterValue::from_description(CADENCE);
        assert_eq!(value.value(), 20.0);
        value.set_value_clamped(-5.0);
        assert_eq!(value.value(), 1.0);
        value.set_value_clamped(5000.0);
        assert_eq!(value.value(), 1000.0);
        value.set_value_clamped(f32::NAN);
        assert_eq!(value.value(), 20.0);
    }

    #[test]
    fn updates() {
        let mut value = FloatParameterValue::from_description(CADENCE);
        value.apply_update(&CADENCE.value_update(50.0).1);
        assert_eq!(value.value(), 50.0);
        value.apply_update(&ParameterValueUpdate::Raw(Arc::new(2000.0f64)));
        assert_eq!(value.value(), 1000.0);
        value.apply_update(&ParameterValueUpdate::Normalized(0.0));
        assert_eq!(value.value(), 1.0);
        value.apply_update(&ParameterValueUpdate::Raw(Arc::new("nope")));
        assert_eq!(value.value(), 1.0);
    }

    #[test]
    fn strings() {
        assert_eq!(CADENCE.value_to_string(20.0, true), "20.00 ms");
        assert_eq!(CADENCE.string_to_value(" 40 ms"), Some(40.0));
        assert_eq!(CADENCE.string_to_value("0"), Some(1.0));
        assert_eq!(CADENCE.string_to_value("fast"), None);
    }
}
