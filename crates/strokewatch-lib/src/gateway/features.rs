//! Feature extraction for the tabular risk model
//!
//! Validates questionnaire answers and derives the ordered feature vector
//! `[age, hypertension, heart_disease, bmi]` the classifier was trained on.

use crate::error::GatewayError;
use crate::models::TabularInput;

/// Number of input features expected by the tabular model
pub const NUM_FEATURES: usize = 4;

/// Upper bound on accepted ages
pub const MAX_AGE_YEARS: f32 = 150.0;

/// Features in the order the scaler and classifier expect them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabularFeatures {
    pub age: f32,
    pub hypertension: f32,
    pub heart_disease: f32,
    pub bmi: f32,
}

impl TabularFeatures {
    pub fn to_array(&self) -> [f32; NUM_FEATURES] {
        [self.age, self.hypertension, self.heart_disease, self.bmi]
    }
}

/// Body-mass index from weight in kilograms and height in centimetres
pub fn body_mass_index(weight_kg: f32, height_cm: f32) -> f32 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

/// Validates questionnaire answers and builds the feature vector
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn validate(input: &TabularInput) -> Result<(), GatewayError> {
        if !input.age.is_finite() || input.age < 0.0 || input.age > MAX_AGE_YEARS {
            return Err(GatewayError::validation(format!(
                "age must be between 0 and {}, got {}",
                MAX_AGE_YEARS, input.age
            )));
        }
        if input.hypertension > 1 {
            return Err(GatewayError::validation(format!(
                "hypertension must be 0 or 1, got {}",
                input.hypertension
            )));
        }
        if input.heart_disease > 1 {
            return Err(GatewayError::validation(format!(
                "heart_disease must be 0 or 1, got {}",
                input.heart_disease
            )));
        }
        if !input.weight_kg.is_finite() || input.weight_kg <= 0.0 {
            return Err(GatewayError::validation(format!(
                "weight must be positive, got {}",
                input.weight_kg
            )));
        }
        if !input.height_cm.is_finite() || input.height_cm <= 0.0 {
            return Err(GatewayError::validation(format!(
                "height must be positive, got {}",
                input.height_cm
            )));
        }
        Ok(())
    }

    pub fn extract(input: &TabularInput) -> Result<TabularFeatures, GatewayError> {
        Self::validate(input)?;

        let bmi = body_mass_index(input.weight_kg, input.height_cm);
        if !bmi.is_finite() {
            return Err(GatewayError::validation("weight and height produce a non-finite BMI"));
        }

        Ok(TabularFeatures {
            age: input.age,
            hypertension: f32::from(input.hypertension),
            heart_disease: f32::from(input.heart_disease),
            bmi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(age: f32, hypertension: u8, heart_disease: u8, weight_kg: f32, height_cm: f32) -> TabularInput {
        TabularInput {
            age,
            hypertension,
            heart_disease,
            weight_kg,
            height_cm,
        }
    }

    #[test]
    fn test_bmi_example() {
        let bmi = body_mass_index(80.0, 170.0);
        assert!((bmi - 27.68).abs() < 0.01, "bmi was {}", bmi);
    }

    #[test]
    fn test_bmi_formula_across_inputs() {
        for (w, h) in [(45.0_f32, 150.0_f32), (70.0, 175.0), (120.0, 190.0), (3.5, 50.0)] {
            let expected = w / ((h / 100.0) * (h / 100.0));
            assert!((body_mass_index(w, h) - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_feature_order() {
        let features = FeatureExtractor::extract(&input(65.0, 1, 0, 80.0, 170.0)).unwrap();
        let arr = features.to_array();
        assert_eq!(arr[0], 65.0);
        assert_eq!(arr[1], 1.0);
        assert_eq!(arr[2], 0.0);
        assert!((arr[3] - 27.68).abs() < 0.01);
    }

    #[test]
    fn test_flags_outside_range_rejected() {
        assert!(matches!(
            FeatureExtractor::extract(&input(40.0, 2, 0, 70.0, 170.0)),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            FeatureExtractor::extract(&input(40.0, 0, 7, 70.0, 170.0)),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_non_positive_body_measurements_rejected() {
        for (w, h) in [(0.0, 170.0), (-5.0, 170.0), (70.0, 0.0), (70.0, -1.0), (f32::NAN, 170.0)] {
            assert!(
                matches!(FeatureExtractor::extract(&input(40.0, 0, 0, w, h)), Err(GatewayError::Validation(_))),
                "accepted weight {} height {}",
                w,
                h
            );
        }
    }

    #[test]
    fn test_age_bounds() {
        assert!(FeatureExtractor::validate(&input(0.0, 0, 0, 3.0, 50.0)).is_ok());
        assert!(FeatureExtractor::validate(&input(-1.0, 0, 0, 70.0, 170.0)).is_err());
        assert!(FeatureExtractor::validate(&input(f32::INFINITY, 0, 0, 70.0, 170.0)).is_err());
    }
}
