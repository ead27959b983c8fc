//! Body-mass index derived from weight and height.
//!
//! BMI is rounded to a five-character budget (decimal point included) before it is stored,
//! and the category band is read from the rounded value so the two never disagree.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BmiCategory {
    Unknown,
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Unknown => "Unknown",
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyMassIndex {
    pub bmi: f64,
    pub bmi_category: BmiCategory,
}

impl BodyMassIndex {
    pub const UNKNOWN: BodyMassIndex = BodyMassIndex {
        bmi: 0.0,
        bmi_category: BmiCategory::Unknown,
    };
}

/// Computes BMI from kilograms and centimetres.
///
/// A missing or non-positive weight or height yields BMI `0` in category `Unknown`.
///
/// The category is read from the rounded BMI, so a raw 18.496 is stored as 18.5 and
/// labelled `Normal` even though [`bmi_category`] places 18.496 itself in `Underweight`.
pub fn body_mass_index(weight_kg: Option<f64>, height_cm: Option<f64>) -> BodyMassIndex {
    let (Some(weight), Some(height)) = (weight_kg, height_cm) else {
        return BodyMassIndex::UNKNOWN;
    };
    if !(weight > 0.0 && height > 0.0) || !weight.is_finite() || !height.is_finite() {
        return BodyMassIndex::UNKNOWN;
    }

    let metres = height / 100.0;
    let bmi = round_to_digit_budget(weight / (metres * metres));

    BodyMassIndex {
        bmi,
        bmi_category: bmi_category(bmi),
    }
}

/// Whole number from 100 up, one decimal from 10, two decimals below 10.
pub fn round_to_digit_budget(bmi: f64) -> f64 {
    let decimals = match bmi.trunc() {
        whole if whole >= 100.0 => 0,
        whole if whole >= 10.0 => 1,
        _ => 2,
    };
    let scale = 10f64.powi(decimals);
    (bmi * scale).round() / scale
}

pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}
