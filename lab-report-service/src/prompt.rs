//! Category registry and the extraction prompt built from it.
//!
//! A category owns its field list and its prompt template. Adding one means adding a
//! variant and a [`CategoryProfile`]; the response normalizer only ever sees
//! [`Category::fields`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

/// System message sent with every extraction request
pub const SYSTEM_PROMPT: &str = "You are a medical data extractor.";

/// Number of characters of the report forwarded to the model
pub const REPORT_PREFIX_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "diabetes")]
    Diabetes,
    #[serde(rename = "heart")]
    HeartDisease,
    #[serde(rename = "parkinsons")]
    Parkinsons,
}

/// A metric the model is asked for: the JSON key plus the label shown in the prompt
#[derive(Debug, Clone, Copy)]
pub struct MetricField {
    pub name: &'static str,
    pub label: &'static str,
}

const fn field(name: &'static str, label: &'static str) -> MetricField {
    MetricField { name, label }
}

#[derive(Debug)]
pub struct CategoryProfile {
    pub tag: &'static str,
    pub subject: &'static str,
    pub fields: &'static [MetricField],
}

const DIABETES_FIELDS: &[MetricField] = &[
    field("Age", "Age"),
    field("Gender", "Gender"),
    field("Glucose", "Glucose (mg/dL)"),
    field("Skin Thickness", "Skin Thickness (mm)"),
    field("BMI", "BMI"),
    field("Blood Pressure", "Blood Pressure"),
    field("Insulin", "Insulin (μU/mL)"),
    field("Diabetes Pedigree Function", "Diabetes Pedigree Function"),
];

const HEART_FIELDS: &[MetricField] = &[
    field("Age", "Age"),
    field("Gender", "Gender"),
    field("Cholesterol", "Cholesterol (mg/dL)"),
    field("Blood Pressure", "Blood Pressure (mmHg)"),
    field("Heart Rate", "Heart Rate (bpm)"),
    field("Exercise", "Exercise (hours per week)"),
    field("Smoker", "Smoker (true/false)"),
    field("Diabetic", "Diabetic (true/false)"),
    field("Family History", "Family History of heart disease (true/false)"),
    field("BMI", "BMI"),
];

const PARKINSONS_FIELDS: &[MetricField] = &[
    field("MDVP_Fo", "MDVP_Fo (average vocal fundamental frequency, Hz)"),
    field("MDVP_Fhi", "MDVP_Fhi (maximum vocal fundamental frequency, Hz)"),
    field("MDVP_Flo", "MDVP_Flo (minimum vocal fundamental frequency, Hz)"),
    field("MDVP_Jitter", "MDVP_Jitter (%)"),
    field("MDVP_Shimmer", "MDVP_Shimmer"),
    field("NHR", "NHR (noise-to-harmonics ratio)"),
    field("HNR", "HNR (harmonics-to-noise ratio)"),
    field("RPDE", "RPDE"),
    field("DFA", "DFA"),
    field("spread1", "spread1"),
    field("spread2", "spread2"),
    field("D2", "D2"),
    field("PPE", "PPE"),
];

static DIABETES: CategoryProfile = CategoryProfile {
    tag: "diabetes",
    subject: "lab reports",
    fields: DIABETES_FIELDS,
};

static HEART_DISEASE: CategoryProfile = CategoryProfile {
    tag: "heart",
    subject: "cardiology lab reports",
    fields: HEART_FIELDS,
};

static PARKINSONS: CategoryProfile = CategoryProfile {
    tag: "parkinsons",
    subject: "voice measurement reports",
    fields: PARKINSONS_FIELDS,
};

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Diabetes,
        Category::HeartDisease,
        Category::Parkinsons,
    ];

    pub fn profile(self) -> &'static CategoryProfile {
        match self {
            Category::Diabetes => &DIABETES,
            Category::HeartDisease => &HEART_DISEASE,
            Category::Parkinsons => &PARKINSONS,
        }
    }

    pub fn tag(self) -> &'static str {
        self.profile().tag
    }

    /// Field names every record of this category must carry
    pub fn fields(self) -> Vec<&'static str> {
        self.profile().fields.iter().map(|f| f.name).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Category {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diabetes" => Ok(Category::Diabetes),
            "heart" | "heart_disease" | "heart-disease" => Ok(Category::HeartDisease),
            "parkinsons" | "parkinson" | "parkinsons_disease" => Ok(Category::Parkinsons),
            _ => Err(ServiceError::UnsupportedCategory(s.to_string())),
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// User message asking the model to pull the category's metrics out of `text`.
pub fn build_extraction_prompt(category: Category, text: &str) -> String {
    let profile = category.profile();
    let field_lines = profile
        .fields
        .iter()
        .map(|f| format!("- {}", f.label))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an AI assistant helping to extract health-related metrics from {subject}.

From the given lab report text, extract these values only if they are explicitly mentioned:
{field_lines}

Return the result strictly as JSON.

Lab Report:
{report}
",
        subject = profile.subject,
        report = char_prefix(text, REPORT_PREFIX_CHARS),
    )
}
