//! Request and response payloads for the prediction endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fixed disclaimer attached to every successful prediction.
pub const DISCLAIMER: &str = "FOR RESEARCH/DEMO USE ONLY. NOT FOR CLINICAL DECISION-MAKING.";

/// Fixed explanation note shipped next to the importance map.
pub const IMPORTANCE_NOTES: &str =
    "Global feature importance of the model; higher scores indicate greater influence on the survival prediction";

pub const LABEL_LIKELY: &str = "Likely to survive";
pub const LABEL_UNLIKELY: &str = "Unlikely to survive";

/// Request fields in schema order. Validation errors are reported in this order.
pub const REQUEST_FIELDS: [&str; 9] = [
    "age",
    "gender",
    "donor_type",
    "comorbidity_score",
    "disease_type",
    "conditioning_intensity",
    "prior_transplants",
    "time_from_diagnosis_days",
    "treatment_days",
];

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Label as it appears on the wire and in artifact column names.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }

            pub fn from_label(label: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.as_str() == label)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

categorical!(Gender {
    Male => "Male",
    Female => "Female",
});

categorical!(DonorType {
    MatchedSibling => "Matched sibling",
    MatchedUnrelated => "Matched unrelated",
    Haploidentical => "Haploidentical",
    CordBlood => "Cord blood",
});

categorical!(DiseaseType {
    Aml => "AML",
    All => "ALL",
    Mds => "MDS",
    Lymphoma => "Lymphoma",
    Other => "Other",
});

categorical!(ConditioningIntensity {
    Myeloablative => "Myeloablative",
    ReducedIntensity => "Reduced-intensity",
});

/// A validated patient record. Only [`crate::validation::validate`] builds
/// these from untrusted input, so every value is within range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub age: u8,
    pub gender: Gender,
    pub donor_type: DonorType,
    pub comorbidity_score: u8,
    pub disease_type: DiseaseType,
    pub conditioning_intensity: ConditioningIntensity,
    pub prior_transplants: u8,
    pub time_from_diagnosis_days: u16,
    pub treatment_days: u16,
}

/// Explanation block of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explainability {
    pub feature_importance: BTreeMap<String, f64>,
    pub notes: String,
}

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Survival probability in [0, 1].
    pub probability: f64,
    pub prediction: String,
    pub explainability: Explainability,
    pub disclaimer: String,
}

/// Map a probability to its verdict. Probabilities at the threshold count
/// as likely to survive.
pub fn label_for(probability: f64, threshold: f64) -> &'static str {
    if probability >= threshold {
        LABEL_LIKELY
    } else {
        LABEL_UNLIKELY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_serde() {
        let json = serde_json::to_string(&DonorType::MatchedSibling).unwrap();
        assert_eq!(json, "\"Matched sibling\"");
        assert_eq!(
            serde_json::from_str::<ConditioningIntensity>("\"Reduced-intensity\"").unwrap(),
            ConditioningIntensity::ReducedIntensity
        );
        assert_eq!(DiseaseType::from_label("Lymphoma"), Some(DiseaseType::Lymphoma));
        assert_eq!(Gender::from_label("female"), None);
    }

    #[test]
    fn test_label_threshold_is_inclusive() {
        assert_eq!(label_for(0.5, 0.5), LABEL_LIKELY);
        assert_eq!(label_for(0.4999, 0.5), LABEL_UNLIKELY);
        assert_eq!(label_for(1.0, 0.5), LABEL_LIKELY);
        assert_eq!(label_for(0.0, 0.5), LABEL_UNLIKELY);
    }
}
