//! Translation of a validated request into the artifact's column layout.
//!
//! Artifacts name their columns the way the training pipeline emitted them:
//! numeric fields by their request name, categorical fields as one-hot
//! indicators `<field>_<label>` (e.g. `donor_type_Matched sibling`).

use crate::types::{ConditioningIntensity, DiseaseType, DonorType, Gender, PredictionRequest};

use super::ArtifactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Age,
    ComorbidityScore,
    PriorTransplants,
    TimeFromDiagnosisDays,
    TreatmentDays,
}

impl NumericField {
    const ALL: [NumericField; 5] = [
        NumericField::Age,
        NumericField::ComorbidityScore,
        NumericField::PriorTransplants,
        NumericField::TimeFromDiagnosisDays,
        NumericField::TreatmentDays,
    ];

    fn name(&self) -> &'static str {
        match self {
            NumericField::Age => "age",
            NumericField::ComorbidityScore => "comorbidity_score",
            NumericField::PriorTransplants => "prior_transplants",
            NumericField::TimeFromDiagnosisDays => "time_from_diagnosis_days",
            NumericField::TreatmentDays => "treatment_days",
        }
    }

    fn read(&self, request: &PredictionRequest) -> f64 {
        match self {
            NumericField::Age => f64::from(request.age),
            NumericField::ComorbidityScore => f64::from(request.comorbidity_score),
            NumericField::PriorTransplants => f64::from(request.prior_transplants),
            NumericField::TimeFromDiagnosisDays => f64::from(request.time_from_diagnosis_days),
            NumericField::TreatmentDays => f64::from(request.treatment_days),
        }
    }
}

/// One-hot indicator for a specific category value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Gender(Gender),
    DonorType(DonorType),
    DiseaseType(DiseaseType),
    ConditioningIntensity(ConditioningIntensity),
}

impl Indicator {
    fn parse(column: &str) -> Option<Self> {
        if let Some(label) = column.strip_prefix("gender_") {
            return Gender::from_label(label).map(Indicator::Gender);
        }
        if let Some(label) = column.strip_prefix("donor_type_") {
            return DonorType::from_label(label).map(Indicator::DonorType);
        }
        if let Some(label) = column.strip_prefix("disease_type_") {
            return DiseaseType::from_label(label).map(Indicator::DiseaseType);
        }
        if let Some(label) = column.strip_prefix("conditioning_intensity_") {
            return ConditioningIntensity::from_label(label).map(Indicator::ConditioningIntensity);
        }
        None
    }

    fn is_set(&self, request: &PredictionRequest) -> bool {
        match self {
            Indicator::Gender(g) => request.gender == *g,
            Indicator::DonorType(d) => request.donor_type == *d,
            Indicator::DiseaseType(d) => request.disease_type == *d,
            Indicator::ConditioningIntensity(c) => request.conditioning_intensity == *c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Numeric(NumericField),
    Indicator(Indicator),
}

/// Column mapping resolved once at load time.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    columns: Vec<Column>,
}

impl FeatureEncoder {
    /// Resolve every artifact column to a request field or category.
    ///
    /// Unknown or duplicated columns make the artifact unusable.
    pub fn from_feature_names(names: &[String]) -> Result<Self, ArtifactError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = NumericField::ALL
                .iter()
                .find(|field| field.name() == name)
                .map(|field| Column::Numeric(*field))
                .or_else(|| Indicator::parse(name).map(Column::Indicator))
                .ok_or_else(|| ArtifactError::UnknownFeature(name.clone()))?;

            if columns.contains(&column) {
                return Err(ArtifactError::DuplicateFeature(name.clone()));
            }
            columns.push(column);
        }

        if columns.is_empty() {
            return Err(ArtifactError::Invalid("artifact declares no features".to_string()));
        }

        Ok(Self { columns })
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Encode a request as one row in artifact column order.
    pub fn encode(&self, request: &PredictionRequest) -> Vec<f64> {
        self.columns
            .iter()
            .map(|column| match column {
                Column::Numeric(field) => field.read(request),
                Column::Indicator(indicator) => {
                    if indicator.is_set(request) {
                        1.0
                    } else {
                        0.0
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            age: 45,
            gender: Gender::Female,
            donor_type: DonorType::MatchedSibling,
            comorbidity_score: 1,
            disease_type: DiseaseType::Aml,
            conditioning_intensity: ConditioningIntensity::ReducedIntensity,
            prior_transplants: 0,
            time_from_diagnosis_days: 180,
            treatment_days: 30,
        }
    }

    #[test]
    fn test_encode_follows_artifact_order() {
        let encoder = FeatureEncoder::from_feature_names(&names(&[
            "treatment_days",
            "gender_Male",
            "gender_Female",
            "donor_type_Matched sibling",
            "age",
            "conditioning_intensity_Myeloablative",
        ]))
        .unwrap();

        assert_eq!(encoder.width(), 6);
        assert_eq!(encoder.encode(&request()), vec![30.0, 0.0, 1.0, 1.0, 45.0, 0.0]);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = FeatureEncoder::from_feature_names(&names(&["age", "blood_type_O"])).unwrap_err();
        assert!(matches!(err, ArtifactError::UnknownFeature(name) if name == "blood_type_O"));

        let err = FeatureEncoder::from_feature_names(&names(&["gender_Other"])).unwrap_err();
        assert!(matches!(err, ArtifactError::UnknownFeature(_)));
    }

    #[test]
    fn test_duplicate_and_empty_rejected() {
        let err = FeatureEncoder::from_feature_names(&names(&["age", "age"])).unwrap_err();
        assert!(matches!(err, ArtifactError::DuplicateFeature(_)));

        assert!(FeatureEncoder::from_feature_names(&[]).is_err());
    }
}
