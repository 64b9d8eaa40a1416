use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CaseId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "PET-CT")]
    PetCt,
    #[serde(rename = "MRI")]
    Mri,
    #[serde(rename = "CT")]
    Ct,
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PetCt => "PET-CT",
            Self::Mri => "MRI",
            Self::Ct => "CT",
        })
    }
}

/// A patient examination record from the case catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: CaseId,
    pub patient_name: String,
    pub age: u8,
    pub gender: Gender,
    pub exam_date: NaiveDate,
    pub exam_type: ExamType,
    pub tumor_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Uploaded,
    CaseSelected,
}

/// Displayable image resolved from an upload or a catalog case.
///
/// `origin_ref` holds the case id for [`SourceKind::CaseSelected`] and an
/// opaque upload token for [`SourceKind::Uploaded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHandle {
    pub source_kind: SourceKind,
    pub origin_ref: String,
    pub display_uri: String,
}

impl ImageHandle {
    pub fn case_id(&self) -> Option<CaseId> {
        match self.source_kind {
            SourceKind::CaseSelected => Some(CaseId::new(self.origin_ref.clone())),
            SourceKind::Uploaded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Prediction,
    Classification,
}

impl AnalysisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prediction => "prediction",
            Self::Classification => "classification",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_record_uses_camel_case_wire_names() {
        let record = CaseRecord {
            id: CaseId::new("P001"),
            patient_name: "Zhang San".into(),
            age: 45,
            gender: Gender::Male,
            exam_date: NaiveDate::from_ymd_opt(2023, 5, 15).expect("date"),
            exam_type: ExamType::PetCt,
            tumor_type: "Lung adenocarcinoma".into(),
        };

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["id"], "P001");
        assert_eq!(json["patientName"], "Zhang San");
        assert_eq!(json["examDate"], "2023-05-15");
        assert_eq!(json["examType"], "PET-CT");
    }

    #[test]
    fn only_case_selected_handles_carry_a_case_id() {
        let case = ImageHandle {
            source_kind: SourceKind::CaseSelected,
            origin_ref: "P002".into(),
            display_uri: "https://example.com/P002.jpg".into(),
        };
        let upload = ImageHandle {
            source_kind: SourceKind::Uploaded,
            origin_ref: "upload-0011223344556677".into(),
            display_uri: "data:image/png;base64,AA==".into(),
        };

        assert_eq!(case.case_id(), Some(CaseId::new("P002")));
        assert_eq!(upload.case_id(), None);
    }
}
