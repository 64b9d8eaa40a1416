//! Read-only lookup of the case records offered for selection.

use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use shared::domain::{CaseId, CaseRecord, ExamType, Gender};
use tracing::debug;
use url::Url;

use crate::error::WorkflowError;

#[derive(Debug, Clone, Default)]
pub struct CaseCatalog {
    records: Vec<CaseRecord>,
    index: HashMap<CaseId, usize>,
}

impl CaseCatalog {
    /// Builds a catalog preserving the given order. Ids must be unique.
    pub fn from_records(records: Vec<CaseRecord>) -> Result<Self, WorkflowError> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), position).is_some() {
                return Err(WorkflowError::validation(format!(
                    "duplicate case id {} in catalog",
                    record.id
                )));
            }
        }
        Ok(Self { records, index })
    }

    /// The examination records shipped with the dashboard.
    pub fn builtin() -> Self {
        let records = vec![
            builtin_record(
                "P001",
                "Zhang San",
                45,
                Gender::Male,
                (2023, 5, 15),
                ExamType::PetCt,
                "Lung adenocarcinoma",
            ),
            builtin_record(
                "P002",
                "Li Si",
                62,
                Gender::Male,
                (2023, 6, 20),
                ExamType::Mri,
                "Hepatocellular carcinoma",
            ),
            builtin_record(
                "P003",
                "Wang Wu",
                38,
                Gender::Female,
                (2023, 7, 5),
                ExamType::PetCt,
                "Breast cancer",
            ),
        ];
        let index = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect();
        Self { records, index }
    }

    /// Loads the catalog from a `GET /cases` collaborator.
    pub async fn fetch(http: &Client, base_url: &Url) -> Result<Self, WorkflowError> {
        let url = base_url
            .join("cases")
            .map_err(|e| WorkflowError::unavailable(format!("invalid catalog url: {e}")))?;
        let response = http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| WorkflowError::unavailable(format!("catalog request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::unavailable(format!(
                "catalog responded with {status}"
            )));
        }
        let records: Vec<CaseRecord> = response
            .json()
            .await
            .map_err(|e| WorkflowError::unavailable(format!("malformed catalog payload: {e}")))?;
        debug!(%url, count = records.len(), "fetched case catalog");
        Self::from_records(records)
    }

    pub fn lookup(&self, id: &CaseId) -> Result<&CaseRecord, WorkflowError> {
        self.index
            .get(id)
            .map(|&position| &self.records[position])
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    pub fn list(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn contains(&self, id: &CaseId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn builtin_record(
    id: &str,
    patient_name: &str,
    age: u8,
    gender: Gender,
    (year, month, day): (i32, u32, u32),
    exam_type: ExamType,
    tumor_type: &str,
) -> CaseRecord {
    CaseRecord {
        id: CaseId::new(id),
        patient_name: patient_name.to_string(),
        age,
        gender,
        exam_date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN),
        exam_type,
        tumor_type: tumor_type.to_string(),
    }
}
