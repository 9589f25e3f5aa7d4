use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, PetitionError};
use crate::rules::required_fields;
use crate::types::{GenerationState, Jurisdiction, PetitionType};

/// An incoming petition request as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetitionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(default)]
    pub petition_type: String,
    #[serde(default)]
    pub case_details: BTreeMap<String, String>,
    #[serde(default)]
    pub user_input: String,
}

fn new_session_id() -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("pet-{}-{n:016x}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
}

/// Check a request and build its initial state.
///
/// Every problem is collected before returning, so the caller sees all
/// missing or invalid fields at once.
pub fn process_input(req: PetitionRequest) -> Result<GenerationState, PetitionError> {
    let mut issues = Vec::new();

    let jurisdiction = if req.jurisdiction.trim().is_empty() {
        issues.push(FieldIssue::missing("jurisdiction"));
        None
    } else {
        match req.jurisdiction.parse::<Jurisdiction>() {
            Ok(j) => Some(j),
            Err(e) => {
                issues.push(FieldIssue::invalid("jurisdiction", e));
                None
            }
        }
    };

    let petition_type = if req.petition_type.trim().is_empty() {
        issues.push(FieldIssue::missing("petition_type"));
        None
    } else {
        match req.petition_type.parse::<PetitionType>() {
            Ok(p) => Some(p),
            Err(e) => {
                issues.push(FieldIssue::invalid("petition_type", e));
                None
            }
        }
    };

    // Forum-specific fields can only be checked once the forum is known.
    let fields = match jurisdiction {
        Some(j) => required_fields(j),
        None => crate::rules::COMMON_REQUIRED_FIELDS.to_vec(),
    };
    for field in fields {
        let present = req
            .case_details
            .get(field)
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            issues.push(FieldIssue::missing(field));
        }
    }

    if let Some(id) = &req.session_id {
        if id.trim().is_empty() {
            issues.push(FieldIssue::invalid("session_id", "blank"));
        }
    }

    match (jurisdiction, petition_type) {
        (Some(j), Some(p)) if issues.is_empty() => {
            let session_id = req.session_id.unwrap_or_else(new_session_id);
            let case_details = req
                .case_details
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect();
            Ok(GenerationState::new(session_id, j, p, case_details, req.user_input))
        }
        _ => Err(PetitionError::Validation { issues }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn collects_every_problem() {
        let req = PetitionRequest {
            jurisdiction: "XX".into(),
            petition_type: String::new(),
            case_details: details(&[("facts", "  ")]),
            ..Default::default()
        };
        let Err(PetitionError::Validation { issues }) = process_input(req) else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["jurisdiction", "petition_type", "petitioner_name", "respondent_name", "facts", "relief"]
        );
    }

    #[test]
    fn bare_json_body_reports_all_missing_fields() {
        let req: PetitionRequest = serde_json::from_str(r#"{"case_details":{}}"#).unwrap();
        let Err(PetitionError::Validation { issues }) = process_input(req) else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["jurisdiction", "petition_type", "petitioner_name", "respondent_name", "facts", "relief"]
        );
    }

    #[test]
    fn supreme_court_requires_impugned_order() {
        let req = PetitionRequest {
            jurisdiction: "SC".into(),
            petition_type: "SLP".into(),
            case_details: details(&[
                ("petitioner_name", "A"),
                ("respondent_name", "B"),
                ("facts", "f"),
                ("relief", "r"),
            ]),
            ..Default::default()
        };
        let Err(PetitionError::Validation { issues }) = process_input(req) else {
            panic!("expected validation error");
        };
        assert_eq!(issues, vec![FieldIssue::missing("impugned_order")]);
    }

    #[test]
    fn valid_request_starts_pending_with_generated_session() {
        let req = PetitionRequest {
            jurisdiction: "high_court".into(),
            petition_type: "writ".into(),
            case_details: details(&[
                ("petitioner_name", "A"),
                ("respondent_name", "B"),
                ("facts", "f"),
                ("relief", "r"),
            ]),
            ..Default::default()
        };
        let state = process_input(req).unwrap();
        assert_eq!(state.status(), crate::types::Status::Pending);
        assert_eq!(state.jurisdiction(), Jurisdiction::HighCourt);
        assert!(state.session_id().starts_with("pet-"));
        assert_eq!(state.retry_count(), 0);
    }
}
