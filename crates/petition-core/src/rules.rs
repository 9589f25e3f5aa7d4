//! Built-in jurisdiction and petition-type profiles.
//!
//! These drive three things: which input fields a jurisdiction mandates, the
//! formatting/focus rules the prompt composer emits, and the section markers
//! the output validator looks for.

use serde::Serialize;

use crate::types::{Jurisdiction, PetitionType};

/// A section heading the generated petition must contain. Any alias counts.
#[derive(Debug, Clone, Serialize)]
pub struct SectionMarker {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl SectionMarker {
    const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    /// Every spelling that satisfies this marker, canonical name first.
    pub fn spellings(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JurisdictionProfile {
    pub jurisdiction: Jurisdiction,
    pub name: &'static str,
    pub focus: &'static [&'static str],
    pub formatting: &'static str,
    /// Document sections the composer asks for, in filing order.
    pub required_sections: &'static [&'static str],
    /// Markers the validator insists on.
    pub markers: Vec<SectionMarker>,
    /// Case-detail fields this forum requires beyond the common set.
    pub mandated_fields: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
pub struct PetitionProfile {
    pub petition_type: PetitionType,
    pub name: &'static str,
    pub focus: &'static [&'static str],
    pub structure: &'static str,
    pub language: &'static str,
    /// Extra query terms mixed into retrieval.
    pub keywords: &'static [&'static str],
}

/// Case-detail fields every petition needs regardless of forum.
pub const COMMON_REQUIRED_FIELDS: &[&str] = &["petitioner_name", "respondent_name", "facts", "relief"];

const STANDARD_SECTIONS: &[&str] = &["title", "parties", "facts", "grounds", "relief", "verification"];

fn core_markers() -> Vec<SectionMarker> {
    vec![
        SectionMarker::new("FACTS", &["STATEMENT OF FACTS", "BRIEF FACTS"]),
        SectionMarker::new("GROUNDS", &["LEGAL GROUNDS"]),
        SectionMarker::new("RELIEF", &["PRAYER", "RELIEF SOUGHT"]),
    ]
}

pub fn jurisdiction_profile(j: Jurisdiction) -> JurisdictionProfile {
    match j {
        Jurisdiction::SupremeCourt => JurisdictionProfile {
            jurisdiction: j,
            name: "Supreme Court of India",
            focus: &["constitutional_law", "precedents", "slp"],
            formatting: "formal_constitutional",
            required_sections: STANDARD_SECTIONS,
            markers: {
                let mut m = core_markers();
                m.push(SectionMarker::new("VERIFICATION", &["AFFIDAVIT"]));
                m
            },
            mandated_fields: &["impugned_order"],
        },
        Jurisdiction::HighCourt => JurisdictionProfile {
            jurisdiction: j,
            name: "High Court",
            focus: &["writ_jurisdiction", "appellate", "state_law"],
            formatting: "formal_appellate",
            required_sections: STANDARD_SECTIONS,
            markers: core_markers(),
            mandated_fields: &[],
        },
        Jurisdiction::DistrictCourt => JurisdictionProfile {
            jurisdiction: j,
            name: "District Court",
            focus: &["civil_trial", "criminal_trial", "evidence"],
            formatting: "trial_court",
            required_sections: STANDARD_SECTIONS,
            markers: core_markers(),
            mandated_fields: &[],
        },
        Jurisdiction::SpecializedTribunal => JurisdictionProfile {
            jurisdiction: j,
            name: "Specialized Tribunal",
            focus: &["administrative_law", "technical_expertise"],
            formatting: "tribunal_specific",
            required_sections: STANDARD_SECTIONS,
            markers: core_markers(),
            mandated_fields: &[],
        },
        Jurisdiction::ConsumerCourt => JurisdictionProfile {
            jurisdiction: j,
            name: "Consumer Court",
            focus: &["consumer_protection", "simplified_language"],
            formatting: "consumer_friendly",
            required_sections: STANDARD_SECTIONS,
            markers: vec![
                SectionMarker::new("FACTS", &["STATEMENT OF FACTS", "BRIEF FACTS"]),
                SectionMarker::new("GROUNDS", &["DEFICIENCY IN SERVICE", "GROUNDS OF COMPLAINT"]),
                SectionMarker::new("RELIEF", &["PRAYER", "RELIEF SOUGHT", "COMPENSATION CLAIMED"]),
            ],
            mandated_fields: &["consideration_paid"],
        },
    }
}

pub fn petition_profile(p: PetitionType) -> PetitionProfile {
    match p {
        PetitionType::PublicInterest => PetitionProfile {
            petition_type: p,
            name: "Public Interest Litigation",
            focus: &["public_interest", "constitutional_rights", "social_justice"],
            structure: "pil_specific",
            language: "formal_public_interest",
            keywords: &["public interest", "fundamental rights", "article 32", "article 226"],
        },
        PetitionType::Civil => PetitionProfile {
            petition_type: p,
            name: "Civil Petition",
            focus: &["civil_disputes", "contracts", "property"],
            structure: "civil_specific",
            language: "formal_civil",
            keywords: &["civil suit", "damages", "specific performance", "injunction"],
        },
        PetitionType::Criminal => PetitionProfile {
            petition_type: p,
            name: "Criminal Petition",
            focus: &["criminal_law", "evidence", "procedure"],
            structure: "criminal_specific",
            language: "formal_criminal",
            keywords: &["bail", "quashing", "fir", "criminal procedure"],
        },
        PetitionType::Writ => PetitionProfile {
            petition_type: p,
            name: "Writ Petition",
            focus: &["constitutional_remedies", "fundamental_rights"],
            structure: "writ_specific",
            language: "formal_constitutional",
            keywords: &["writ of mandamus", "certiorari", "habeas corpus", "article 226"],
        },
        PetitionType::SpecialLeave => PetitionProfile {
            petition_type: p,
            name: "Special Leave Petition",
            focus: &["supreme_court_appeal", "constitutional_questions"],
            structure: "slp_specific",
            language: "formal_supreme_court",
            keywords: &["special leave", "article 136", "impugned judgment", "substantial question of law"],
        },
    }
}

pub fn all_jurisdiction_profiles() -> Vec<JurisdictionProfile> {
    Jurisdiction::ALL.iter().map(|j| jurisdiction_profile(*j)).collect()
}

pub fn all_petition_profiles() -> Vec<PetitionProfile> {
    PetitionType::ALL.iter().map(|p| petition_profile(*p)).collect()
}

/// All case-detail fields required for a filing in `j`.
pub fn required_fields(j: Jurisdiction) -> Vec<&'static str> {
    COMMON_REQUIRED_FIELDS
        .iter()
        .chain(jurisdiction_profile(j).mandated_fields.iter())
        .copied()
        .collect()
}
