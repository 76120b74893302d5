use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Clinical resource types handled by the gateway.
///
/// Unknown type names parse into `Custom`, which is carried through
/// read paths but rejected wherever a supported type is required
/// (for example when registering an export job).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    Procedure,
    AllergyIntolerance,
    Immunization,
    DocumentReference,
    #[serde(untagged)]
    Custom(String),
}

impl ResourceType {
    /// Whether this type belongs to the supported vocabulary.
    pub fn is_supported(&self) -> bool {
        !matches!(self, ResourceType::Custom(_))
    }

    /// Parse a type name, rejecting anything outside the supported vocabulary.
    pub fn parse_supported(s: &str) -> Result<Self, CoreError> {
        let rt: ResourceType = s.parse().map_err(|_| CoreError::unsupported_resource_type(s))?;
        if rt.is_supported() {
            Ok(rt)
        } else {
            Err(CoreError::unsupported_resource_type(s))
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Patient => write!(f, "Patient"),
            ResourceType::Practitioner => write!(f, "Practitioner"),
            ResourceType::Organization => write!(f, "Organization"),
            ResourceType::Encounter => write!(f, "Encounter"),
            ResourceType::Observation => write!(f, "Observation"),
            ResourceType::Condition => write!(f, "Condition"),
            ResourceType::DiagnosticReport => write!(f, "DiagnosticReport"),
            ResourceType::Medication => write!(f, "Medication"),
            ResourceType::MedicationRequest => write!(f, "MedicationRequest"),
            ResourceType::Procedure => write!(f, "Procedure"),
            ResourceType::AllergyIntolerance => write!(f, "AllergyIntolerance"),
            ResourceType::Immunization => write!(f, "Immunization"),
            ResourceType::DocumentReference => write!(f, "DocumentReference"),
            ResourceType::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CoreError::unsupported_resource_type("<empty>"));
        }
        Ok(match s {
            "Patient" => ResourceType::Patient,
            "Practitioner" => ResourceType::Practitioner,
            "Organization" => ResourceType::Organization,
            "Encounter" => ResourceType::Encounter,
            "Observation" => ResourceType::Observation,
            "Condition" => ResourceType::Condition,
            "DiagnosticReport" => ResourceType::DiagnosticReport,
            "Medication" => ResourceType::Medication,
            "MedicationRequest" => ResourceType::MedicationRequest,
            "Procedure" => ResourceType::Procedure,
            "AllergyIntolerance" => ResourceType::AllergyIntolerance,
            "Immunization" => ResourceType::Immunization,
            "DocumentReference" => ResourceType::DocumentReference,
            other => ResourceType::Custom(other.to_string()),
        })
    }
}
