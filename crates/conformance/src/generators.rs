//! FHIR R5 resource generators.
//!
//! Every generator returns a `serde_json::Value` resource filled with
//! randomized but valid demographic data. Resource-level generators accept an
//! `overrides` object that is shallow-merged over the defaults, so a scenario
//! can pin exactly the fields it cares about:
//!
//! ```rust
//! use helios_conformance::generators;
//! use serde_json::json;
//!
//! let patient = generators::patient(json!({
//!     "name": [{"family": "Smith", "given": ["John"]}],
//!     "gender": "male",
//! }));
//!
//! assert_eq!(patient["resourceType"], "Patient");
//! assert_eq!(patient["name"][0]["family"], "Smith");
//! assert!(patient["telecom"].is_array());
//! ```
//!
//! Negative-path payloads come from [`invalid_patient`], which violates
//! exactly one constraint per [`InvalidPatient`] variant.

use chrono::{Duration, SecondsFormat, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

/// LOINC code system.
pub const LOINC: &str = "http://loinc.org";
/// UCUM unit system.
pub const UCUM: &str = "http://unitsofmeasure.org";
/// Observation category code system.
pub const OBSERVATION_CATEGORY: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";
/// US National Provider Identifier system.
pub const US_NPI: &str = "http://hl7.org/fhir/sid/us-npi";
/// HL7 v2 degree/license table.
pub const V2_DEGREE: &str = "http://terminology.hl7.org/CodeSystem/v2-0360";

const GENDERS: &[&str] = &["male", "female", "other", "unknown"];

const FIRST_NAMES: &[&str] = &[
    "Olivia", "Liam", "Emma", "Noah", "Amara", "Mateo", "Sofia", "Kenji", "Ingrid", "Tomas",
    "Priya", "Elias", "Nadia", "Oscar", "Leah", "Ravi", "Chloe", "Hugo", "Maya", "Felix",
];

const LAST_NAMES: &[&str] = &[
    "Hartley", "Okafor", "Lindqvist", "Moreau", "Castellano", "Nakamura", "Brennan", "Adeyemi",
    "Kowalski", "Fairbanks", "Delacroix", "Whitmore", "Sandoval", "Petrov", "Ashworth",
    "Quintero", "Halvorsen", "Mbeki", "Thornbury", "Valdez",
];

const STREETS: &[&str] = &[
    "Maple Avenue", "Harbor Road", "Elm Street", "Quarry Lane", "Willow Court", "Summit Drive",
    "Orchard Way", "Beacon Street", "Cedar Terrace", "Mill Road",
];

const CITIES: &[&str] = &[
    "Springfield", "Riverton", "Fairview", "Lakewood", "Georgetown", "Ashland", "Milford",
    "Clayton", "Oakridge", "Brookfield",
];

const COUNTRIES: &[&str] = &["US", "CA", "GB", "DE", "FR", "NL", "SE", "AU", "NZ", "IE"];

const IDENTIFIER_WORDS: &[&str] = &[
    "mrn", "patients", "records", "registry", "clinic", "intake", "admissions", "chart",
];

fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

fn random_letters(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}

fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'0'..=b'9')))
        .collect()
}

/// Shallow-merges `overrides` into `base`. Keys in `overrides` replace keys
/// in `base` wholesale; a non-object on either side leaves `base` unchanged.
pub fn merge(mut base: Value, overrides: Value) -> Value {
    if let (Some(target), Value::Object(fields)) = (base.as_object_mut(), overrides) {
        target.extend(fields);
    }
    base
}

/// Generates a unique resource id (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generates an Identifier. Missing parts are randomized.
pub fn identifier(system: Option<&str>, value: Option<&str>) -> Value {
    let system = system
        .map(str::to_string)
        .unwrap_or_else(|| format!("http://hospital.org/identifiers/{}", pick(IDENTIFIER_WORDS)));
    let value = value.map(str::to_string).unwrap_or_else(|| {
        format!("{}-{}-{}", random_letters(3), random_digits(4), random_digits(4))
    });
    json!({ "system": system, "value": value })
}

/// Generates an `official` HumanName.
pub fn human_name(family: Option<&str>, given: Option<&[&str]>) -> Value {
    let given: Vec<String> = match given {
        Some(given) => given.iter().map(|g| g.to_string()).collect(),
        None => vec![pick(FIRST_NAMES).to_string()],
    };
    json!({
        "use": "official",
        "family": family.unwrap_or_else(|| pick(LAST_NAMES)),
        "given": given,
    })
}

/// Generates a physical home Address.
pub fn address() -> Value {
    let number = rand::thread_rng().gen_range(1..=9999);
    json!({
        "use": "home",
        "type": "physical",
        "line": [format!("{} {}", number, pick(STREETS))],
        "city": pick(CITIES),
        "postalCode": random_digits(5),
        "country": pick(COUNTRIES),
    })
}

/// Generates a ContactPoint. A `phone` gets a phone number, anything else an
/// email address, unless `value` is given.
pub fn contact_point(system: &str, value: Option<&str>, use_: &str) -> Value {
    let value = value.map(str::to_string).unwrap_or_else(|| {
        if system == "phone" {
            format!("555-{}-{}", random_digits(3), random_digits(4))
        } else {
            format!(
                "{}.{}@example.org",
                pick(FIRST_NAMES).to_lowercase(),
                pick(LAST_NAMES).to_lowercase()
            )
        }
    });
    json!({ "system": system, "value": value, "use": use_ })
}

/// Generates a Reference to `Type/id`.
pub fn reference(resource_type: &str, id: &str, display: Option<&str>) -> Value {
    let mut reference = json!({ "reference": format!("{}/{}", resource_type, id) });
    if let Some(display) = display {
        reference["display"] = json!(display);
    }
    reference
}

/// Generates a single-coding CodeableConcept.
pub fn codeable_concept(system: &str, code: &str, display: Option<&str>) -> Value {
    let mut coding = json!({ "system": system, "code": code });
    if let Some(display) = display {
        coding["display"] = json!(display);
    }
    json!({ "coding": [coding] })
}

fn birth_date() -> String {
    let days = rand::thread_rng().gen_range(0..=100 * 365);
    (Utc::now().date_naive() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

/// Generates a valid Patient.
pub fn patient(overrides: Value) -> Value {
    let patient = json!({
        "resourceType": "Patient",
        "identifier": [identifier(None, None)],
        "name": [human_name(None, None)],
        "gender": pick(GENDERS),
        "birthDate": birth_date(),
        "address": [address()],
        "telecom": [
            contact_point("phone", None, "mobile"),
            contact_point("email", None, "home"),
        ],
        "active": true,
    });
    merge(patient, overrides)
}

/// Generates a valid Practitioner holding an NPI and an MD qualification.
pub fn practitioner(overrides: Value) -> Value {
    let practitioner = json!({
        "resourceType": "Practitioner",
        "identifier": [identifier(Some(US_NPI), None)],
        "name": [human_name(None, None)],
        "telecom": [contact_point("phone", None, "work")],
        "address": [address()],
        "gender": pick(GENDERS),
        "active": true,
        "qualification": [{
            "code": codeable_concept(V2_DEGREE, "MD", Some("Doctor of Medicine")),
        }],
    });
    merge(practitioner, overrides)
}

/// The `value[x]` of a generated Observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    /// `valueQuantity`
    Quantity(Value),
    /// `valueCodeableConcept`
    CodeableConcept(Value),
    /// `valueString`
    String(String),
}

impl ObservationValue {
    /// A UCUM quantity.
    pub fn quantity(value: f64, unit: &str, code: &str) -> Self {
        Self::Quantity(json!({
            "value": value,
            "unit": unit,
            "system": UCUM,
            "code": code,
        }))
    }

    fn field(&self) -> (&'static str, Value) {
        match self {
            Self::Quantity(q) => ("valueQuantity", q.clone()),
            Self::CodeableConcept(c) => ("valueCodeableConcept", c.clone()),
            Self::String(s) => ("valueString", json!(s)),
        }
    }
}

/// Shape of a generated Observation.
///
/// Defaults to a LOINC heart rate (`8867-4`) on a freshly generated
/// Patient reference, valued with a random 60-100 beats/minute.
#[derive(Debug, Clone)]
pub struct ObservationSpec {
    /// `subject` reference; a random Patient reference when `None`.
    pub subject: Option<Value>,
    /// Code system of `code`.
    pub code_system: String,
    /// Code of `code`.
    pub code: String,
    /// Display of `code`.
    pub code_display: String,
    /// `value[x]`; a heart-rate quantity when `None`.
    pub value: Option<ObservationValue>,
}

impl Default for ObservationSpec {
    fn default() -> Self {
        Self {
            subject: None,
            code_system: LOINC.to_string(),
            code: "8867-4".to_string(),
            code_display: "Heart rate".to_string(),
            value: None,
        }
    }
}

impl ObservationSpec {
    /// An Observation about the given subject reference.
    pub fn for_subject(subject: Value) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    /// Sets the observation code.
    pub fn code(mut self, system: &str, code: &str, display: &str) -> Self {
        self.code_system = system.to_string();
        self.code = code.to_string();
        self.code_display = display.to_string();
        self
    }

    /// Sets `value[x]`.
    pub fn value(mut self, value: ObservationValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// Generates a valid final vital-signs Observation.
pub fn observation(spec: ObservationSpec, overrides: Value) -> Value {
    let subject = spec
        .subject
        .unwrap_or_else(|| reference("Patient", &generate_id(), None));

    let mut observation = json!({
        "resourceType": "Observation",
        "status": "final",
        "category": [{
            "coding": [{
                "system": OBSERVATION_CATEGORY,
                "code": "vital-signs",
                "display": "Vital Signs",
            }]
        }],
        "code": codeable_concept(&spec.code_system, &spec.code, Some(&spec.code_display)),
        "subject": subject,
        "effectiveDateTime": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });

    let value = spec.value.unwrap_or_else(|| {
        ObservationValue::quantity(
            f64::from(rand::thread_rng().gen_range(60..=100)),
            "beats/minute",
            "/min",
        )
    });
    let (field, value) = value.field();
    observation[field] = value;

    merge(observation, overrides)
}

/// Which single constraint an invalid Patient violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPatient {
    /// No `resourceType`.
    MissingRequired,
    /// `birthDate` is a number instead of a date string.
    InvalidType,
    /// `gender` is outside the AdministrativeGender value set.
    InvalidValue,
}

/// Generates a Patient payload that violates exactly one constraint.
pub fn invalid_patient(issue: InvalidPatient) -> Value {
    match issue {
        InvalidPatient::MissingRequired => json!({
            "name": [human_name(None, None)],
        }),
        InvalidPatient::InvalidType => json!({
            "resourceType": "Patient",
            "birthDate": 12345,
        }),
        InvalidPatient::InvalidValue => json!({
            "resourceType": "Patient",
            "gender": "invalid_gender_value",
        }),
    }
}

/// Generates `count` Patients with cycling genders and distinct identifiers.
///
/// Each patient's identifier value is `BATCH-<run>-<index>`, where `<run>`
/// is shared by the batch, unless `overrides` replaces `identifier`.
pub fn patient_batch(count: usize, overrides: Value) -> Vec<Value> {
    let run = generate_id()[..8].to_string();
    (0..count)
        .map(|i| {
            let defaults = patient(json!({
                "gender": GENDERS[i % GENDERS.len()],
                "identifier": [identifier(
                    Some("http://hospital.org/identifiers/batch"),
                    Some(&format!("BATCH-{}-{:03}", run, i)),
                )],
            }));
            merge(defaults, overrides.clone())
        })
        .collect()
}
