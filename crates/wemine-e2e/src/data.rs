// Test data catalogue and generators
//
// Fixed reference data the suite submits or expects, plus small generators for
// values that have to be unique or current per run.

use chrono::Local;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::PathBuf;

/// A known test account and the role it holds in the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestUser {
    pub username: &'static str,
    pub role: &'static str,
}

pub const OPERATOR: TestUser = TestUser {
    username: "testuser@mining.com",
    role: "operator",
};

pub const SUPERVISOR: TestUser = TestUser {
    username: "supervisor@mining.com",
    role: "supervisor",
};

pub const PIC: TestUser = TestUser {
    username: "pic@mining.com",
    role: "pic",
};

pub const USERS: [TestUser; 3] = [OPERATOR, SUPERVISOR, PIC];

/// Username the backend does not know
pub const UNKNOWN_USERNAME: &str = "nonexistent@invalid.com";

/// Location triple used by hazard reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestLocation {
    pub location: &'static str,
    pub sublocation: &'static str,
    pub area: &'static str,
}

pub const LOCATIONS: [TestLocation; 2] = [
    TestLocation {
        location: "Main Site",
        sublocation: "North Section",
        area: "Area A1",
    },
    TestLocation {
        location: "Secondary Site",
        sublocation: "South Section",
        area: "Area B2",
    },
];

pub mod form_codes {
    /// Text, date and select fields
    pub const BASIC_INSPECTION: &str = "FORM-001";
    /// Every field kind, including a radio group and an image
    pub const DETAILED_INSPECTION: &str = "FORM-002";
    pub const EQUIPMENT_CHECK: &str = "FORM-003";

    pub const ALL: [&str; 3] = [BASIC_INSPECTION, DETAILED_INSPECTION, EQUIPMENT_CHECK];
}

/// URL fragments the harness matches backend calls against.
pub mod endpoints {
    pub const USER_WHO: &str = "/user/who";
    pub const TENANT_INFO: &str = "/tenant/info";
    pub const TENANT_LOOKUP: &str = "/tenant/lookup";
    pub const USER_ME: &str = "/user/me";
    pub const TENANT_MASTER: &str = "/tenant/master";
    pub const LOCATIONS: &str = "/locations";
    pub const SUBLOCATIONS: &str = "/sublocations";
    pub const AREAS: &str = "/areas";
    pub const EMPLOYEES: &str = "/employees";
    pub const FORMS: &str = "/forms";
    pub const EQUIPMENT_SUBMIT: &str = "/equipment/inspection/submit";
    pub const SAFETY_HAZARD: &str = "/safety/hazard";
    pub const WORKFLOW_TASK: &str = "/workflow/task";
    pub const NOTIFICATION_SEND: &str = "/notification/send";

    /// Auxiliary master-data endpoints fetched while the progress bar shows
    pub const AUXILIARY: [&str; 5] = [LOCATIONS, SUBLOCATIONS, AREAS, EMPLOYEES, FORMS];
}

/// Error texts the application shows
pub mod messages {
    pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
    pub const NETWORK_ERROR: &str = "Network error. Please try again.";
    pub const REQUIRED_FIELD: &str = "This field is required";
    pub const USER_NOT_FOUND: &str = "user not found";
}

/// Random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Throwaway e-mail address, `test_<8 chars>@wemine.com`.
pub fn random_email() -> String {
    format!("test_{}@wemine.com", random_string(8).to_lowercase())
}

/// Today's local date, `YYYY-MM-DD`.
pub fn current_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Current local date and time to the minute, `YYYY-MM-DDTHH:MM`.
pub fn current_date_time() -> String {
    Local::now().format("%Y-%m-%dT%H:%M").to_string()
}

/// Path of the image used as inspection/hazard evidence.
///
/// Resolved relative to the crate so tests work from any working directory.
pub fn test_image_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test-image.png")
}
