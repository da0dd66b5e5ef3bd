// Page models, one per application screen
//
// Each page holds the capabilities it needs (waits, form driver, network)
// rather than inheriting them.

pub mod equipment_inspection;
pub mod hazard_report;
pub mod login;

pub use equipment_inspection::{EquipmentInspectionPage, OfflineSubmission};
pub use hazard_report::{HazardDetails, HazardReportPage};
pub use login::LoginPage;
