// libs/appointment-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use router::{clinic_routes, AppointmentCellState};
pub use services::booking::{AppointmentBookingService, SchedulingRules};
pub use services::directory::ClinicDirectoryService;
pub use store::{ClinicStore, InMemoryStore, StoreError, SupabaseStore};
