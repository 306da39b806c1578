mod bookkeeping;
mod demography;
mod environment;
mod household;

pub use bookkeeping::BookkeepingSystem;
pub use demography::DemographySystem;
pub use environment::EnvironmentSystem;
pub use household::HouseholdSystem;
