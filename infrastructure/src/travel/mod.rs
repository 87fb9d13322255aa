//! Travel adapters: implementations of the
//! [`TravelPort`](ward_application::TravelPort).

mod simulated;

pub use simulated::SimulatedTravel;
