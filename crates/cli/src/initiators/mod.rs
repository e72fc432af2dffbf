//! `Initiator` implementations (spec §6.3). These live in the binary crate
//! rather than `dramsys-core` because trace parsing, synthetic traffic
//! generation and row-hammer emission are all explicitly out of the core's
//! scope (spec §1) — the core only depends on the `Initiator` trait.

mod row_hammer;
mod stl_player;
mod traffic_generator;

pub use row_hammer::RowHammer;
pub use stl_player::StlPlayer;
pub use traffic_generator::TrafficGenerator;
