//! CLI subcommand implementations for the dredge binary.

pub mod doctor;
pub mod harvest_cmd;
pub mod output;
pub mod probe_cmd;
pub mod progress_line;
pub mod simulate_cmd;
