//! CLI domain: parse, route, output, and presentation only.
//! No scheduling logic; the route table dispatches to the scheduler and the simulator.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{format_simulation_json, format_simulation_text};
pub use route::{load_config, RunContext};
