//! CLI domain: parse, route, output and presentation only.
//! Engine work happens in the orchestrator and budget gate; the route table only wires them.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, SubmitArgs};
pub use presentation::{format_budget_table, format_profile, format_run_summary};
pub use route::RunContext;
