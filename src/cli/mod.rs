pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

use anyhow::Result;

use self::actions::Action;

/// Parse the command line, initialize logging and return the action to run.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    #[allow(clippy::cast_possible_wrap)]
    let verbosity = matches.get_count("verbose") as i8 - matches.get_count("quiet") as i8;
    telemetry::init(verbosity)?;

    dispatch::handler(&matches)
}
