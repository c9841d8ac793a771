pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod duration;
pub mod encoding;
pub mod error;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod table;
pub mod view;

pub fn run() -> Result<(), error::CliError> {
    cli::run()
}
