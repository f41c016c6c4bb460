use anyhow::Result;
use pdiffcopy::cli::{self, actions};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let action = cli::start()?;

    actions::run::handle(action).await?;

    Ok(())
}
