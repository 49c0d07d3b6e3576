use anyhow::Result;
use repostats::cli::{init_logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.common.verbose);
    cli.execute()
}
