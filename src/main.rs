//! Binary entrypoint: boots the framework shell from merged configuration
//! and serves until the process is terminated.

use tejas::shell::Shell;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let shell = Shell::boot(None).await?;
    shell.run().await
}
