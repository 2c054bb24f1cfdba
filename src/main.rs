//! In-place application updater
//!
//! Started by the host application as `updater <INSTALL_DIR> <DOWNLOAD_URL>`.
//! See [`inplace_updater::cli`] for options and exit codes.

use inplace_updater::cli;

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = cli::parse_args();
    let code = cli.run().await;
    std::process::exit(code);
}
