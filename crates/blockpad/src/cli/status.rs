//! Status command handler

use crate::cli::{CliContext, report};

/// Print backend reachability and the page count.
pub fn handle_status(ctx: &CliContext) -> bool {
    let session = match ctx.session() {
        Ok(session) => session,
        Err(e) => return report("Error opening storage", &e),
    };

    let connected = ctx.block_on(session.coordinator().refresh_connection());
    let status = session.status();

    println!("Backend: {}", ctx.config().storage.backend_name());
    println!(
        "Storage: {}",
        if connected { "reachable" } else { "unreachable" }
    );
    println!("Pages: {}", session.pages().len());
    if let Some(error) = &status.last_error {
        println!("Last error: {}", error);
    }

    connected
}
