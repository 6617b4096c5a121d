//! Interactive sign-in.

use crate::commands::{auth_session, cancel_on_interrupt};
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Runs the device-code flow and prints the signed-in account.
///
/// The session is held in memory only, so this mainly checks that the app
/// registration and consent work.
pub async fn login(config: &ClientConfig) -> ClientResult<()> {
    let auth = auth_session(config)?;
    let interrupt = cancel_on_interrupt(auth.clone());

    let result = async {
        auth.begin_login().await?;
        auth.complete_login().await
    }
    .await;
    interrupt.abort();
    result?;

    match auth.account_hint() {
        Some(account) => println!("Signed in as {}.", account),
        None => println!("Signed in."),
    }
    Ok(())
}
