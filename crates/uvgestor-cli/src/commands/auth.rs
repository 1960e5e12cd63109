//! Account command implementations (register, login, logout, whoami)

use anyhow::{bail, Result};
use uvgestor_core::{GuardianInput, User};

use super::core::App;
use crate::cli::GuardianArgs;

fn print_user(user: &User) {
    println!("   Name:  {}", user.name);
    println!("   Email: {}", user.email);
    println!("   ID:    {}", user.id);
    if user.is_minor {
        for guardian in &user.guardians {
            println!(
                "   Guardian: {} <{}> ({})",
                guardian.name, guardian.email, guardian.relationship
            );
        }
    }
}

impl GuardianArgs {
    fn into_input(self) -> Option<GuardianInput> {
        match (self.guardian_name, self.guardian_email, self.guardian_relationship) {
            (Some(name), Some(email), Some(relationship)) => Some(GuardianInput {
                name,
                email,
                relationship,
            }),
            _ => None,
        }
    }
}

pub async fn cmd_register(
    app: &App,
    email: &str,
    password: &str,
    name: &str,
    guardian: GuardianArgs,
) -> Result<()> {
    let session = app
        .auth
        .register(email, password, name, guardian.into_input())
        .await?;

    println!("✅ Account created");
    print_user(&session.user);
    if session.user.is_minor {
        println!();
        println!("   Guardian linked: they can see this account's finances.");
    }
    Ok(())
}

pub async fn cmd_login(app: &App, email: &str, password: &str) -> Result<()> {
    let session = app.auth.login(email, password).await?;

    println!("✅ Signed in as {}", session.user.name);
    Ok(())
}

/// Sweep pending records first so logging out does not lose them
pub async fn cmd_logout(app: &App, force: bool) -> Result<()> {
    let Some(session) = app.auth.current_session().await? else {
        println!("Not signed in.");
        return Ok(());
    };
    let user_id = session.user_id();

    let mut unsynced = 0;
    for repo in [&app.expenses, &app.incomes] {
        let report = repo.sync_pending(user_id).await?;
        unsynced += report.failed;
    }

    if unsynced > 0 && !force {
        bail!(
            "{} record(s) have not reached the remote store and would be lost. \
            Run 'uvgestor sync' when online, or use --force",
            unsynced
        );
    }

    app.auth.logout(&session).await?;
    if unsynced > 0 {
        println!("⚠️  Discarded {} unsynced record(s)", unsynced);
    }
    println!("👋 Signed out {}", session.user.email);
    Ok(())
}

pub async fn cmd_whoami(app: &App) -> Result<()> {
    match app.auth.current_session().await? {
        Some(session) => {
            println!();
            println!("👤 Signed in");
            print_user(&session.user);
        }
        None => println!("Not signed in."),
    }
    Ok(())
}
