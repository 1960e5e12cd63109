//! Sync command: sweep unsynced records upstream, then merge remote records

use anyhow::Result;
use uvgestor_core::{RecordKind, RemoteStore, SnapshotSource};

use super::core::App;

pub async fn cmd_sync(app: &App) -> Result<()> {
    let session = app.require_session().await?;
    let user_id = session.user_id();

    if app.remote.is_offline() {
        println!("📴 No remote store configured. Records stay on this device.");
        println!("   Set UVGESTOR_REMOTE_URL or add a [remote] section to the config file.");
        return Ok(());
    }

    println!("🔄 Syncing with {} remote store...", app.remote.name());
    if !app.remote.health_check().await {
        println!("   ⚠️  Remote store is not reachable; trying anyway");
    }

    let mut failed = 0;
    for kind in RecordKind::all() {
        let repo = app.repo(*kind);

        let report = repo.sync_pending(user_id).await?;
        failed += report.failed;

        let mut snapshots = repo.fetch_records(user_id);
        let mut merged = None;
        while let Some(snapshot) = snapshots.recv().await {
            match snapshot {
                Ok(s) if s.source == SnapshotSource::Merged => merged = Some(s.records.len()),
                Ok(_) => {}
                Err(e) if e.is_remote() => {
                    println!("   ⚠️  {}: could not fetch remote records ({})", kind, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        print!(
            "   {:<9} uploaded {}/{}",
            format!("{}s:", kind),
            report.pushed,
            report.attempted
        );
        match merged {
            Some(count) => println!(", {} on this device after merge", count),
            None => println!(", remote records not merged"),
        }
    }

    println!();
    if failed > 0 {
        println!(
            "⚠️  {} record(s) still pending. They will be retried on the next sync.",
            failed
        );
    } else {
        println!("✅ Everything is synced");
    }
    Ok(())
}
