//! CLI commands

use anyhow::Context;
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use trustcore_access::resolve_claims;
use trustcore_core::{Identity, TrustConfig};
use trustcore_events::EventReader;
use trustcore_ledger::{
    event_types, CancelToken, Checkpoint, EventDraft, EventFilter, HashChain, VerifyRange, VerifyReport,
};

use crate::context::AppContext;

/// Report layout and chain head
pub fn init(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let config = ctx.config();
    println!("✅ Schema ready");
    println!("   general + audit: {}", config.database_path.display());
    println!("   regulated:       {}", config.regulated_database_path.display());
    match ctx.chain().head()? {
        Some(head) => println!("   chain head:      #{} {}", head.id, head.hash),
        None => println!("   chain head:      (empty)"),
    }
    Ok(())
}

/// Optional subject fields of an appended event
#[derive(Debug, Default)]
pub struct Subject {
    pub session_id: Option<String>,
    pub application_id: Option<String>,
    pub decision_id: Option<String>,
}

/// Append one event on behalf of `identity`
pub fn append(
    ctx: &AppContext,
    identity: &Identity,
    event_type: &str,
    subject: Subject,
    payload: Option<&str>,
) -> Result<(), anyhow::Error> {
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("payload is not valid JSON")?,
        None => json!({}),
    };

    let mut draft = EventDraft::by(identity, event_type).payload(payload);
    if let Some(session) = subject.session_id {
        draft = draft.session(session);
    }
    if let Some(application) = subject.application_id {
        draft = draft.application(application);
    }
    if let Some(decision) = subject.decision_id {
        draft = draft.decision(decision);
    }

    let event = ctx.append(draft)?;
    println!("✅ Appended #{} {} ({})", event.id, event.event_type, event.hash);
    Ok(())
}

/// Print one page of events as JSON lines
pub fn events(ctx: &AppContext, filter: &EventFilter) -> Result<(), anyhow::Error> {
    let page = ctx.query(filter)?;
    for event in &page.events {
        println!("{}", serde_json::to_string(event)?);
    }
    match page.next_cursor {
        Some(cursor) => eprintln!(
            "... more results: --after {} --through {}",
            cursor,
            page.snapshot_id.unwrap_or(cursor)
        ),
        None => eprintln!("{} event(s)", page.events.len()),
    }
    Ok(())
}

/// Verify the live chain, optionally resuming from a checkpoint.
///
/// A break is itself recorded on the chain.
pub async fn verify(ctx: &AppContext, resume: Option<Checkpoint>) -> Result<(), anyhow::Error> {
    let range = match resume {
        Some(cp) => VerifyRange::after(cp),
        None => VerifyRange::full(),
    };

    let (handle, cancel) = ctx.spawn_verify(range);
    let report = tokio::select! {
        joined = AppContext::join_verify(handle) => joined?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("verification interrupted");
        }
    };

    print_report(&report);

    if !report.is_ok() {
        let system = Identity::new("trustcore-cli", trustcore_core::Role::Admin, "", "trustcore")?;
        ctx.append(EventDraft::by(&system, event_types::CHAIN_BROKEN).payload(json!({
            "first_break_id": report.first_break_id,
            "break_kind": report.break_kind,
            "events_checked": report.events_checked,
        })))?;
    }
    Ok(())
}

/// Verify an exported JSONL evidence file without touching any database
pub fn verify_file(path: &Path) -> Result<(), anyhow::Error> {
    let store = EventReader::from_file(path)
        .into_store()
        .with_context(|| format!("reading {}", path.display()))?;
    let chain = HashChain::new(Arc::new(store), &TrustConfig::default());
    let report = chain.verify(&VerifyRange::full(), &CancelToken::new())?;
    print_report(&report);
    Ok(())
}

/// Show the data scope a role claim resolves to
pub fn scope(role: &str, user_id: &str) -> Result<(), anyhow::Error> {
    let scope = resolve_claims(role, user_id)?;
    println!("{}", serde_json::to_string_pretty(&scope)?);
    Ok(())
}

/// Export matching events to a JSONL evidence file
pub fn export(ctx: &AppContext, filter: &EventFilter, output: &Path) -> Result<(), anyhow::Error> {
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = ctx.chain().export_jsonl(filter, &mut writer)?;
    println!("✅ Exported {} event(s) to {}", written, output.display());
    Ok(())
}

fn print_report(report: &VerifyReport) {
    if report.is_ok() {
        println!("✅ Hash chain verified ({} events)", report.events_checked);
    } else {
        println!(
            "❌ Hash chain broken at #{} ({:?}) after {} events",
            report.first_break_id.unwrap_or_default(),
            report.break_kind,
            report.events_checked
        );
    }
    if let Some(cp) = &report.checkpoint {
        println!("   checkpoint: {} {}", cp.id, cp.hash);
    }
}
