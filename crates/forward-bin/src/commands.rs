//! Subcommand handlers.

use clap::{ArgAction, Subcommand};
use forward_config_and_utils::Config;
use forward_retriable_worker::{SendOutcome, StoreAndForward};
use forward_store::Message;

use crate::MessageArgs;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Subcommand)]
pub enum PrefsCommand {
    /// Print the current preferences
    Show,
    /// Daily Wi-Fi blackout, e.g. 22:00-06:00
    SetWlanBlackout { window: String },
    /// Daily cellular blackout, e.g. 08:00-18:00
    SetWwanBlackout { window: String },
    /// One-off cellular blackout between two epoch-millisecond instants
    SetNonRecurringBlackout { start: i64, end: i64 },
    /// Remove the one-off cellular blackout
    ClearNonRecurringBlackout,
    /// Allow or forbid sending while charging
    SetCanSendOnCharge {
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Allow or forbid sending on battery
    SetCanSendOffCharge {
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Allow or forbid sending while roaming
    SetCanSendOnRoaming {
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Cap the queue size in bytes
    SetStorageLimit { bytes: i64 },
    /// Remove the queue size cap
    ResetStorageLimit,
    /// Turn batch upload on or off
    SetBatchUpload {
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Batch endpoint override
    SetBatchUploadUrl { url: String },
    /// Minimum milliseconds between batch submissions
    SetBatchUploadInterval { interval_ms: i64 },
}

fn build_message(config: &Config, args: MessageArgs) -> CliResult<Message> {
    let mut message = Message::new(args.url, args.body)
        .with_retries(args.retries.unwrap_or(config.default_retries));

    for header in &args.headers {
        let (key, value) = header
            .split_once(':')
            .ok_or_else(|| format!("Invalid header '{}', expected KEY:VALUE", header))?;
        message = message.with_header(key.trim(), value.trim());
    }

    message.username = args.username;
    message.password = args.password;

    Ok(message)
}

pub async fn enqueue(engine: &StoreAndForward, config: &Config, args: MessageArgs) -> CliResult<()> {
    let drain_after = args.drain;
    let message = build_message(config, args)?;
    let id = engine.enqueue(&message)?;
    println!("Queued message {}", id);
    if drain_after {
        drain(engine).await;
    }
    Ok(())
}

pub async fn send(engine: &StoreAndForward, config: &Config, args: MessageArgs) -> CliResult<()> {
    let drain_after = args.drain;
    let message = build_message(config, args)?;
    match engine.send_or_enqueue(&message).await? {
        SendOutcome::Sent => println!("Sent"),
        SendOutcome::Rejected(data) => {
            println!("Rejected: {}", data.unwrap_or_default());
        }
        SendOutcome::Queued(id) => println!("Queued message {}", id),
    }
    if drain_after {
        drain(engine).await;
    }
    Ok(())
}

pub async fn drain(engine: &StoreAndForward) {
    let report = engine.drain().await;
    println!(
        "Delivered {}, rejected {}, stopped: {:?}",
        report.delivered, report.rejected, report.stop
    );
}

pub fn shrink(engine: &StoreAndForward, limit: i64) -> CliResult<()> {
    engine.shrink(limit)?;
    println!("{} messages remain", engine.pending_count()?);
    Ok(())
}

pub fn prefs(engine: &StoreAndForward, command: PrefsCommand) -> CliResult<()> {
    let prefs = engine.preferences();
    match command {
        PrefsCommand::Show => {
            let (start, end) = prefs.non_recurring_wwan_blackout();
            println!("can_send_on_charge:  {}", prefs.can_send_on_charge());
            println!("can_send_off_charge: {}", prefs.can_send_off_charge());
            println!("can_send_on_roaming: {}", prefs.can_send_on_roaming());
            println!("wlan_blackout:       {}", prefs.wlan_blackout().unwrap_or_default());
            println!("wwan_blackout:       {}", prefs.wwan_blackout().unwrap_or_default());
            println!("non_recurring:       {:?} - {:?}", start, end);
            println!("storage_size_limit:  {:?}", prefs.storage_size_limit());
            println!("queue_mode:          {:?}", engine.queue_mode());
            println!("batch_upload_url:    {}", prefs.batch_upload_url().unwrap_or_default());
            println!("batch_interval_ms:   {:?}", prefs.batch_upload_check_interval());
        }
        PrefsCommand::SetWlanBlackout { window } => prefs.set_wlan_blackout(&window)?,
        PrefsCommand::SetWwanBlackout { window } => prefs.set_wwan_blackout(&window)?,
        PrefsCommand::SetNonRecurringBlackout { start, end } => {
            prefs.set_non_recurring_wwan_blackout(start, end)?
        }
        PrefsCommand::ClearNonRecurringBlackout => prefs.clear_non_recurring_wwan_blackout()?,
        PrefsCommand::SetCanSendOnCharge { value } => prefs.set_can_send_on_charge(value)?,
        PrefsCommand::SetCanSendOffCharge { value } => prefs.set_can_send_off_charge(value)?,
        PrefsCommand::SetCanSendOnRoaming { value } => prefs.set_can_send_on_roaming(value)?,
        PrefsCommand::SetStorageLimit { bytes } => {
            let applied = engine.set_storage_size_limit(bytes)?;
            println!("Storage limit set to {} bytes", applied);
        }
        PrefsCommand::ResetStorageLimit => engine.reset_storage_size_limit()?,
        PrefsCommand::SetBatchUpload { value } => prefs.set_batch_upload(value)?,
        PrefsCommand::SetBatchUploadUrl { url } => prefs.set_batch_upload_url(&url)?,
        PrefsCommand::SetBatchUploadInterval { interval_ms } => {
            prefs.set_batch_upload_check_interval(interval_ms)?
        }
    }
    Ok(())
}
