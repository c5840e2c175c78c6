//! Terminal rendering for the dialer console

use colored::{ColoredString, Colorize};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use dialer_core::phone::is_dialable;
use dialer_core::{Contact, ContactStatus, FromNumber, QueueSnapshot, RunState, SequencerEvent};

#[derive(Tabled)]
struct ContactRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Dialed")]
    phone: String,
    #[tabled(rename = "As uploaded")]
    original: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl ContactRow {
    fn new(position: usize, contact: &Contact) -> Self {
        let status = match contact.error() {
            Some(error) => format!("{}: {error}", contact.status.label()),
            None => contact.status.label().to_string(),
        };
        Self {
            position,
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            original: contact.original_phone.clone(),
            status,
        }
    }
}

#[derive(Tabled)]
struct NumberRow {
    #[tabled(rename = "Number")]
    number: String,
    #[tabled(rename = "Label")]
    label: String,
}

fn paint(status: &ContactStatus) -> ColoredString {
    match status {
        ContactStatus::Pending => status.label().dimmed(),
        ContactStatus::Calling => status.label().yellow().bold(),
        ContactStatus::Completed => status.label().green(),
        ContactStatus::Failed { .. } => status.label().red(),
    }
}

pub fn contacts_table(contacts: &[Contact]) -> String {
    let rows = contacts
        .iter()
        .enumerate()
        .map(|(i, contact)| ContactRow::new(i + 1, contact));
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn numbers_table(numbers: &[FromNumber]) -> String {
    let rows = numbers.iter().map(|n| NumberRow {
        number: n.number.clone(),
        label: n.label.clone().unwrap_or_default(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Numbers that will probably be rejected by the carrier
pub fn undialable(contacts: &[Contact]) -> Vec<&Contact> {
    contacts.iter().filter(|c| !is_dialable(&c.phone)).collect()
}

/// One line per interesting event
pub fn print_event(event: &SequencerEvent, contacts: &[Contact]) {
    let name = |index: usize| {
        contacts
            .get(index)
            .map(|c| format!("{} ({})", c.name, c.phone))
            .unwrap_or_else(|| format!("#{}", index + 1))
    };

    match event {
        SequencerEvent::Started { mode, index, .. } => {
            println!("{} {} from #{}", "▶".green().bold(), mode, index + 1);
        }
        SequencerEvent::ContactStatusChanged { index, status, .. } => {
            let detail = match status {
                ContactStatus::Failed { error } => format!(" - {error}"),
                _ => String::new(),
            };
            println!("  [{:>3}] {:<40} {}{}", index + 1, name(*index), paint(status), detail.red());
        }
        SequencerEvent::CallConnected { index, .. } => {
            println!("  [{:>3}] {}", index + 1, "connected".cyan());
        }
        SequencerEvent::TransferFailed { reason } => {
            println!("{} transfer failed: {reason}", "!".yellow().bold());
        }
        SequencerEvent::Paused { index } => {
            println!("{} paused at #{}", "⏸".yellow().bold(), index + 1);
        }
        SequencerEvent::Halted { reason } => {
            println!("{} halted: {}", "■".red().bold(), reason.red());
        }
        SequencerEvent::Finished {
            completed, failed, ..
        } => {
            println!(
                "{} finished: {} completed, {} failed",
                "✔".green().bold(),
                completed.to_string().green(),
                failed.to_string().red()
            );
        }
        SequencerEvent::DurationTick { .. }
        | SequencerEvent::CursorAdvanced { .. }
        | SequencerEvent::Reset => {}
    }
}

pub fn print_summary(snapshot: &QueueSnapshot) {
    println!();
    println!("{}", contacts_table(&snapshot.contacts));
    let state = match &snapshot.run_state {
        RunState::Halted { reason } => format!("halted ({reason})").red(),
        RunState::Finished => "finished".green(),
        RunState::Paused => "paused".yellow(),
        RunState::Running => "running".yellow(),
        RunState::Idle => "idle".normal(),
    };
    println!(
        "{} | {} of {} settled | {} completed, {} failed, {} pending",
        state,
        snapshot.completed_count,
        snapshot.stats.total,
        snapshot.stats.completed,
        snapshot.stats.failed,
        snapshot.stats.pending
    );
}
