use log::{debug, info, warn};

use data_entry::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;

#[derive(Debug, Snafu)]
pub enum RunError {
    #[snafu(display("Error reading file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Entry operation failed"))]
    Entry { source: EntryError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RunResult<T> = Result<T, RunError>;

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> RunResult<T> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read {} bytes from {}", contents.len(), path);
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

/// Drives one full data entry run against the server, as instructed by the
/// command line flags.
pub fn run_entry(args: &Args) -> RunResult<()> {
    let election: Election = read_json(args.election.as_str())?;
    info!(
        "election {} ({} lists, recount: {})",
        election.name,
        election.political_groups.len(),
        election.recount
    );
    let target = EntryTarget {
        election_id: election.id,
        polling_station_id: args.polling_station,
        entry_number: args.entry,
    };
    let api = HttpEntryApi::new(args.server.as_str(), args.cookie.clone());
    let mut controller = DataEntryController::new(api, &election, target);

    controller.claim_or_create().context(EntrySnafu {})?;

    if args.delete {
        controller.delete().context(EntrySnafu {})?;
        println!(
            "Deleted entry {} of polling station {}",
            target.entry_number, target.polling_station_id
        );
        return Ok(());
    }

    if let Some(input) = &args.input {
        let values: PollingStationResults = read_json(input.as_str())?;
        controller.set_values(values);
        submit_sections(&mut controller, args.accept_warnings)?;
    }

    print_summary(&controller);

    if let Some(reference) = &args.reference {
        check_reference(&target, args, reference.as_str())?;
    }

    if args.abort {
        controller.abort().context(EntrySnafu {})?;
        println!("Entry paused; it can be resumed by claiming it again.");
        return Ok(());
    }

    if args.finalise {
        controller.finalise().context(EntrySnafu {})?;
        println!(
            "Finalised entry {} of polling station {}",
            target.entry_number, target.polling_station_id
        );
    }

    Ok(())
}

/// Submits the sections in order until the form is clean or a section
/// refuses to become so.
fn submit_sections<A: EntryApi>(
    controller: &mut DataEntryController<A>,
    accept_warnings: bool,
) -> RunResult<()> {
    // Each section is submitted at most twice (once more after accepting
    // warnings), so this bounds the loop.
    let max_rounds = 2 * controller.structure().len();
    for _ in 0..max_rounds {
        let current = match controller.session() {
            Some(session) => session.form.current,
            None => whatever!("no active session"),
        };
        if current == SectionId::Save {
            return Ok(());
        }
        info!("submitting section {}", current);
        controller.submit_current().context(EntrySnafu {})?;
        let session = match controller.session() {
            Some(session) => session,
            None => whatever!("session lost while submitting"),
        };
        let status = session.form.status(current);
        report_issues(current, status);
        if status.is_saved {
            continue;
        }
        if accept_warnings && status.errors.is_empty() && !status.warnings.is_empty() {
            info!("accepting warnings on section {}", current);
            controller.accept_warnings(true);
            continue;
        }
        warn!("section {} is not clean, stopping here", current);
        return Ok(());
    }
    whatever!("the form did not converge to a clean state")
}

fn report_issues(section: SectionId, status: &SectionStatus) {
    for e in &status.errors {
        println!("{}: error {} on {}", section, e.code, e.fields.join(", "));
    }
    for w in &status.warnings {
        println!("{}: warning {} on {}", section, w.code, w.fields.join(", "));
    }
}

fn print_summary<A: EntryApi>(controller: &DataEntryController<A>) {
    let session = match controller.session() {
        Some(session) => session,
        None => return,
    };
    println!("Progress: {}%", session.progress);
    for section in controller.structure() {
        let status = session.form.status(section.id);
        let state = if status.is_saved {
            "saved"
        } else if !status.errors.is_empty() {
            "errors"
        } else if !status.warnings.is_empty() {
            "warnings"
        } else {
            "open"
        };
        println!("  {:40} {}", section.title, state);
    }
    if session.form.can_finalise() {
        println!("All sections are clean; the entry can be finalised.");
    }
}

/// Claims the record once more and compares it against a reference file.
fn check_reference(target: &EntryTarget, args: &Args, reference_path: &str) -> RunResult<()> {
    let api = HttpEntryApi::new(args.server.as_str(), args.cookie.clone());
    let claim = match api.claim(target) {
        Ok(ClaimOutcome::Found(claim)) => claim,
        Ok(ClaimOutcome::NotFound) => {
            whatever!("the server holds no record to compare against")
        }
        Err(e) => return Err(RunError::Entry { source: e.into() }),
    };
    let actual = record_as_value(&claim.data)?;
    let expected: JSValue = read_json(reference_path)?;
    if expected != actual {
        warn!("Found differences with the reference record");
        print_diff(pretty(&expected).as_str(), pretty(&actual).as_str(), "\n");
        whatever!("Difference detected between the server record and the reference")
    }
    info!("server record matches the reference");
    Ok(())
}

/// Normalizes the record to a JSON value, so that both sides of the
/// comparison carry the same key order.
fn record_as_value(record: &PollingStationResults) -> RunResult<JSValue> {
    serde_json::to_value(record).context(ParsingJsonSnafu {
        path: "<server record>",
    })
}

fn pretty(value: &JSValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
