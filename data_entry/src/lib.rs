mod api;
mod election;
pub mod manual;
mod results;
mod structure;
mod validation;

use std::collections::BTreeMap;

use log::{debug, info, warn};
use snafu::Snafu;

pub use crate::api::*;
pub use crate::election::*;
pub use crate::results::*;
pub use crate::structure::*;
pub use crate::validation::*;

// **** The data entry state machine ****

/// Validation status of one section, as the operator sees it.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SectionStatus {
    pub errors: Vec<ValidationResult>,
    pub warnings: Vec<ValidationResult>,
    /// The operator confirmed the current warnings and wants to move on.
    pub ignore_warnings: bool,
    /// The warning codes that were on screen when the operator confirmed.
    /// A code outside this set voids the confirmation.
    pub accepted_warnings: Vec<String>,
    pub is_saved: bool,
}

impl SectionStatus {
    /// A section only counts as clean when it has no errors and its
    /// warnings are either gone or explicitly accepted.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && (self.warnings.is_empty() || self.ignore_warnings)
    }

    fn has_unaccepted_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| !self.accepted_warnings.contains(&w.code))
    }
}

/// Where the operator is in the form and how far each section got.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FormState {
    /// The section currently on screen.
    pub current: SectionId,
    pub sections: BTreeMap<SectionId, SectionStatus>,
}

impl FormState {
    fn new(structure: &[FormSection]) -> FormState {
        FormState {
            current: structure[0].id,
            sections: structure
                .iter()
                .map(|s| (s.id, SectionStatus::default()))
                .collect(),
        }
    }

    pub fn status(&self, id: SectionId) -> &SectionStatus {
        // Every id from the structure is present from construction on.
        &self.sections[&id]
    }

    /// The first data section that has not been saved yet, or the save
    /// section once all of them have.
    pub fn target_section(&self) -> SectionId {
        self.sections
            .iter()
            .find(|(id, status)| **id != SectionId::Save && !status.is_saved)
            .map(|(id, _)| *id)
            .unwrap_or(SectionId::Save)
    }

    /// Finalization is permitted only when every data section is saved and
    /// clean and no unresolved cross-section result remains on the save
    /// section.
    pub fn can_finalise(&self) -> bool {
        self.sections.iter().all(|(id, status)| {
            if *id == SectionId::Save {
                status.is_clean()
            } else {
                status.is_saved && status.is_clean()
            }
        })
    }

    fn saved_fraction(&self) -> u8 {
        let total = self.sections.len().saturating_sub(1);
        if total == 0 {
            return 100;
        }
        let saved = self
            .sections
            .iter()
            .filter(|(id, s)| **id != SectionId::Save && s.is_saved)
            .count();
        ((saved * 100) / total) as u8
    }
}

/// One claimed entry being edited.
#[derive(PartialEq, Debug, Clone)]
pub struct EntrySession {
    pub values: PollingStationResults,
    pub client_state: ClientState,
    pub form: FormState,
    /// Rebuilt wholesale from the last save response.
    pub index: ResultIndex,
    /// 0-100, never decreasing while editing.
    pub progress: u8,
    /// Values changed since the last successful save.
    pub dirty: bool,
}

impl EntrySession {
    fn new(
        values: PollingStationResults,
        client_state: ClientState,
        progress: u8,
        structure: &[FormSection],
    ) -> EntrySession {
        EntrySession {
            values,
            client_state,
            form: FormState::new(structure),
            index: ResultIndex::default(),
            progress,
            dirty: false,
        }
    }
}

/// Lifecycle phase of the entry. Mutually exclusive; every server response
/// is checked against the phase before it is applied, so a stale response
/// can never resurrect an abandoned session.
#[derive(PartialEq, Debug, Clone)]
pub enum DataEntryState {
    Loading,
    /// The server holds no record for this entry slot yet.
    NotFound,
    LoadFailed(ApiFailure),
    Ready(EntrySession),
    Submitting {
        session: EntrySession,
        pending: SectionId,
    },
    SaveFailed {
        session: EntrySession,
        failure: ApiFailure,
    },
    Finalizing(EntrySession),
    Finalized,
    Deleting(EntrySession),
    Deleted,
    Aborted,
}

/// Everything that can happen to an entry. The network driver translates
/// protocol outcomes into these; the UI layer produces the operator-driven
/// ones.
#[derive(PartialEq, Debug, Clone)]
pub enum DataEntryAction {
    ClaimSucceeded {
        values: PollingStationResults,
        client_state: ClientState,
        progress: u8,
    },
    ClaimNotFound,
    ClaimFailed(ApiFailure),
    /// A zero-valued record was synthesized and persisted after a
    /// not-found claim.
    EntryCreated {
        values: PollingStationResults,
        client_state: ClientState,
    },
    ValuesEdited(PollingStationResults),
    SectionRegistered(SectionId),
    SubmitRequested(SectionId),
    SaveSucceeded {
        client_state: ClientState,
        results: ValidationResults,
    },
    SaveFailed(ApiFailure),
    WarningsAccepted {
        section: SectionId,
        accept: bool,
    },
    FinalizeRequested,
    FinalizeSucceeded,
    FinalizeFailed(ApiFailure),
    DeleteRequested,
    DeleteSucceeded,
    DeleteFailed(ApiFailure),
    AbortRequested,
}

/// The pure transition function. Anything not listed is dropped where that
/// is a legitimate race (stale responses, actions after the session ended)
/// and a programmer defect otherwise.
pub fn reduce(
    state: DataEntryState,
    action: DataEntryAction,
    structure: &[FormSection],
) -> DataEntryState {
    use DataEntryAction as A;
    use DataEntryState as S;
    match (state, action) {
        // Terminal phases absorb everything, including late responses.
        (state @ (S::Deleted | S::Finalized | S::Aborted), action) => {
            debug!("entry is closed, dropping {:?}", action);
            state
        }

        (S::Loading, A::ClaimSucceeded { values, client_state, progress }) => S::Ready(
            EntrySession::new(values, client_state, progress, structure),
        ),
        (S::Loading, A::ClaimNotFound) => S::NotFound,
        (S::Loading | S::NotFound, A::ClaimFailed(failure)) => S::LoadFailed(failure),
        (S::NotFound, A::EntryCreated { values, client_state }) => {
            S::Ready(EntrySession::new(values, client_state, 0, structure))
        }

        (S::Ready(mut session), A::ValuesEdited(values)) => {
            session.values = values;
            session.dirty = true;
            S::Ready(session)
        }
        // Editing after a failed save drops back to the regular flow; the
        // typed values were never lost.
        (S::SaveFailed { mut session, .. }, A::ValuesEdited(values)) => {
            session.values = values;
            session.dirty = true;
            S::Ready(session)
        }

        (S::Ready(mut session), A::SectionRegistered(id)) => {
            register_section(&mut session, id);
            S::Ready(session)
        }
        (S::SaveFailed { mut session, .. }, A::SectionRegistered(id)) => {
            register_section(&mut session, id);
            S::Ready(session)
        }

        (S::Ready(session) | S::SaveFailed { session, .. }, A::SubmitRequested(id)) => {
            // The check-and-save section holds no values of its own;
            // finalizing is the only way forward from it.
            if id == SectionId::Save {
                warn!("the {} section is not submittable", id);
                return S::Ready(session);
            }
            if id != session.form.current {
                debug_assert!(false, "submitted section {} is not the active one", id);
                warn!("ignoring submission of inactive section {}", id);
                return S::Ready(session);
            }
            S::Submitting { session, pending: id }
        }

        (S::Submitting { session, pending }, A::SaveSucceeded { client_state, results }) => {
            S::Ready(apply_save_success(session, pending, client_state, results, structure))
        }
        (S::Submitting { session, .. }, A::SaveFailed(failure)) => {
            S::SaveFailed { session, failure }
        }

        // Accepting from a failed save drops back to the regular flow, like
        // editing does.
        (
            S::Ready(mut session) | S::SaveFailed { mut session, .. },
            A::WarningsAccepted { section, accept },
        ) => {
            let status = session.form.sections.entry(section).or_default();
            status.ignore_warnings = accept;
            status.accepted_warnings = if accept {
                status.warnings.iter().map(|w| w.code.clone()).collect()
            } else {
                Vec::new()
            };
            S::Ready(session)
        }

        (S::Ready(session), A::FinalizeRequested) => {
            if session.form.can_finalise() {
                S::Finalizing(session)
            } else {
                warn!("finalization requested with unresolved sections, staying put");
                S::Ready(session)
            }
        }
        (S::Finalizing(_), A::FinalizeSucceeded) => S::Finalized,
        // Surfaced by the caller; the local entry state is untouched.
        (S::Finalizing(session), A::FinalizeFailed(failure)) => {
            warn!("finalise failed: {}", failure.message);
            S::Ready(session)
        }

        (
            S::Ready(session) | S::Submitting { session, .. } | S::SaveFailed { session, .. },
            A::DeleteRequested,
        ) => S::Deleting(session),
        (S::Deleting(_), A::DeleteSucceeded) => S::Deleted,
        (S::Deleting(session), A::DeleteFailed(failure)) => {
            warn!("delete failed: {}", failure.message);
            S::Ready(session)
        }

        (S::Ready(_), A::AbortRequested) => S::Aborted,

        // Everything else is a response that lost a race with a phase
        // change. Dropping it is the correct outcome.
        (state, action) => {
            debug!("dropping {:?} in phase {}", action, phase_name(&state));
            state
        }
    }
}

fn phase_name(state: &DataEntryState) -> &'static str {
    match state {
        DataEntryState::Loading => "loading",
        DataEntryState::NotFound => "not_found",
        DataEntryState::LoadFailed(_) => "load_failed",
        DataEntryState::Ready(_) => "ready",
        DataEntryState::Submitting { .. } => "submitting",
        DataEntryState::SaveFailed { .. } => "save_failed",
        DataEntryState::Finalizing(_) => "finalizing",
        DataEntryState::Finalized => "finalized",
        DataEntryState::Deleting(_) => "deleting",
        DataEntryState::Deleted => "deleted",
        DataEntryState::Aborted => "aborted",
    }
}

/// Navigation moves along the section order; the operator may revisit
/// anything up to the first unsaved section but cannot jump ahead of it.
fn register_section(session: &mut EntrySession, id: SectionId) {
    if !session.form.sections.contains_key(&id) {
        debug_assert!(false, "registered unknown section {}", id);
        warn!("ignoring registration of unknown section {}", id);
        return;
    }
    if id > session.form.target_section() {
        warn!("cannot navigate past the first unsaved section, ignoring {}", id);
        return;
    }
    session.form.current = id;
}

/// Applies a successful save: the full response is re-indexed, the pending
/// section and the cross-section results on the save section are updated,
/// and navigation advances when the pending section came out clean.
fn apply_save_success(
    mut session: EntrySession,
    pending: SectionId,
    client_state: ClientState,
    results: ValidationResults,
    structure: &[FormSection],
) -> EntrySession {
    let index = ResultIndex::build(&results, structure);
    apply_section_issues(&mut session.form, pending, index.for_section(pending).clone());
    if pending != SectionId::Save {
        apply_section_issues(
            &mut session.form,
            SectionId::Save,
            index.for_section(SectionId::Save).clone(),
        );
    }
    session.index = index;
    session.client_state = client_state;
    session.dirty = false;

    let status = session.form.status(pending);
    if status.is_saved {
        let next = session.form.target_section();
        debug!("section {} saved, moving on to {}", pending, next);
        session.form.current = next;
    } else {
        info!(
            "section {} has {} error(s) and {} warning(s)",
            pending,
            status.errors.len(),
            status.warnings.len()
        );
    }
    session.progress = session.progress.max(session.form.saved_fraction());
    session
}

fn apply_section_issues(form: &mut FormState, id: SectionId, issues: SectionIssues) {
    let status = form.sections.entry(id).or_default();
    status.errors = issues.errors;
    status.warnings = issues.warnings;
    // A warning code the operator has not seen voids an earlier acceptance.
    if status.ignore_warnings && status.has_unaccepted_warning() {
        info!("new warning on section {}, acceptance must be re-confirmed", id);
        status.ignore_warnings = false;
        status.accepted_warnings.clear();
    }
    status.is_saved = status.is_clean();
}

/// The state machine object: static structure plus the current phase.
pub struct DataEntryMachine {
    structure: Vec<FormSection>,
    state: DataEntryState,
}

impl DataEntryMachine {
    pub fn new(election: &Election) -> DataEntryMachine {
        DataEntryMachine {
            structure: form_structure(election),
            state: DataEntryState::Loading,
        }
    }

    pub fn state(&self) -> &DataEntryState {
        &self.state
    }

    pub fn structure(&self) -> &[FormSection] {
        &self.structure
    }

    pub fn dispatch(&mut self, action: DataEntryAction) {
        let state = std::mem::replace(&mut self.state, DataEntryState::Loading);
        self.state = reduce(state, action, &self.structure);
    }
}

// **** Controller ****

/// Errors surfaced by controller operations.
#[derive(Debug, Snafu)]
pub enum EntryError {
    /// Finalization was requested while a section still has unresolved
    /// errors or unaccepted warnings. Never sent to the server.
    #[snafu(display("the entry cannot be finalised: unresolved validation issues remain"))]
    FinalisationBlocked,
    #[snafu(display("operation not available in phase {phase}"))]
    WrongPhase { phase: &'static str },
    /// Every data section is saved; from the check-and-save section the
    /// entry can only be finalised, aborted or deleted.
    #[snafu(display("all sections are submitted; nothing is left to save"))]
    NothingToSubmit,
    #[snafu(context(false), display("{source}"))]
    Api { source: ApiError },
}

pub type EntryResult<T> = Result<T, EntryError>;

/// Composes the state machine with a protocol implementation for one
/// (election, polling station, entry number) triple.
///
/// All dependencies come in through the constructor; the controller drives
/// the machine by dispatching actions around the blocking protocol calls
/// and checks the phase before applying any response.
pub struct DataEntryController<A: EntryApi> {
    api: A,
    election: Election,
    target: EntryTarget,
    machine: DataEntryMachine,
}

impl<A: EntryApi> DataEntryController<A> {
    pub fn new(api: A, election: &Election, target: EntryTarget) -> DataEntryController<A> {
        DataEntryController {
            api,
            election: election.clone(),
            target,
            machine: DataEntryMachine::new(election),
        }
    }

    pub fn state(&self) -> &DataEntryState {
        self.machine.state()
    }

    pub fn structure(&self) -> &[FormSection] {
        self.machine.structure()
    }

    /// The live session, in any phase that has one.
    pub fn session(&self) -> Option<&EntrySession> {
        match self.machine.state() {
            DataEntryState::Ready(s)
            | DataEntryState::Submitting { session: s, .. }
            | DataEntryState::SaveFailed { session: s, .. }
            | DataEntryState::Finalizing(s)
            | DataEntryState::Deleting(s) => Some(s),
            _ => None,
        }
    }

    /// Claims the entry slot. When the server holds no record yet, an
    /// all-zero record is synthesized and persisted right away, so that a
    /// concurrent reader observes "in progress" rather than an absence.
    pub fn claim_or_create(&mut self) -> EntryResult<()> {
        info!(
            "claiming entry {} of polling station {}",
            self.target.entry_number, self.target.polling_station_id
        );
        match self.api.claim(&self.target) {
            Ok(ClaimOutcome::Found(claim)) => {
                self.machine.dispatch(DataEntryAction::ClaimSucceeded {
                    values: claim.data,
                    client_state: claim.client_state,
                    progress: claim.progress,
                });
                Ok(())
            }
            Ok(ClaimOutcome::NotFound) => {
                self.machine.dispatch(DataEntryAction::ClaimNotFound);
                let values = PollingStationResults::empty(&self.election);
                let mut client_state = ClientState::default();
                client_state.set_continue(true);
                let request = SaveRequest {
                    data: values.clone(),
                    client_state: client_state.clone(),
                };
                match self.api.save(&self.target, &request) {
                    // The validation outcome of the zero record is noise at
                    // this point: nothing has been entered yet.
                    Ok(_) => {
                        self.machine
                            .dispatch(DataEntryAction::EntryCreated { values, client_state });
                        Ok(())
                    }
                    Err(err) => {
                        self.machine
                            .dispatch(DataEntryAction::ClaimFailed((&err).into()));
                        Err(err.into())
                    }
                }
            }
            Err(err) => {
                self.machine
                    .dispatch(DataEntryAction::ClaimFailed((&err).into()));
                Err(err.into())
            }
        }
    }

    /// Replaces the whole value tree with what the operator has on screen.
    pub fn set_values(&mut self, values: PollingStationResults) {
        self.machine.dispatch(DataEntryAction::ValuesEdited(values));
    }

    /// Tells the controller which section the operator is looking at.
    pub fn register_section(&mut self, id: SectionId) {
        self.machine.dispatch(DataEntryAction::SectionRegistered(id));
    }

    /// Submits the active section: persists the full value tree and folds
    /// the returned validation results into the form state.
    pub fn submit_current(&mut self) -> EntryResult<()> {
        let (values, mut client_state, section) = match self.machine.state() {
            DataEntryState::Ready(s) | DataEntryState::SaveFailed { session: s, .. } => {
                if s.form.current == SectionId::Save {
                    return NothingToSubmitSnafu.fail();
                }
                (s.values.clone(), s.client_state.clone(), s.form.current)
            }
            // A submit racing a phase change (delete finishing, fatal load)
            // is not a defect; refuse it and let the caller re-render.
            other => return WrongPhaseSnafu { phase: phase_name(other) }.fail(),
        };
        self.machine.dispatch(DataEntryAction::SubmitRequested(section));
        client_state.set_continue(true);
        let request = SaveRequest {
            data: values,
            client_state: client_state.clone(),
        };
        match self.api.save(&self.target, &request) {
            Ok(response) => {
                self.machine.dispatch(DataEntryAction::SaveSucceeded {
                    client_state,
                    results: response.validation_results,
                });
                Ok(())
            }
            Err(err) => {
                self.machine
                    .dispatch(DataEntryAction::SaveFailed((&err).into()));
                Err(err.into())
            }
        }
    }

    /// Confirms (or withdraws confirmation of) the warnings on the active
    /// section.
    pub fn accept_warnings(&mut self, accept: bool) {
        // Only the editing phases can change an acceptance; anywhere else
        // the action would be dropped by the reducer.
        let section = match self.machine.state() {
            DataEntryState::Ready(s) | DataEntryState::SaveFailed { session: s, .. } => {
                s.form.current
            }
            _ => return,
        };
        self.machine
            .dispatch(DataEntryAction::WarningsAccepted { section, accept });
    }

    /// One-shot completion of the entry. Rejected locally, without a
    /// request, unless every section is clean.
    pub fn finalise(&mut self) -> EntryResult<()> {
        match self.machine.state() {
            DataEntryState::Ready(session) => {
                if !session.form.can_finalise() {
                    return FinalisationBlockedSnafu.fail();
                }
            }
            other => return WrongPhaseSnafu { phase: phase_name(other) }.fail(),
        }
        self.machine.dispatch(DataEntryAction::FinalizeRequested);
        match self.api.finalise(&self.target) {
            Ok(()) => {
                self.machine.dispatch(DataEntryAction::FinalizeSucceeded);
                info!("entry finalised");
                Ok(())
            }
            Err(err) => {
                self.machine
                    .dispatch(DataEntryAction::FinalizeFailed((&err).into()));
                Err(err.into())
            }
        }
    }

    /// Pauses the session without discarding it: dirty values are persisted
    /// first so a later claim resumes from them.
    pub fn abort(&mut self) -> EntryResult<()> {
        let pending_save = match self.machine.state() {
            DataEntryState::Ready(session) => {
                if session.dirty {
                    let mut client_state = session.client_state.clone();
                    client_state.set_continue(true);
                    Some(SaveRequest {
                        data: session.values.clone(),
                        client_state,
                    })
                } else {
                    None
                }
            }
            other => return WrongPhaseSnafu { phase: phase_name(other) }.fail(),
        };
        if let Some(request) = pending_save {
            // A failure leaves the session editable with values intact.
            self.api.save(&self.target, &request)?;
        }
        self.machine.dispatch(DataEntryAction::AbortRequested);
        info!("entry aborted, values remain claimable");
        Ok(())
    }

    /// Discards the entry server-side. Safe to request while a save is in
    /// flight: the save's late response is dropped by the phase check.
    pub fn delete(&mut self) -> EntryResult<()> {
        self.machine.dispatch(DataEntryAction::DeleteRequested);
        if !matches!(self.machine.state(), DataEntryState::Deleting(_)) {
            return WrongPhaseSnafu { phase: phase_name(self.machine.state()) }.fail();
        }
        match self.api.delete(&self.target) {
            Ok(()) => {
                self.machine.dispatch(DataEntryAction::DeleteSucceeded);
                info!("entry deleted");
                Ok(())
            }
            Err(err) => {
                self.machine
                    .dispatch(DataEntryAction::DeleteFailed((&err).into()));
                Err(err.into())
            }
        }
    }
}
