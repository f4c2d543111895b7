// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

use crate::{
    Choice, ConfigError, DependencyGraph, FieldConfig, FieldId, FieldRegistry, FieldValue,
    FormSettings, InputOutcome, LookupField, ModalBrowser, ParamSource, RequestTarget,
    SearchRequest, SearchResponse,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormCommand {
    TextInput { field: FieldId, text: String },
    Search {
        field: FieldId,
        query: String,
        page: u32,
        append: bool,
    },
    LoadMore(FieldId),
    Select { field: FieldId, choice: Choice },
    Reset(FieldId),
    Focus(FieldId),
    Dismiss(FieldId),
    BrowseAll(FieldId),
    ModalQuery(String),
    ModalPage(u32),
    ModalNext,
    ModalPrevious,
    ModalSelect(Choice),
    CloseModal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    /// The driver must execute this request and feed the response back
    /// through [`LookupForm::apply_response`].
    RequestIssued(SearchRequest),
    ResultsUpdated(FieldId),
    PrerequisiteMissing { field: FieldId, message: String },
    SelectionChanged { field: FieldId, value: FieldValue },
    FieldReset(FieldId),
    EnabledChanged { field: FieldId, enabled: bool },
    ModalOpened(FieldId),
    ModalUpdated,
    ModalClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("unknown field {0}")]
    UnknownField(FieldId),
    #[error("field {0} does not offer an empty option")]
    EmptyOptionNotAllowed(FieldId),
}

/// A set of lookup fields wired by their dependency graph, sharing one
/// browse-all modal.
#[derive(Debug, Clone)]
pub struct LookupForm {
    registry: FieldRegistry,
    graph: DependencyGraph,
    modal: ModalBrowser,
}

impl LookupForm {
    pub fn new(configs: Vec<FieldConfig>, settings: FormSettings) -> Result<Self, ConfigError> {
        let graph = DependencyGraph::build(&configs)?;
        let fields = configs
            .into_iter()
            .map(|config| LookupField::new(config, settings.debounce))
            .collect();

        let mut form = Self {
            registry: FieldRegistry::new(fields),
            graph,
            modal: ModalBrowser::new(settings.debounce),
        };
        form.drop_unreachable_initial_values();
        let mut events = Vec::new();
        form.refresh_enabled(&mut events);
        Ok(form)
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn modal(&self) -> &ModalBrowser {
        &self.modal
    }

    pub fn field(&self, id: &str) -> Option<&LookupField> {
        self.registry.get(id)
    }

    /// Submission values, one per field, in declaration order.
    pub fn values(&self) -> Vec<(FieldId, FieldValue)> {
        self.registry
            .iter()
            .map(|field| (field.id().clone(), field.value()))
            .collect()
    }

    /// Earliest pending debounce deadline, for drivers that sleep between ticks.
    pub fn deadline(&self) -> Option<Instant> {
        self.registry
            .iter()
            .filter_map(LookupField::deadline)
            .chain(self.modal.deadline())
            .min()
    }

    pub fn dispatch(
        &mut self,
        command: FormCommand,
        now: Instant,
    ) -> Result<Vec<FormEvent>, FormError> {
        let mut events = Vec::new();
        match command {
            FormCommand::TextInput { field, text } => {
                self.text_input(&field, &text, now, &mut events)?;
            }
            FormCommand::Search {
                field,
                query,
                page,
                append,
            } => {
                self.require(&field)?;
                self.search(&field, &query, page, append, &mut events);
            }
            FormCommand::LoadMore(field) => self.load_more(&field, &mut events)?,
            FormCommand::Select { field, choice } => self.select(&field, choice, &mut events)?,
            FormCommand::Reset(field) => {
                self.require(&field)?;
                self.reset(&field, &mut events);
            }
            FormCommand::Focus(field) => {
                self.field_mut(&field)?.focus();
                events.push(FormEvent::ResultsUpdated(field));
            }
            FormCommand::Dismiss(field) => {
                self.field_mut(&field)?.dismiss();
                events.push(FormEvent::ResultsUpdated(field));
            }
            FormCommand::BrowseAll(field) => self.browse_all(&field, &mut events)?,
            FormCommand::ModalQuery(text) => {
                if self.modal.schedule_query(&text, now) {
                    events.push(FormEvent::ModalUpdated);
                }
            }
            FormCommand::ModalPage(page) => self.modal_page(page, &mut events),
            FormCommand::ModalNext => self.modal_step(true, &mut events),
            FormCommand::ModalPrevious => self.modal_step(false, &mut events),
            FormCommand::ModalSelect(choice) => self.modal_select(choice, &mut events)?,
            FormCommand::CloseModal => {
                if self.modal.close().is_some() {
                    events.push(FormEvent::ModalClosed);
                }
            }
        }
        Ok(events)
    }

    /// Fires every debounced search whose quiet period has elapsed.
    pub fn tick(&mut self, now: Instant) -> Vec<FormEvent> {
        let due: Vec<(FieldId, String)> = self
            .registry
            .iter_mut()
            .filter_map(|field| {
                field
                    .take_due_query(now)
                    .map(|query| (field.id().clone(), query))
            })
            .collect();

        let mut events = Vec::new();
        for (field, query) in due {
            tracing::debug!(%field, %query, "debounced search fired");
            self.search(&field, &query, 1, false, &mut events);
        }

        if self.modal.take_due_query(now).is_some() {
            self.issue_modal_request(1, &mut events);
        }
        events
    }

    pub fn apply_response(&mut self, response: SearchResponse) -> Vec<FormEvent> {
        let field = response.ticket.field.clone();
        match response.ticket.target {
            RequestTarget::Inline => {
                let applied = self
                    .registry
                    .get_mut(&field)
                    .is_some_and(|lookup| lookup.apply(&response));
                if applied {
                    vec![FormEvent::ResultsUpdated(field)]
                } else {
                    Vec::new()
                }
            }
            RequestTarget::Modal(_) => {
                if self.modal.apply(&response) {
                    vec![FormEvent::ModalUpdated]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn text_input(
        &mut self,
        id: &FieldId,
        text: &str,
        now: Instant,
        events: &mut Vec<FormEvent>,
    ) -> Result<(), FormError> {
        let field = self.field_mut(id)?;
        let before = field.value();
        let outcome = field.record_input(text, now);
        let after = field.value();
        if after != before {
            events.push(FormEvent::SelectionChanged {
                field: id.clone(),
                value: after,
            });
            self.refresh_enabled(events);
        }

        match outcome {
            InputOutcome::Disabled | InputOutcome::Scheduled => {}
            InputOutcome::Cleared => self.reset(id, events),
            InputOutcome::BelowMinimum => events.push(FormEvent::ResultsUpdated(id.clone())),
        }
        Ok(())
    }

    fn search(
        &mut self,
        id: &FieldId,
        query: &str,
        page: u32,
        append: bool,
        events: &mut Vec<FormEvent>,
    ) {
        if !self.gates_satisfied(id) {
            self.prerequisite_missing(id, events);
            return;
        }

        let params = self.collect_params(id);
        let Some(field) = self.registry.get_mut(id) else {
            return;
        };
        let request = field.begin_search(query, page, append, params);
        tracing::debug!(
            field = %id,
            request_id = %request.ticket.request_id,
            query,
            page,
            append,
            "search issued"
        );
        events.push(FormEvent::RequestIssued(request));
        events.push(FormEvent::ResultsUpdated(id.clone()));
    }

    fn load_more(&mut self, id: &FieldId, events: &mut Vec<FormEvent>) -> Result<(), FormError> {
        let field = self.registry.get(id).ok_or_else(|| unknown(id))?;
        if let Some(page) = field.next_page() {
            let query = field.current_query().to_owned();
            self.search(id, &query, page, true, events);
        }
        Ok(())
    }

    fn select(
        &mut self,
        id: &FieldId,
        choice: Choice,
        events: &mut Vec<FormEvent>,
    ) -> Result<(), FormError> {
        let field = self.field_mut(id)?;
        if !field.is_enabled() {
            tracing::debug!(field = %id, "ignoring selection on disabled field");
            return Ok(());
        }
        match choice {
            Choice::Item(item) => field.choose_item(item),
            Choice::Empty => {
                if !field.config().allow_empty_option {
                    return Err(FormError::EmptyOptionNotAllowed(id.clone()));
                }
                field.choose_empty();
            }
        }
        events.push(FormEvent::SelectionChanged {
            field: id.clone(),
            value: field.value(),
        });

        self.cascade(id, events);
        self.refresh_enabled(events);
        Ok(())
    }

    fn reset(&mut self, id: &FieldId, events: &mut Vec<FormEvent>) {
        let Some(field) = self.registry.get_mut(id) else {
            return;
        };
        field.clear();
        events.push(FormEvent::FieldReset(id.clone()));
        self.cascade(id, events);
        self.refresh_enabled(events);
    }

    fn cascade(&mut self, id: &FieldId, events: &mut Vec<FormEvent>) {
        let targets: Vec<FieldId> = self.graph.cascade_order(id).into_iter().cloned().collect();
        for target in targets {
            if let Some(field) = self.registry.get_mut(&target) {
                field.clear();
                events.push(FormEvent::FieldReset(target));
            }
        }
    }

    /// Recomputes `enabled` upstream-first; a field losing its gates is reset
    /// (cascading) before it is disabled.
    fn refresh_enabled(&mut self, events: &mut Vec<FormEvent>) {
        let order: Vec<FieldId> = self.graph.topological_order().cloned().collect();
        for id in order {
            let satisfied = self.gates_satisfied(&id);
            let Some(field) = self.registry.get_mut(&id) else {
                continue;
            };
            if field.is_enabled() == satisfied {
                continue;
            }

            if !satisfied {
                field.clear();
                events.push(FormEvent::FieldReset(id.clone()));
                self.cascade(&id, events);
                if self.modal.bound_field() == Some(&id) {
                    self.modal.close();
                    events.push(FormEvent::ModalClosed);
                }
            }
            if let Some(field) = self.registry.get_mut(&id) {
                field.set_enabled(satisfied);
            }
            events.push(FormEvent::EnabledChanged {
                field: id,
                enabled: satisfied,
            });
        }
    }

    fn browse_all(&mut self, id: &FieldId, events: &mut Vec<FormEvent>) -> Result<(), FormError> {
        self.require(id)?;
        if !self.gates_satisfied(id) {
            self.prerequisite_missing(id, events);
            return Ok(());
        }

        let Some(field) = self.registry.get(id) else {
            return Ok(());
        };
        self.modal.open(field.config());
        events.push(FormEvent::ModalOpened(id.clone()));
        self.issue_modal_request(1, events);
        Ok(())
    }

    fn modal_page(&mut self, page: u32, events: &mut Vec<FormEvent>) {
        if let Some(page) = self.modal.target_page(page) {
            self.issue_modal_request(page, events);
        }
    }

    /// Moves one page; at either edge the session is left untouched.
    fn modal_step(&mut self, forward: bool, events: &mut Vec<FormEvent>) {
        let Some(current) = self.modal.session().map(|session| session.current_page()) else {
            return;
        };
        let requested = if forward {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        match self.modal.target_page(requested) {
            Some(page) if page != current => self.issue_modal_request(page, events),
            _ => tracing::debug!(page = current, forward, "browse-all already at the edge"),
        }
    }

    fn modal_select(&mut self, choice: Choice, events: &mut Vec<FormEvent>) -> Result<(), FormError> {
        let Some(field) = self.modal.bound_field().cloned() else {
            return Ok(());
        };
        self.select(&field, choice, events)?;
        if self.modal.close().is_some() {
            events.push(FormEvent::ModalClosed);
        }
        Ok(())
    }

    fn issue_modal_request(&mut self, page: u32, events: &mut Vec<FormEvent>) {
        let Some(id) = self.modal.bound_field().cloned() else {
            return;
        };
        let params = self.collect_params(&id);
        let Some(field) = self.registry.get(&id) else {
            return;
        };
        if let Some(request) = self.modal.begin_request(field.config(), page, params) {
            events.push(FormEvent::RequestIssued(request));
            events.push(FormEvent::ModalUpdated);
        }
    }

    /// Seeded values behind an unsatisfied gate cannot stand; upstream
    /// fields are settled first so a chain loses everything below the gap.
    fn drop_unreachable_initial_values(&mut self) {
        let order: Vec<FieldId> = self.graph.topological_order().cloned().collect();
        for id in order {
            if self.gates_satisfied(&id) {
                continue;
            }
            let Some(field) = self.registry.get_mut(&id) else {
                continue;
            };
            if field.value() != FieldValue::Missing {
                tracing::warn!(field = %id, "initial value dropped: gating field has no selection");
                field.clear();
            }
        }
    }

    fn prerequisite_missing(&mut self, id: &FieldId, events: &mut Vec<FormEvent>) {
        let Some(field) = self.registry.get_mut(id) else {
            return;
        };
        field.show_prerequisite();
        events.push(FormEvent::PrerequisiteMissing {
            field: id.clone(),
            message: field.config().prerequisite_message().to_owned(),
        });
        events.push(FormEvent::ResultsUpdated(id.clone()));
    }

    fn gates_satisfied(&self, id: &str) -> bool {
        self.graph
            .gates(id)
            .into_iter()
            .all(|gate| self.registry.selection_of(gate.as_str()).is_some())
    }

    /// Gate values plus extra parameters for a query issued by `id`.
    fn collect_params(&self, id: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        for gate in self.graph.gates(id) {
            let Some(upstream) = self.registry.get(gate.as_str()) else {
                continue;
            };
            if let Some(item) = upstream.selection() {
                params.insert(upstream.config().gate_param_name().to_owned(), item.id.clone());
            }
        }

        let Some(field) = self.registry.get(id) else {
            return params;
        };
        for (name, source) in &field.config().params {
            let value = match source {
                ParamSource::Static(value) => Some(value.clone()),
                ParamSource::Field(other) => self
                    .registry
                    .selection_of(other.as_str())
                    .map(|item| item.id.clone()),
            };
            if let Some(value) = value.filter(|value| !value.is_empty()) {
                params.insert(name.clone(), value);
            }
        }
        params
    }

    fn require(&self, id: &FieldId) -> Result<(), FormError> {
        if self.registry.contains(id.as_str()) {
            Ok(())
        } else {
            Err(unknown(id))
        }
    }

    fn field_mut(&mut self, id: &FieldId) -> Result<&mut LookupField, FormError> {
        self.registry.get_mut(id.as_str()).ok_or_else(|| unknown(id))
    }
}

fn unknown(id: &FieldId) -> FormError {
    FormError::UnknownField(id.clone())
}

#[cfg(test)]
mod tests {
    use super::{FormCommand, FormError, FormEvent, LookupForm};
    use crate::{
        Choice, FieldConfig, FieldId, FieldValue, FormSettings, Item, ParamSource, ResultPage,
        SearchRequest,
    };
    use std::time::{Duration, Instant};

    fn form() -> LookupForm {
        LookupForm::new(
            vec![
                FieldConfig::new("hospital", "hospitals/search")
                    .with_gate_param("hospital_id")
                    .resets("service"),
                FieldConfig::new("service", "services/search")
                    .gated_by("hospital")
                    .with_gate_param("service_id")
                    .resets("office"),
                FieldConfig::new("office", "offices/search")
                    .gated_by("service")
                    .with_param("kind", ParamSource::Static("clinical".to_owned()))
                    .with_empty_option("No office"),
            ],
            FormSettings {
                debounce: Duration::from_millis(300),
            },
        )
        .expect("valid chain")
    }

    fn pick(form: &mut LookupForm, field: &str, id: &str, label: &str) -> Vec<FormEvent> {
        form.dispatch(
            FormCommand::Select {
                field: FieldId::from(field),
                choice: Choice::Item(Item::new(id, label)),
            },
            Instant::now(),
        )
        .expect("known field")
    }

    fn requests(events: &[FormEvent]) -> Vec<&SearchRequest> {
        events
            .iter()
            .filter_map(|event| match event {
                FormEvent::RequestIssued(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fields_start_disabled_behind_gates() {
        let form = form();
        assert!(form.field("hospital").expect("field").is_enabled());
        assert!(!form.field("service").expect("field").is_enabled());
        assert!(!form.field("office").expect("field").is_enabled());
    }

    #[test]
    fn search_collects_gate_values_and_static_params() {
        let mut form = form();
        pick(&mut form, "hospital", "h1", "Central");
        pick(&mut form, "service", "s1", "Radiology");

        let events = form
            .dispatch(
                FormCommand::Search {
                    field: "office".into(),
                    query: "ro".to_owned(),
                    page: 1,
                    append: false,
                },
                Instant::now(),
            )
            .expect("known field");
        let issued = requests(&events);
        assert_eq!(issued.len(), 1);
        let params = &issued[0].catalog.params;
        assert_eq!(params.get("service_id").map(String::as_str), Some("s1"));
        assert_eq!(params.get("kind").map(String::as_str), Some("clinical"));
        assert_eq!(params.get("hospital_id"), None);
    }

    #[test]
    fn search_on_gated_field_reports_prerequisite() {
        let mut form = form();
        let events = form
            .dispatch(FormCommand::BrowseAll("service".into()), Instant::now())
            .expect("known field");
        assert!(requests(&events).is_empty());
        assert!(events.iter().any(|event| matches!(
            event,
            FormEvent::PrerequisiteMissing { message, .. } if message == "Complete the required fields first."
        )));
        assert!(!form.modal().is_open());
    }

    #[test]
    fn typing_is_debounced_until_tick() {
        let mut form = form();
        let start = Instant::now();
        for (offset, text) in [(0, "c"), (100, "ce"), (200, "cen")] {
            let events = form
                .dispatch(
                    FormCommand::TextInput {
                        field: "hospital".into(),
                        text: text.to_owned(),
                    },
                    start + Duration::from_millis(offset),
                )
                .expect("known field");
            assert!(requests(&events).is_empty());
        }

        assert!(form.tick(start + Duration::from_millis(400)).is_empty());
        assert_eq!(form.deadline(), Some(start + Duration::from_millis(500)));
        let events = form.tick(start + Duration::from_millis(500));
        let issued = requests(&events);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].catalog.query, "cen");
    }

    #[test]
    fn typing_on_disabled_field_is_ignored() {
        let mut form = form();
        let events = form
            .dispatch(
                FormCommand::TextInput {
                    field: "office".into(),
                    text: "ro".to_owned(),
                },
                Instant::now(),
            )
            .expect("known field");
        assert!(events.is_empty());
        assert_eq!(form.field("office").expect("field").display_text(), "");
        assert_eq!(form.deadline(), None);
    }

    #[test]
    fn clearing_text_resets_and_cascades() {
        let mut form = form();
        pick(&mut form, "hospital", "h1", "Central");
        pick(&mut form, "service", "s1", "Radiology");

        let events = form
            .dispatch(
                FormCommand::TextInput {
                    field: "hospital".into(),
                    text: "  ".to_owned(),
                },
                Instant::now(),
            )
            .expect("known field");
        assert!(events.contains(&FormEvent::FieldReset("service".into())));
        assert!(form.field("service").expect("field").selection().is_none());
        assert!(!form.field("office").expect("field").is_enabled());
    }

    #[test]
    fn typing_over_selection_detaches_value() {
        let mut form = form();
        pick(&mut form, "hospital", "h1", "Central");
        pick(&mut form, "service", "s1", "Radiology");

        let type_hospital = |form: &mut LookupForm, text: &str| {
            form.dispatch(
                FormCommand::TextInput {
                    field: "hospital".into(),
                    text: text.to_owned(),
                },
                Instant::now(),
            )
            .expect("known field")
        };

        assert!(type_hospital(&mut form, "Central").is_empty());
        assert_eq!(
            form.field("hospital").expect("field").value(),
            FieldValue::Selected("h1".to_owned())
        );

        let events = type_hospital(&mut form, "Nor");
        assert!(events.contains(&FormEvent::SelectionChanged {
            field: "hospital".into(),
            value: FieldValue::Missing,
        }));
        let hospital = form.field("hospital").expect("field");
        assert_eq!(hospital.display_text(), "Nor");
        assert!(hospital.deadline().is_some());
        assert!(!form.field("service").expect("field").is_enabled());
        assert!(!form.field("office").expect("field").is_enabled());
        assert_eq!(
            form.values(),
            vec![
                ("hospital".into(), FieldValue::Missing),
                ("service".into(), FieldValue::Missing),
                ("office".into(), FieldValue::Missing),
            ]
        );
    }

    #[test]
    fn empty_choice_requires_configuration() {
        let mut form = form();
        pick(&mut form, "hospital", "h1", "Central");
        let error = form
            .dispatch(
                FormCommand::Select {
                    field: "service".into(),
                    choice: Choice::Empty,
                },
                Instant::now(),
            )
            .expect_err("service has no empty option");
        assert_eq!(error, FormError::EmptyOptionNotAllowed("service".into()));
    }

    #[test]
    fn unknown_fields_are_reported() {
        let mut form = form();
        let error = form
            .dispatch(FormCommand::Reset("ward".into()), Instant::now())
            .expect_err("unknown field");
        assert_eq!(error.to_string(), "unknown field ward");
    }

    #[test]
    fn values_follow_submission_contract() {
        let mut form = form();
        pick(&mut form, "hospital", "h1", "Central");
        pick(&mut form, "service", "s1", "Radiology");
        form.dispatch(
            FormCommand::Select {
                field: "office".into(),
                choice: Choice::Empty,
            },
            Instant::now(),
        )
        .expect("known field");

        assert_eq!(
            form.values(),
            vec![
                ("hospital".into(), FieldValue::Selected("h1".to_owned())),
                ("service".into(), FieldValue::Selected("s1".to_owned())),
                ("office".into(), FieldValue::ExplicitEmpty),
            ]
        );
    }

    #[test]
    fn load_more_appends_next_page() {
        let mut form = form();
        let events = form
            .dispatch(
                FormCommand::Search {
                    field: "hospital".into(),
                    query: "a".to_owned(),
                    page: 1,
                    append: false,
                },
                Instant::now(),
            )
            .expect("known field");
        let first = requests(&events)[0].clone();
        form.apply_response(first.respond(Ok(ResultPage::new(
            vec![Item::new("1", "Alpha")],
            1,
            2,
            2,
        ))));

        let events = form
            .dispatch(FormCommand::LoadMore("hospital".into()), Instant::now())
            .expect("known field");
        let second = requests(&events)[0].clone();
        assert_eq!(second.catalog.page, 2);
        assert!(second.ticket.append);
        form.apply_response(second.respond(Ok(ResultPage::new(
            vec![Item::new("2", "Beta")],
            2,
            2,
            2,
        ))));

        let results = form.field("hospital").expect("field").results();
        assert_eq!(results.items.len(), 2);
        assert!(!results.has_more);

        let events = form
            .dispatch(FormCommand::LoadMore("hospital".into()), Instant::now())
            .expect("known field");
        assert!(requests(&events).is_empty());
    }
}
