// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use lookup_core::{
    CatalogBackend, Choice, FieldId, FormCommand, FormEvent, LookupField, LookupForm,
    SearchRequest, SearchResponse,
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(250);

pub const HELP: &str = "\
commands:
  type <field> <text>   edit a field's search text (empty text clears it)
  more <field>          load the next page of inline results
  pick <field> <n>      select the n-th inline result
  pick <n>              select the n-th row of the browse view
  none [field]          choose the explicit empty option
  clear <field>         reset a field and everything downstream
  focus <field>         reopen a field's result list
  hide <field>          dismiss a field's result list
  browse <field>        open the paginated browse view
  find <text>           filter the browse view
  page <n> | next | prev | close
  show [field]          print field state
  values                print submission values
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Type { field: FieldId, text: String },
    More(FieldId),
    PickInline { field: FieldId, index: usize },
    PickBrowse(usize),
    PickEmpty(Option<FieldId>),
    Clear(FieldId),
    Focus(FieldId),
    Hide(FieldId),
    Browse(FieldId),
    Find(String),
    Page(u32),
    Next,
    Prev,
    Close,
    Show(Option<FieldId>),
    Values,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim_start();
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let mut args = rest.split_whitespace();
    let field = |name: Option<&str>| {
        name.map(FieldId::from)
            .ok_or_else(|| anyhow!("`{verb}` needs a field id"))
    };

    let command = match verb {
        "type" => {
            let rest = rest.trim_start();
            let (name, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Command::Type {
                field: field((!name.is_empty()).then_some(name))?,
                text: text.to_owned(),
            }
        }
        "more" => Command::More(field(args.next())?),
        "pick" => match (args.next(), args.next()) {
            (Some(name), Some(index)) => Command::PickInline {
                field: FieldId::from(name),
                index: parse_index(index)?,
            },
            (Some(index), None) => Command::PickBrowse(parse_index(index)?),
            _ => bail!("`pick` needs `<field> <n>` or `<n>`"),
        },
        "none" => Command::PickEmpty(args.next().map(FieldId::from)),
        "clear" => Command::Clear(field(args.next())?),
        "focus" => Command::Focus(field(args.next())?),
        "hide" => Command::Hide(field(args.next())?),
        "browse" => Command::Browse(field(args.next())?),
        "find" => Command::Find(rest.trim().to_owned()),
        "page" => {
            let raw = args.next().ok_or_else(|| anyhow!("`page` needs a page number"))?;
            Command::Page(
                raw.parse()
                    .with_context(|| format!("invalid page number {raw:?}"))?,
            )
        }
        "next" => Command::Next,
        "prev" => Command::Prev,
        "close" => Command::Close,
        "show" => Command::Show(args.next().map(FieldId::from)),
        "values" => Command::Values,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        unknown => bail!("unknown command {unknown:?}; type `help` for the list"),
    };
    Ok(Some(command))
}

fn parse_index(raw: &str) -> Result<usize> {
    let index: usize = raw
        .parse()
        .with_context(|| format!("invalid row number {raw:?}"))?;
    if index == 0 {
        bail!("row numbers start at 1");
    }
    Ok(index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
pub enum RuntimeEvent {
    Input(String),
    InputClosed,
    Response(SearchResponse),
}

/// Drives a [`LookupForm`] from text commands, running each catalog request
/// on its own worker thread. Responses come back over a channel in whatever
/// order the catalog answers.
pub struct FormRuntime<B> {
    form: LookupForm,
    backend: Arc<B>,
    tx: Sender<RuntimeEvent>,
    rx: Receiver<RuntimeEvent>,
    in_flight: usize,
}

impl<B> FormRuntime<B>
where
    B: CatalogBackend + Send + Sync + 'static,
{
    pub fn new(form: LookupForm, backend: Arc<B>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            form,
            backend,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn form(&self) -> &LookupForm {
        &self.form
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.form.deadline().is_none()
    }

    /// Reads commands from `input` until `quit`, or until input ends and no
    /// work is left.
    pub fn run<R, W>(mut self, input: R, out: &mut W) -> Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let tx = self.tx.clone();
        thread::spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(RuntimeEvent::Input(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(RuntimeEvent::InputClosed);
        });

        writeln!(out, "type `help` for commands")?;
        let mut input_open = true;
        loop {
            match self.rx.recv_timeout(self.wait_time(Instant::now())) {
                Ok(RuntimeEvent::Input(line)) => {
                    if self.execute(&line, Instant::now(), out)? == Flow::Quit {
                        break;
                    }
                }
                Ok(RuntimeEvent::InputClosed) => input_open = false,
                Ok(RuntimeEvent::Response(response)) => self.receive(response, out)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick(out)?;
            if !input_open && self.is_idle() {
                break;
            }
        }
        Ok(())
    }

    /// Runs one command line. Command mistakes are reported on `out`; only
    /// output failures are returned as errors.
    pub fn execute<W: Write>(&mut self, line: &str, now: Instant, out: &mut W) -> Result<Flow> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(error) => {
                writeln!(out, "error: {error:#}")?;
                return Ok(Flow::Continue);
            }
        };

        let form_command = match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                writeln!(out, "{HELP}")?;
                return Ok(Flow::Continue);
            }
            Command::Values => {
                self.print_values(out)?;
                return Ok(Flow::Continue);
            }
            Command::Show(field) => {
                self.show(field.as_ref(), out)?;
                return Ok(Flow::Continue);
            }
            Command::Type { field, text } => FormCommand::TextInput { field, text },
            Command::More(field) => FormCommand::LoadMore(field),
            Command::PickInline { field, index } => {
                match self.inline_item(&field, index) {
                    Ok(item) => FormCommand::Select {
                        field,
                        choice: Choice::Item(item),
                    },
                    Err(error) => {
                        writeln!(out, "error: {error:#}")?;
                        return Ok(Flow::Continue);
                    }
                }
            }
            Command::PickBrowse(index) => match self.browse_item(index) {
                Ok(item) => FormCommand::ModalSelect(Choice::Item(item)),
                Err(error) => {
                    writeln!(out, "error: {error:#}")?;
                    return Ok(Flow::Continue);
                }
            },
            Command::PickEmpty(Some(field)) => FormCommand::Select {
                field,
                choice: Choice::Empty,
            },
            Command::PickEmpty(None) => FormCommand::ModalSelect(Choice::Empty),
            Command::Clear(field) => FormCommand::Reset(field),
            Command::Focus(field) => FormCommand::Focus(field),
            Command::Hide(field) => FormCommand::Dismiss(field),
            Command::Browse(field) => FormCommand::BrowseAll(field),
            Command::Find(text) => FormCommand::ModalQuery(text),
            Command::Page(page) => FormCommand::ModalPage(page),
            Command::Next => FormCommand::ModalNext,
            Command::Prev => FormCommand::ModalPrevious,
            Command::Close => FormCommand::CloseModal,
        };

        match self.form.dispatch(form_command, now) {
            Ok(events) => self.handle(events, out)?,
            Err(error) => writeln!(out, "error: {error}")?,
        }
        Ok(Flow::Continue)
    }

    /// Processes responses and debounce deadlines until nothing is pending or
    /// `limit` elapses.
    pub fn settle<W: Write>(&mut self, out: &mut W, limit: Duration) -> Result<()> {
        let give_up = Instant::now() + limit;
        loop {
            self.tick(out)?;
            if self.is_idle() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= give_up {
                bail!("{} request(s) still pending after {limit:?}", self.in_flight);
            }
            match self.rx.recv_timeout(self.wait_time(now).min(give_up - now)) {
                Ok(RuntimeEvent::Response(response)) => self.receive(response, out)?,
                Ok(RuntimeEvent::Input(_) | RuntimeEvent::InputClosed)
                | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => bail!("runtime channel closed"),
            }
        }
    }

    fn tick<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let events = self.form.tick(Instant::now());
        self.handle(events, out)
    }

    fn receive<W: Write>(&mut self, response: SearchResponse, out: &mut W) -> Result<()> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let events = self.form.apply_response(response);
        self.handle(events, out)
    }

    fn wait_time(&self, now: Instant) -> Duration {
        self.form
            .deadline()
            .map_or(IDLE_POLL, |deadline| {
                deadline.saturating_duration_since(now).min(IDLE_POLL)
            })
    }

    fn spawn(&mut self, request: SearchRequest) {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        self.in_flight += 1;
        thread::spawn(move || {
            let response = request.execute(backend.as_ref());
            let _ = tx.send(RuntimeEvent::Response(response));
        });
    }

    fn handle<W: Write>(&mut self, events: Vec<FormEvent>, out: &mut W) -> Result<()> {
        let mut touched: Vec<FieldId> = Vec::new();
        let mut modal_changed = false;

        for event in events {
            match event {
                FormEvent::RequestIssued(request) => self.spawn(request),
                FormEvent::ResultsUpdated(field) => {
                    if !touched.contains(&field) {
                        touched.push(field);
                    }
                }
                FormEvent::PrerequisiteMissing { field, message } => {
                    writeln!(out, "{field}: {message}")?;
                }
                FormEvent::SelectionChanged { field, .. } => {
                    if let Some(lookup) = self.form.field(&field) {
                        writeln!(out, "{field} = {}", describe_value(lookup))?;
                    }
                }
                FormEvent::FieldReset(field) => writeln!(out, "{field} cleared")?,
                FormEvent::EnabledChanged { field, enabled } => {
                    let state = if enabled { "enabled" } else { "disabled" };
                    writeln!(out, "{field} {state}")?;
                }
                FormEvent::ModalOpened(field) => {
                    writeln!(out, "browsing {field}")?;
                    modal_changed = true;
                }
                FormEvent::ModalUpdated => modal_changed = true,
                FormEvent::ModalClosed => {
                    writeln!(out, "browse closed")?;
                    modal_changed = false;
                }
            }
        }

        for field in &touched {
            if let Some(lookup) = self.form.field(field) {
                write_results(lookup, out)?;
            }
        }
        if modal_changed {
            self.write_modal(out)?;
        }
        Ok(())
    }

    fn inline_item(&self, field: &FieldId, index: usize) -> Result<lookup_core::Item> {
        let lookup = self
            .form
            .field(field)
            .ok_or_else(|| anyhow!("unknown field {field}"))?;
        lookup
            .results()
            .items
            .get(index - 1)
            .cloned()
            .ok_or_else(|| anyhow!("{field} has no result #{index}"))
    }

    fn browse_item(&self, index: usize) -> Result<lookup_core::Item> {
        let session = self
            .form
            .modal()
            .session()
            .ok_or_else(|| anyhow!("nothing is being browsed; use `browse <field>`"))?;
        session
            .items()
            .get(index - 1)
            .cloned()
            .ok_or_else(|| anyhow!("no row #{index} on this page"))
    }

    fn show<W: Write>(&self, field: Option<&FieldId>, out: &mut W) -> Result<()> {
        match field {
            Some(id) => match self.form.field(id) {
                Some(lookup) => {
                    write_field(lookup, out)?;
                    write_results(lookup, out)?;
                }
                None => writeln!(out, "error: unknown field {id}")?,
            },
            None => {
                for lookup in self.form.registry().iter() {
                    write_field(lookup, out)?;
                }
                self.write_modal(out)?;
            }
        }
        Ok(())
    }

    fn print_values<W: Write>(&self, out: &mut W) -> Result<()> {
        for (id, value) in self.form.values() {
            let marker = self
                .form
                .field(&id)
                .map_or("", |field| field.config().empty_value.as_str());
            match value.as_form_value(marker) {
                Some(resolved) => writeln!(out, "{id}={resolved}")?,
                None => writeln!(out, "{id}=")?,
            }
        }
        Ok(())
    }

    fn write_modal<W: Write>(&self, out: &mut W) -> Result<()> {
        let Some(session) = self.form.modal().session() else {
            return Ok(());
        };
        writeln!(
            out,
            "[browse {}] page {}/{} ({} total){}",
            session.field(),
            session.current_page(),
            session.total_pages().max(1),
            session.total_count(),
            if session.query().is_empty() {
                String::new()
            } else {
                format!(" matching {:?}", session.query())
            }
        )?;
        if let Some(label) = session.empty_option() {
            writeln!(out, "   -  {label}  (`none`)")?;
        }
        for (position, item) in session.items().iter().enumerate() {
            writeln!(out, "  {:>2}. {} [{}]", position + 1, item.label, item.id)?;
        }
        if let Some(message) = session.status().message() {
            writeln!(out, "  {message}")?;
        }
        Ok(())
    }
}

fn describe_value(field: &LookupField) -> String {
    match (field.selection(), field.chose_empty()) {
        (Some(item), _) => format!("{} [{}]", item.label, item.id),
        (None, true) => format!("{} (empty)", field.config().empty_label()),
        (None, false) => "-".to_owned(),
    }
}

fn write_field<W: Write>(field: &LookupField, out: &mut W) -> Result<()> {
    let state = if field.is_enabled() { "" } else { " (disabled)" };
    writeln!(
        out,
        "{}{state}: {}",
        field.config().display_label(),
        describe_value(field)
    )?;
    Ok(())
}

fn write_results<W: Write>(field: &LookupField, out: &mut W) -> Result<()> {
    let results = field.results();
    if !results.visible {
        return Ok(());
    }
    for (position, item) in results.items.iter().enumerate() {
        writeln!(out, "  {:>2}. {} [{}]", position + 1, item.label, item.id)?;
    }
    if let Some(message) = results.status.message() {
        writeln!(out, "  {message}")?;
    }
    if results.has_more {
        writeln!(out, "  more available: `more {}`", field.id())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Command, Flow, FormRuntime, parse_command};
    use lookup_client::SearchClient;
    use lookup_core::{FieldConfig, FieldId, FieldValue, FormSettings, LookupForm, SearchFailure};
    use lookup_testkit::{FakeCatalog, HOSPITAL_ENDPOINT, OFFICE_ENDPOINT, SERVICE_ENDPOINT};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    const SETTLE: Duration = Duration::from_secs(5);

    fn runtime(catalog: FakeCatalog) -> FormRuntime<FakeCatalog> {
        let form = LookupForm::new(
            vec![
                FieldConfig::new("hospital", HOSPITAL_ENDPOINT)
                    .with_gate_param("hospital_id")
                    .resets("service"),
                FieldConfig::new("service", SERVICE_ENDPOINT)
                    .gated_by("hospital")
                    .with_gate_param("service_id")
                    .resets("office"),
                FieldConfig::new("office", OFFICE_ENDPOINT)
                    .gated_by("service")
                    .with_empty_option("No office"),
            ],
            FormSettings {
                debounce: Duration::ZERO,
            },
        )
        .expect("valid form");
        FormRuntime::new(form, Arc::new(catalog))
    }

    fn run_line(runtime: &mut FormRuntime<FakeCatalog>, line: &str) -> String {
        let mut out = Vec::new();
        runtime
            .execute(line, Instant::now(), &mut out)
            .expect("write to buffer");
        runtime.settle(&mut out, SETTLE).expect("settles");
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn parse_command_reads_verbs_and_arguments() {
        assert_eq!(parse_command("   ").expect("blank"), None);
        assert_eq!(
            parse_command("type hospital  saint mary").expect("type"),
            Some(Command::Type {
                field: FieldId::from("hospital"),
                text: " saint mary".to_owned(),
            })
        );
        assert_eq!(
            parse_command("type office").expect("type"),
            Some(Command::Type {
                field: FieldId::from("office"),
                text: String::new(),
            })
        );
        assert_eq!(
            parse_command("pick service 2").expect("pick"),
            Some(Command::PickInline {
                field: FieldId::from("service"),
                index: 2,
            })
        );
        assert_eq!(parse_command("pick 3").expect("pick"), Some(Command::PickBrowse(3)));
        assert_eq!(parse_command("none").expect("none"), Some(Command::PickEmpty(None)));
        assert_eq!(parse_command("find  north wing ").expect("find"), Some(Command::Find("north wing".to_owned())));
        assert_eq!(parse_command("page 4").expect("page"), Some(Command::Page(4)));
        assert_eq!(
            parse_command("focus office").expect("focus"),
            Some(Command::Focus(FieldId::from("office")))
        );
        assert_eq!(
            parse_command("hide office").expect("hide"),
            Some(Command::Hide(FieldId::from("office")))
        );
    }

    #[test]
    fn parse_command_reports_mistakes() {
        let error = parse_command("launch").expect_err("unknown verb");
        assert!(error.to_string().contains("type `help`"));
        let error = parse_command("pick 0").expect_err("zero row");
        assert!(error.to_string().contains("start at 1"));
        let error = parse_command("more").expect_err("missing field");
        assert!(error.to_string().contains("needs a field id"));
        assert!(parse_command("page x").is_err());
    }

    #[test]
    fn browse_pick_and_cascade() {
        let mut runtime = runtime(FakeCatalog::hospital_network(8, 3, 3, 2));

        let output = run_line(&mut runtime, "browse hospital");
        assert!(output.contains("browsing hospital"), "{output}");
        assert!(output.contains("[browse hospital] page 1/1 (3 total)"), "{output}");

        let output = run_line(&mut runtime, "pick 2");
        assert!(output.contains("hospital = "), "{output}");
        assert!(output.contains("[h2]"), "{output}");
        assert!(output.contains("service enabled"), "{output}");
        assert!(!runtime.form().modal().is_open());

        let output = run_line(&mut runtime, "type service #");
        assert!(output.contains("[h2-s"), "{output}");
        let output = run_line(&mut runtime, "pick service 1");
        assert!(output.contains("office enabled"), "{output}");

        let output = run_line(&mut runtime, "none office");
        assert!(output.contains("office = No office (empty)"), "{output}");
        assert_eq!(
            runtime.form().field("office").expect("field").value(),
            FieldValue::ExplicitEmpty
        );

        let output = run_line(&mut runtime, "clear hospital");
        assert!(output.contains("service cleared"), "{output}");
        assert!(output.contains("office disabled"), "{output}");
    }

    #[test]
    fn gated_field_reports_prerequisite() {
        let mut runtime = runtime(FakeCatalog::hospital_network(1, 1, 1, 1));
        let output = run_line(&mut runtime, "browse office");
        assert!(output.contains("office: Complete the required fields first."), "{output}");
        assert_eq!(runtime.in_flight(), 0);
    }

    #[test]
    fn failures_render_inline() {
        let catalog = FakeCatalog::hospital_network(1, 2, 1, 1);
        catalog.fail_next(SearchFailure::rejected(Some(429), Some("quota exceeded".to_owned())));
        let mut runtime = runtime(catalog);
        let output = run_line(&mut runtime, "type hospital cen");
        assert!(output.contains("quota exceeded"), "{output}");
    }

    #[test]
    fn command_errors_do_not_stop_the_runtime() {
        let mut runtime = runtime(FakeCatalog::new());
        let mut out = Vec::new();
        let flow = runtime
            .execute("pick ward 1", Instant::now(), &mut out)
            .expect("write to buffer");
        assert_eq!(flow, Flow::Continue);
        let flow = runtime
            .execute("clear ward", Instant::now(), &mut out)
            .expect("write to buffer");
        assert_eq!(flow, Flow::Continue);
        let output = String::from_utf8(out).expect("utf8 output");
        assert!(output.contains("error: unknown field ward"), "{output}");
    }

    #[test]
    fn values_use_empty_marker() {
        let mut runtime = runtime(FakeCatalog::new());
        let output = run_line(&mut runtime, "values");
        assert_eq!(output, "hospital=\nservice=\noffice=\n");
    }

    #[test]
    fn run_stops_on_quit() {
        let runtime = runtime(FakeCatalog::new());
        let mut out = Vec::new();
        runtime
            .run(Cursor::new("help\nvalues\nquit\nshow\n"), &mut out)
            .expect("run completes");
        let output = String::from_utf8(out).expect("utf8 output");
        assert!(output.contains("commands:"));
        assert!(output.contains("hospital=\n"));
        assert!(!output.contains("hospital: -"));
    }

    #[test]
    fn http_backend_round_trip() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start mock server");
        let base_url = format!("http://{}/api", server.server_addr());
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request expected");
            let url = request.url().to_owned();
            let response = tiny_http::Response::from_string(
                r#"{"results":[{"id":7,"text":"Central · Radiology"}],"next":false}"#,
            )
            .with_header(
                tiny_http::Header::from_bytes("Content-Type", "application/json")
                    .expect("valid content type header"),
            );
            request.respond(response).expect("response should succeed");
            url
        });

        let client = SearchClient::new(&base_url, Duration::from_secs(2)).expect("client");
        let form = LookupForm::new(
            vec![FieldConfig::new("service", "servicios/search")],
            FormSettings {
                debounce: Duration::ZERO,
            },
        )
        .expect("valid form");
        let mut runtime = FormRuntime::new(form, Arc::new(client));
        let mut out = Vec::new();
        runtime
            .execute("browse service", Instant::now(), &mut out)
            .expect("write to buffer");
        runtime.settle(&mut out, SETTLE).expect("settles");

        let url = handle.join().expect("server thread should join");
        assert_eq!(url, "/api/servicios/search?q=&page=1&per_page=20");
        let output = String::from_utf8(out).expect("utf8 output");
        assert!(output.contains("Central · Radiology [7]"), "{output}");
    }

    #[test]
    fn run_ends_when_input_closes() {
        let runtime = runtime(FakeCatalog::new());
        let mut out = Vec::new();
        runtime
            .run(Cursor::new("values\n"), &mut out)
            .expect("run completes");
        assert!(String::from_utf8(out).expect("utf8 output").ends_with("office=\n"));
    }
}
