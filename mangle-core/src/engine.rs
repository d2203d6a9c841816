use std::{fmt, sync::Arc};

use mangle_link::{Binder, Direction};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::{
    registry::{users, Named, Registry},
    Ack, Binding, DropReason, Entity, Error, Field, Interface, MemRef, Mode, OpSpec, Operand,
    OperandSpec, Operation, Process, Route, Rule, State, StateTable, Value, Verdict,
    DEFAULT_MASK,
};

/// What to do when a field is declared again under the same name with a different shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redefine {
    /// Fail with [`Error::Conflict`].
    #[default]
    Reject,
    /// Replace the registered field. Objects compiled against the old field keep using it.
    Replace,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    redefine: Redefine,
    leak_check: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { redefine: Redefine::Reject, leak_check: true }
    }
}

impl EngineOptions {
    /// Sets the field redefinition policy.
    pub fn redefine(mut self, redefine: Redefine) -> Self {
        self.redefine = redefine;
        self
    }

    /// Sets whether still referenced objects are reported at shutdown.
    pub fn leak_check(mut self, leak_check: bool) -> Self {
        self.leak_check = leak_check;
        self
    }
}

/// An object that was still referenced after the engine released everything it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leak {
    pub entity: Entity,
    pub name: String,
    pub refs: usize,
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} ({} references)", self.entity, self.name, self.refs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub leaks: Vec<Leak>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// The engine context: every registry, the process table and the dispatcher.
///
/// All mutation and all dispatching happen through `&mut self`, so a control operation is
/// never interleaved with an in-flight packet.
#[derive(Debug)]
pub struct Engine {
    options: EngineOptions,
    binder: Box<dyn Binder>,
    fields: Registry<Field>,
    ifaces: Registry<Interface>,
    rules: Registry<Rule>,
    states: StateTable,
    /// Processes keyed by input interface name.
    processes: FxHashMap<String, Process>,
    /// Source copy buffer for write operations.
    scratch: Vec<u8>,
    shut_down: bool,
}

impl Engine {
    /// Creates an engine with the default [`EngineOptions`].
    pub fn new(binder: impl Binder) -> Self {
        Self::with_options(binder, EngineOptions::default())
    }

    pub fn with_options(binder: impl Binder, options: EngineOptions) -> Self {
        Self {
            options,
            binder: Box::new(binder),
            fields: Registry::new(Entity::Field),
            ifaces: Registry::new(Entity::Iface),
            rules: Registry::new(Entity::Rule),
            states: StateTable::default(),
            processes: FxHashMap::default(),
            scratch: Vec::with_capacity(64),
            shut_down: false,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // Fields

    /// Returns the field `name`, creating it if needed. The returned handle is a reference.
    pub fn field(&mut self, name: &str, offset: i32, len: u16, mask: u8) -> Result<Arc<Field>, Error> {
        let field = Field::new(name, offset, len, mask);

        if let Some(existing) = self.fields.get(name) {
            if existing.same_shape(&field) {
                return Ok(Arc::clone(existing));
            }

            match self.options.redefine {
                Redefine::Reject => {
                    warn!(field = %name, "field redefined with a different shape, rejecting");
                    return Err(Error::Conflict { entity: Entity::Field, name: name.to_string() });
                }
                Redefine::Replace => {
                    warn!(field = %name, refs = users(existing), "field redefined with a different shape, replacing");
                }
            }
        }

        let field = Arc::new(field);
        self.fields.insert(Arc::clone(&field));
        Ok(field)
    }

    pub fn lookup_field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.get(name)
    }

    pub fn add_field(&mut self, name: &str, offset: i32, len: u16, mask: Option<u8>) -> Result<Ack, Error> {
        let field = self.field(name, offset, len, mask.unwrap_or(DEFAULT_MASK))?;
        debug!(field = %name, offset, len, mask = field.mask(), "added field");
        Ok(field_ack(Mode::Add, &field))
    }

    pub fn del_field(&mut self, name: &str) -> Result<Ack, Error> {
        self.fields.remove(name)?;
        debug!(field = %name, "deleted field");
        Ok(Ack::new(Mode::Del, Entity::Field, name))
    }

    pub fn show_fields(&self, name: Option<&str>) -> Result<Vec<Ack>, Error> {
        self.show(&self.fields, name, |field| {
            field_ack(Mode::Show, field).with("refs", users(field))
        })
    }

    // Interfaces

    /// Opens and registers the interface `name`. Adding a registered interface is a no-op.
    pub fn add_iface(&mut self, name: &str) -> Result<Ack, Error> {
        if self.ifaces.get(name).is_none() {
            let link = self.binder.open(name)?;
            self.ifaces.insert(Arc::new(Interface::new(name, link)));
            info!(iface = %name, "added interface");
        }

        Ok(Ack::new(Mode::Add, Entity::Iface, name))
    }

    pub fn lookup_iface(&self, name: &str) -> Option<&Arc<Interface>> {
        self.ifaces.get(name)
    }

    pub fn del_iface(&mut self, name: &str) -> Result<Ack, Error> {
        self.ifaces.remove(name)?;
        info!(iface = %name, "deleted interface");
        Ok(Ack::new(Mode::Del, Entity::Iface, name))
    }

    pub fn show_ifaces(&self, name: Option<&str>) -> Result<Vec<Ack>, Error> {
        self.show(&self.ifaces, name, |iface| {
            let stats = iface.stats();
            Ack::new(Mode::Show, Entity::Iface, iface.name())
                .with("rx", stats.rx())
                .with("tx", stats.tx())
                .with("drop", stats.dropped())
                .with("egress", stats.egress())
                .with("refs", users(iface))
        })
    }

    // States

    /// Returns the state `name` sized for `field`, creating or growing it as needed.
    pub fn state(&mut self, field: &Field, name: &str) -> Arc<State> {
        self.states.acquire(name, field.len())
    }

    pub fn show_states(&mut self, name: Option<&str>) -> Result<Vec<Ack>, Error> {
        self.states.purge();

        let states = match name {
            Some(name) => {
                vec![self.states.get(name).ok_or_else(|| Error::not_found(Entity::State, name))?]
            }
            None => self.states.live(),
        };

        Ok(states
            .iter()
            .map(|state| {
                Ack::new(Mode::Show, Entity::State, state.name())
                    .with("len", state.len())
                    .with("value", mangle_common::value::render(&state.snapshot()))
                    // Not counting the handle held here.
                    .with("refs", users(state))
            })
            .collect())
    }

    // Rules

    /// Compiles and registers a rule.
    ///
    /// A rule with the same name is replaced, unless it is referenced by a route.
    pub fn add_rule(&mut self, name: &str, matches: &[OpSpec], writes: &[OpSpec]) -> Result<Ack, Error> {
        if let Some(existing) = self.rules.get(name) {
            let refs = users(existing);
            if refs > 0 {
                return Err(Error::InUse { entity: Entity::Rule, name: name.to_string(), refs });
            }
        }

        let compiled = matches
            .iter()
            .map(|spec| self.compile(spec, false))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|matches| {
                let writes = writes.iter().map(|spec| self.compile(spec, true)).collect::<Result<Vec<_>, _>>()?;
                Ok((matches, writes))
            });

        // States created for the partial rule are already released.
        let (matches, writes) = compiled.map_err(|e| {
            self.states.purge();
            e
        })?;

        let rule = Arc::new(Rule::new(name, matches, writes));
        let ack = rule_ack(Mode::Add, &rule);
        if self.rules.insert(rule).is_some() {
            warn!(rule = %name, "replaced rule");
        } else {
            debug!(rule = %name, "added rule");
        }

        Ok(ack)
    }

    pub fn lookup_rule(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn del_rule(&mut self, name: &str) -> Result<Ack, Error> {
        self.rules.remove(name)?;
        self.states.purge();
        debug!(rule = %name, "deleted rule");
        Ok(Ack::new(Mode::Del, Entity::Rule, name))
    }

    pub fn show_rules(&self, name: Option<&str>) -> Result<Vec<Ack>, Error> {
        self.show(&self.rules, name, |rule| rule_ack(Mode::Show, rule).with("refs", users(rule)))
    }

    fn operand(&mut self, spec: &OperandSpec) -> Result<Operand, Error> {
        let field = self.fields.acquire(&spec.field)?;
        let mem = match &spec.binding {
            Binding::Packet => None,
            Binding::Value(text) => Some(MemRef::Value(Value::new(&field, text)?)),
            Binding::State(name) => Some(MemRef::State(self.states.acquire(name, field.len()))),
        };

        Ok(Operand::new(field, mem))
    }

    fn compile(&mut self, spec: &OpSpec, write: bool) -> Result<Operation, Error> {
        if write && matches!(spec.dest.binding, Binding::Value(_)) {
            return Err(Error::Malformed(format!("write destination {} is a literal", spec.dest)));
        }

        let dest = self.operand(&spec.dest)?;
        let source = self.operand(&spec.source)?;
        Operation::new(dest, source)
    }

    // Processes

    /// Installs the process for `input`, replacing any previous one.
    ///
    /// Either every name resolves and the process is installed, or nothing changes.
    pub fn add_process(&mut self, input: &str, routes: &[(String, String)]) -> Result<Ack, Error> {
        let iface = self.ifaces.acquire(input)?;

        let routes = routes
            .iter()
            .map(|(rule, output)| Ok::<_, Error>(Route::new(self.rules.acquire(rule)?, self.ifaces.acquire(output)?)))
            .collect::<Result<Vec<_>, Error>>()?;

        let process = Process::new(iface, routes);
        let ack = process_ack(Mode::Add, &process);

        if self.processes.insert(input.to_string(), process).is_some() {
            info!(iface = %input, "replaced process");
        } else {
            info!(iface = %input, "added process");
        }

        Ok(ack)
    }

    pub fn lookup_process(&self, input: &str) -> Option<&Process> {
        self.processes.get(input)
    }

    pub fn del_process(&mut self, input: &str) -> Result<Ack, Error> {
        self.processes.remove(input).ok_or_else(|| Error::not_found(Entity::Process, input))?;
        info!(iface = %input, "deleted process");
        Ok(Ack::new(Mode::Del, Entity::Process, input))
    }

    pub fn show_processes(&self, input: Option<&str>) -> Result<Vec<Ack>, Error> {
        let show = |process: &Process| {
            let hits = process.routes().iter().map(|route| route.hits().to_string()).collect::<Vec<_>>();
            process_ack(Mode::Show, process).with("hits", hits)
        };

        match input {
            Some(input) => {
                let process = self.processes.get(input).ok_or_else(|| Error::not_found(Entity::Process, input))?;
                Ok(vec![show(process)])
            }
            None => {
                let mut processes: Vec<_> = self.processes.values().collect();
                processes.sort_by(|a, b| a.input().name().cmp(b.input().name()));
                Ok(processes.into_iter().map(show).collect())
            }
        }
    }

    fn show<T, F>(&self, registry: &Registry<T>, name: Option<&str>, f: F) -> Result<Vec<Ack>, Error>
    where
        T: Named,
        F: Fn(&Arc<T>) -> Ack,
    {
        match name {
            Some(name) => Ok(vec![f(registry.lookup(name)?)]),
            None => Ok(registry.sorted().into_iter().map(f).collect()),
        }
    }

    // Data plane

    /// Dispatches one frame received on `iface`.
    pub fn on_packet(&mut self, iface: &str, direction: Direction, packet: &mut [u8]) -> Verdict {
        let Some(input) = self.ifaces.get(iface) else {
            debug!(iface = %iface, "frame for unknown interface");
            return Verdict::Dropped(DropReason::UnknownInterface);
        };

        if direction == Direction::Egress {
            input.stats().increment_egress();
            return Verdict::Dropped(DropReason::Egress);
        }

        input.stats().increment_rx(packet.len());

        let Some(process) = self.processes.get(iface) else {
            input.stats().increment_dropped();
            return Verdict::Dropped(DropReason::NoProcess);
        };

        let verdict = process.dispatch(packet, &mut self.scratch);
        if !verdict.is_forwarded() {
            input.stats().increment_dropped();
        }

        verdict
    }

    // Lifecycle

    /// Releases everything in dependency order: processes and their routes, then rules, then
    /// fields, interfaces and states. Anything still referenced afterwards is reported.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;

        info!(
            processes = self.processes.len(),
            rules = self.rules.len(),
            fields = self.fields.len(),
            ifaces = self.ifaces.len(),
            "shutting down engine"
        );

        let mut leaks = Vec::new();

        self.processes.clear();

        let rules = self.rules.drain();
        collect_leaks(&mut leaks, Entity::Rule, &rules, |rule| rule.name());
        drop(rules);

        let fields = self.fields.drain();
        collect_leaks(&mut leaks, Entity::Field, &fields, |field| field.name());
        drop(fields);

        let ifaces = self.ifaces.drain();
        collect_leaks(&mut leaks, Entity::Iface, &ifaces, |iface| iface.name());
        drop(ifaces);

        self.states.purge();
        for state in self.states.live() {
            leaks.push(Leak { entity: Entity::State, name: state.name().to_string(), refs: users(&state) });
        }
        self.states.clear();

        if !self.options.leak_check {
            leaks.clear();
        }

        for leak in &leaks {
            warn!(entity = %leak.entity, name = %leak.name, refs = leak.refs, "leaked at shutdown");
        }

        ShutdownReport { leaks }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn collect_leaks<T>(leaks: &mut Vec<Leak>, entity: Entity, items: &[Arc<T>], name: impl Fn(&T) -> &str) {
    for item in items {
        // The drained vector is now the only expected owner.
        let refs = users(item);
        if refs > 0 {
            leaks.push(Leak { entity, name: name(item).to_string(), refs });
        }
    }
}

fn field_ack(mode: Mode, field: &Field) -> Ack {
    let ack = Ack::new(mode, Entity::Field, field.name())
        .with("offt", field.offset())
        .with("len", field.len());

    if field.mask() == DEFAULT_MASK {
        ack
    } else {
        ack.with("mask", format!("{:#04x}", field.mask()))
    }
}

fn rule_ack(mode: Mode, rule: &Rule) -> Ack {
    Ack::new(mode, Entity::Rule, rule.name())
        .with("match", rule.match_ops().iter().map(ToString::to_string).collect::<Vec<_>>())
        .with("write", rule.write_ops().iter().map(ToString::to_string).collect::<Vec<_>>())
}

fn process_ack(mode: Mode, process: &Process) -> Ack {
    let routes = process
        .routes()
        .iter()
        .map(|route| format!("{}:{}", route.rule().name(), route.output().name()))
        .collect::<Vec<_>>();

    Ack::new(mode, Entity::Process, process.input().name()).with("routes", routes)
}
