//! Module loading and invocation
//!
//! The [`Interpreter`] owns the shared [`Program`] built from loaded modules
//! and drives routes, functions, commands, background handlers and tests
//! against it. Every invocation gets its own scope chain rooted at the
//! read-only global scope, so concurrent invocations never share mutable
//! bindings.

use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::capability::{Capability, Database, EventSink, Service, EVENT_SINK_BINDING};
use super::env::Environment;
use super::errors::RuntimeError;
use super::macros;
use super::types::{
    CommandDef, CronTask, EventHandler, FunctionDef, HttpMethod, Injection, Item, Module,
    QueueWorker, Route, Stmt, TestBlock, Type, TypeDef, Value,
};
use super::validator::{self, Severity};
use super::typeck::TypeScope;
use super::{Executor, Limits, Program};
use crate::config::Config;

/// Type name that resolves to the registered [`Database`]
const DATABASE_CAPABILITY: &str = "Database";

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub method: HttpMethod,
    /// Query string parameters
    pub params: IndexMap<String, String>,
    pub body: JsonValue,
    pub headers: HashMap<String, String>,
    pub auth: Option<JsonValue>,
}

impl Request {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            params: IndexMap::new(),
            body: JsonValue::Null,
            headers: HashMap::new(),
            auth: None,
        }
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: JsonValue) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: JsonValue,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn json(status: u16, body: JsonValue) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            body,
            headers,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }

    fn from_error(err: &RuntimeError) -> Self {
        match err {
            RuntimeError::ValidationFailure(msg) => Self::error(400, msg.clone()),
            other => Self::error(500, other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Imports
// ============================================================================

/// One exported declaration of a loaded module
#[derive(Debug, Clone)]
pub enum Export {
    Function(Arc<FunctionDef>),
    Type(Arc<TypeDef>),
    Command(Arc<CommandDef>),
    Value(Value),
}

/// A resolved module as handed over by the module loader
#[derive(Debug, Clone, Default)]
pub struct LoadedModule {
    pub namespace: String,
    pub exports: IndexMap<String, Export>,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// `import "mod" as alias` binds an object of every export
    Namespace(String),
    /// `import { name as alias } from "mod"`
    Selective(Vec<(String, String)>),
}

// ============================================================================
// Tests
// ============================================================================

#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub error: Option<RuntimeError>,
    pub duration: Duration,
}

impl TestResult {
    /// True when the test failed on an `assert` rather than a runtime error
    pub fn is_assertion_failure(&self) -> bool {
        matches!(self.error, Some(RuntimeError::AssertionFailure(_)))
    }
}

/// `*` matches any run of characters; everything else matches literally
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !name.starts_with(first) || name.len() < first.len() + last.len() || !name.ends_with(last) {
        return false;
    }
    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

/// Match a `/users/:id` pattern, returning captured segments
fn match_path(pattern: &str, path: &str) -> Option<IndexMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern_parts.len() != path_parts.len() {
        return None;
    }
    let mut captured = IndexMap::new();
    for (expected, actual) in pattern_parts.iter().zip(&path_parts) {
        match expected.strip_prefix(':') {
            Some(name) => {
                captured.insert(name.to_string(), actual.to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(captured)
}

fn string_map(map: impl IntoIterator<Item = (String, String)>) -> Value {
    Value::Object(map.into_iter().map(|(k, v)| (k, Value::Str(v))).collect())
}

/// Declarations of a module being loaded, held back until it loads cleanly
#[derive(Default)]
struct Staged {
    functions: Vec<Arc<FunctionDef>>,
    routes: Vec<Arc<Route>>,
    commands: Vec<Arc<CommandDef>>,
    crons: Vec<Arc<CronTask>>,
    events: Vec<Arc<EventHandler>>,
    queues: Vec<Arc<QueueWorker>>,
    tests: Vec<Arc<TestBlock>>,
}

// ============================================================================
// Interpreter
// ============================================================================

pub struct Interpreter {
    program: Arc<Program>,
    functions: IndexMap<String, Arc<FunctionDef>>,
    routes: Vec<Arc<Route>>,
    commands: IndexMap<String, Arc<CommandDef>>,
    crons: IndexMap<String, Arc<CronTask>>,
    events: IndexMap<String, Arc<EventHandler>>,
    queues: IndexMap<String, Arc<QueueWorker>>,
    tests: Vec<Arc<TestBlock>>,
    database: Option<Arc<dyn Database>>,
    services: HashMap<String, Arc<dyn Service>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_program(Program::default())
    }

    /// Interpreter with limits and timeouts taken from `config`
    pub fn with_config(config: &Config) -> Self {
        let mut program = Program::new(config.limits());
        program.await_timeout = config.await_timeout();
        Self::with_program(program)
    }

    fn with_program(program: Program) -> Self {
        Self {
            program: Arc::new(program),
            functions: IndexMap::new(),
            routes: Vec::new(),
            commands: IndexMap::new(),
            crons: IndexMap::new(),
            events: IndexMap::new(),
            queues: IndexMap::new(),
            tests: Vec::new(),
            database: None,
            services: HashMap::new(),
        }
    }

    /// Register the handler injected for `Database` parameters
    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Register the handler injected for parameters of type `kind`
    pub fn register_service(&mut self, kind: impl Into<String>, service: Arc<dyn Service>) {
        self.services.insert(kind.into(), service);
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn limits(&self) -> Limits {
        self.program.limits
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn tests(&self) -> &[Arc<TestBlock>] {
        &self.tests
    }

    fn executor(&self) -> Executor {
        Executor::new(Arc::clone(&self.program))
    }

    fn invocation_env(&self) -> Arc<Environment> {
        Environment::with_parent(&self.program.globals)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Expand, validate and register a module. May be called repeatedly;
    /// later modules see everything registered before them. Nothing is
    /// registered unless the whole module loads.
    pub fn load_module(&mut self, module: Module) -> Result<(), RuntimeError> {
        let module = macros::expand_module(module, self.program.limits.max_macro_depth)?;

        let issues = validator::validate_module(&module);
        for issue in issues.iter().filter(|i| i.severity == Severity::Warning) {
            warn!(rule = issue.rule_id, location = %issue.location, "{}", issue.message);
        }
        let errors: Vec<String> = issues
            .iter()
            .filter(|i| i.is_error())
            .map(ToString::to_string)
            .collect();
        if !errors.is_empty() {
            return Err(RuntimeError::Load(errors.join("; ")));
        }

        // Types and traits first so trait checks see every declaration
        let mut types = self.program.types.clone();
        for item in &module.items {
            match item {
                Item::TypeDef(def) => types.register_type(def.clone()),
                Item::Trait(def) => types.register_trait(def.clone()),
                _ => {}
            }
        }
        for item in &module.items {
            if let Item::TypeDef(def) = item {
                types.validate_trait_impl(def)?;
            }
        }

        // Bindings go to a staging scope over the live globals and are
        // copied in once every constant has evaluated
        let globals = Arc::clone(&self.program.globals);
        let staging = Environment::with_parent(&globals);
        let define = |name: &str| -> Result<(), RuntimeError> {
            if globals.has_local(name) || staging.has_local(name) {
                return Err(RuntimeError::DuplicateBinding(name.to_string()));
            }
            Ok(())
        };

        let mut staged = Staged::default();
        let mut consts = Vec::new();
        for item in module.items {
            match item {
                Item::Function(f) => {
                    define(&f.name)?;
                    let f = Arc::new(f);
                    staging.define(f.name.clone(), Value::Function(Arc::clone(&f)))?;
                    staged.functions.push(f);
                }
                Item::Route(r) => staged.routes.push(Arc::new(r)),
                Item::Command(c) => staged.commands.push(Arc::new(c)),
                Item::Cron(t) => staged.crons.push(Arc::new(t)),
                Item::Event(h) => staged.events.push(Arc::new(h)),
                Item::Queue(w) => staged.queues.push(Arc::new(w)),
                Item::Test(t) => staged.tests.push(Arc::new(t)),
                Item::Const(c) => consts.push(c),
                Item::TypeDef(_) | Item::Trait(_) | Item::Macro(_) => {}
            }
        }

        // Constants run in declaration order and may call functions
        let exec = Executor::new(Arc::new(Program {
            types: types.clone(),
            globals: Arc::clone(&staging),
            limits: self.program.limits,
            await_timeout: self.program.await_timeout,
        }));
        for c in consts {
            define(&c.name)?;
            let value = exec.eval(&c.value, &staging)?;
            if let Some(ty) = &c.ty {
                exec.types()
                    .check_type(&value, ty, exec.scope())
                    .map_err(|e| e.context(&format!("constant {}", c.name)))?;
            }
            staging.define_const(c.name, value)?;
        }

        // Commit
        for (name, value) in staging.get_local() {
            if staging.is_constant(&name) {
                globals.define_const(name, value)?;
            } else {
                globals.define(name, value)?;
            }
        }
        Arc::make_mut(&mut self.program).types = types;
        for f in staged.functions {
            self.functions.insert(f.name.clone(), f);
        }
        self.routes.extend(staged.routes);
        for c in staged.commands {
            self.commands.insert(c.name.clone(), c);
        }
        for t in staged.crons {
            self.crons.insert(t.name.clone(), t);
        }
        for h in staged.events {
            self.events.insert(h.event_type.clone(), h);
        }
        for w in staged.queues {
            self.queues.insert(w.queue.clone(), w);
        }
        self.tests.extend(staged.tests);

        debug!(
            functions = self.functions.len(),
            routes = self.routes.len(),
            commands = self.commands.len(),
            tests = self.tests.len(),
            "module loaded"
        );
        Ok(())
    }

    /// Everything this interpreter has loaded, as an importable module
    pub fn exports(&self, namespace: impl Into<String>) -> LoadedModule {
        let mut exports = IndexMap::new();
        for (name, f) in &self.functions {
            exports.insert(name.clone(), Export::Function(Arc::clone(f)));
        }
        for def in self.program.types.type_defs() {
            exports.insert(def.name.clone(), Export::Type(Arc::clone(def)));
        }
        for (name, c) in &self.commands {
            exports.insert(name.clone(), Export::Command(Arc::clone(c)));
        }
        for (name, value) in self.program.globals.get_local() {
            if self.program.globals.is_constant(&name) {
                exports.insert(name, Export::Value(value));
            }
        }
        LoadedModule {
            namespace: namespace.into(),
            exports,
        }
    }

    /// Bind a loaded module's exports. Imported functions resolve free
    /// names in this interpreter's global scope.
    pub fn import_module(&mut self, module: LoadedModule, kind: ImportKind) -> Result<(), RuntimeError> {
        debug!(namespace = %module.namespace, "import");
        match kind {
            ImportKind::Namespace(alias) => {
                let mut members = IndexMap::new();
                for (name, export) in module.exports {
                    match export {
                        Export::Function(f) => {
                            members.insert(name, Value::Function(f));
                        }
                        Export::Value(v) => {
                            members.insert(name, v);
                        }
                        Export::Type(def) => {
                            self.import_type(&format!("{}.{}", alias, name), &def)
                        }
                        Export::Command(c) => {
                            self.commands.insert(format!("{}.{}", alias, name), c);
                        }
                    }
                }
                self.program.globals.define_const(alias, Value::Object(members))
            }
            ImportKind::Selective(names) => {
                let mut exports = module.exports;
                for (name, alias) in names {
                    let export = exports.shift_remove(&name).ok_or_else(|| {
                        RuntimeError::UndefinedBinding(format!("{}.{}", module.namespace, name))
                    })?;
                    match export {
                        Export::Function(f) => {
                            self.program.globals.define_const(alias, Value::Function(f))?
                        }
                        Export::Value(v) => self.program.globals.define_const(alias, v)?,
                        Export::Type(def) => self.import_type(&alias, &def),
                        Export::Command(c) => {
                            self.commands.insert(alias, c);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn import_type(&mut self, name: &str, def: &TypeDef) {
        let mut def = def.clone();
        def.name = name.to_string();
        Arc::make_mut(&mut self.program).types.register_type(def);
    }

    // ------------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------------

    /// Bind every injection that has a registered handler. Unregistered
    /// ones stay unbound.
    fn bind_injections(&self, injections: &[Injection], env: &Arc<Environment>) {
        for injection in injections {
            let Some(kind) = injection.ty.base_name() else {
                continue;
            };
            let capability = if kind == DATABASE_CAPABILITY {
                self.database.clone().map(Capability::Database)
            } else {
                self.services.get(kind).map(|handler| Capability::Service {
                    kind: kind.to_string(),
                    handler: Arc::clone(handler),
                })
            };
            match capability {
                Some(capability) => env.bind(injection.name.clone(), Value::Capability(capability)),
                None => debug!(name = %injection.name, kind, "no handler registered for injection"),
            }
        }
    }

    /// Settle a body result that is itself a future
    fn settle(&self, result: Value) -> Result<Value, RuntimeError> {
        match result {
            Value::Future(f) => {
                let outcome = match self.program.await_timeout {
                    Some(timeout) => f.wait_timeout(timeout),
                    None => f.wait(),
                };
                if let Err(err) = &outcome {
                    warn!(error = %err, "returned future rejected");
                }
                outcome
            }
            other => Ok(other),
        }
    }

    fn run(&self, stmts: &[Stmt], env: &Arc<Environment>) -> Result<Value, RuntimeError> {
        let result = self.executor().run_body(stmts, env)?;
        self.settle(result)
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    pub fn find_route(&self, method: HttpMethod, path: &str) -> Option<(Arc<Route>, IndexMap<String, String>)> {
        self.routes.iter().find_map(|route| {
            if route.method != method {
                return None;
            }
            match_path(&route.path, path).map(|params| (Arc::clone(route), params))
        })
    }

    pub fn handle_request(&self, request: Request) -> Response {
        self.dispatch(request, None)
    }

    /// Like [`handle_request`](Self::handle_request), with `yield` delivering to `sink`
    pub fn handle_stream(&self, request: Request, sink: Arc<dyn EventSink>) -> Response {
        self.dispatch(request, Some(sink))
    }

    fn dispatch(&self, request: Request, sink: Option<Arc<dyn EventSink>>) -> Response {
        debug!(method = %request.method, path = %request.path, "dispatch");
        match self.find_route(request.method, &request.path) {
            Some((route, _)) => self.execute_route_with_sink(&route, request, sink),
            None => Response::error(404, "route not found"),
        }
    }

    pub fn execute_route(&self, route: &Route, request: Request) -> Response {
        self.execute_route_with_sink(route, request, None)
    }

    fn execute_route_with_sink(
        &self,
        route: &Route,
        request: Request,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Response {
        let env = self.invocation_env();
        if let Err(err) = self.bind_request(route, request, sink, &env) {
            return Response::from_error(&err);
        }

        let outcome = self.run(&route.body, &env).and_then(|value| {
            if let Some(ret) = &route.return_type {
                self.program
                    .types
                    .check_type(&value, ret, &TypeScope::new())
                    .map_err(|e| {
                        RuntimeError::type_mismatch(format!(
                            "return type mismatch in route {} {}: {}",
                            route.method, route.path, e
                        ))
                    })?;
            }
            Ok(value)
        });

        match outcome {
            Ok(value) => Response::json(200, value.to_json()),
            Err(err) => {
                debug!(route = %route.path, kind = err.kind(), error = %err, "route failed");
                Response::from_error(&err)
            }
        }
    }

    fn bind_request(
        &self,
        route: &Route,
        request: Request,
        sink: Option<Arc<dyn EventSink>>,
        env: &Arc<Environment>,
    ) -> Result<(), RuntimeError> {
        if let Some(path_params) = match_path(&route.path, &request.path) {
            for (name, value) in path_params {
                env.bind(name, Value::Str(value));
            }
        }
        env.bind("query", string_map(request.params));
        env.bind("headers", string_map(request.headers));

        let mut input = Value::from_json(request.body);
        if let Some(ty) = &route.input_type {
            self.apply_defaults(&mut input, ty)?;
            self.program
                .types
                .check_type(&input, ty, &TypeScope::new())
                .map_err(|e| RuntimeError::validation(format!("invalid input: {}", e)))?;
        }
        env.bind("input", input);

        if let Some(auth) = request.auth {
            env.bind("auth", Value::from_json(auth));
        }
        self.bind_injections(&route.injections, env);
        if let Some(sink) = sink {
            env.bind(EVENT_SINK_BINDING, Value::Capability(Capability::Events(sink)));
        }
        Ok(())
    }

    /// Fill missing fields that declare a default
    fn apply_defaults(&self, input: &mut Value, ty: &Type) -> Result<(), RuntimeError> {
        let (Value::Object(obj), Some(def)) = (
            &mut *input,
            ty.base_name().and_then(|name| self.program.types.type_def(name)),
        ) else {
            return Ok(());
        };
        let exec = self.executor();
        for field in &def.fields {
            if obj.contains_key(&field.name) {
                continue;
            }
            if let Some(default) = &field.default {
                let value = exec.eval(default, &self.program.globals)?;
                obj.insert(field.name.clone(), value);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Functions, commands and handlers
    // ------------------------------------------------------------------------

    pub fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedBinding(name.to_string()))?;
        let result = self.executor().call_function(f, &[], args)?;
        self.settle(result)
    }

    /// Run a command with named arguments
    pub fn execute_command(&self, name: &str, args: IndexMap<String, Value>) -> Result<Value, RuntimeError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedBinding(format!("command {}", name)))?;
        debug!(command = %name, "execute command");

        if let Some(unknown) = args.keys().find(|k| !command.params.iter().any(|p| &p.name == *k)) {
            return Err(RuntimeError::validation(format!(
                "unknown argument '{}' for command {}",
                unknown, name
            )));
        }

        let exec = self.executor();
        let env = self.invocation_env();
        let mut args = args;
        for param in &command.params {
            let value = match args.shift_remove(&param.name) {
                Some(value) => value,
                None => match &param.default {
                    Some(default) => exec.eval(default, &env)?,
                    None if !param.required => Value::Null,
                    None => {
                        return Err(RuntimeError::validation(format!(
                            "missing required argument '{}' for command {}",
                            param.name, name
                        )))
                    }
                },
            };
            let skip_check = value.is_null() && !param.required;
            if let Some(ty) = param.ty.as_ref().filter(|_| !skip_check) {
                exec.types()
                    .check_type(&value, ty, exec.scope())
                    .map_err(|e| e.context(&format!("argument {} of command {}", param.name, name)))?;
            }
            env.bind(param.name.clone(), value);
        }

        let result = self.run(&command.body, &env)?;
        if let Some(ret) = &command.return_type {
            exec.types()
                .check_type(&result, ret, exec.scope())
                .map_err(|e| e.context(&format!("return type mismatch in command {}", name)))?;
        }
        Ok(result)
    }

    pub fn execute_cron(&self, name: &str) -> Result<Value, RuntimeError> {
        let task = self
            .crons
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedBinding(format!("cron {}", name)))?;
        debug!(cron = %name, schedule = %task.schedule, "execute cron");
        let env = self.invocation_env();
        self.bind_injections(&task.injections, &env);
        self.run(&task.body, &env)
    }

    pub fn execute_event(&self, event_type: &str, event: Value) -> Result<Value, RuntimeError> {
        let handler = self
            .events
            .get(event_type)
            .ok_or_else(|| RuntimeError::UndefinedBinding(format!("event {}", event_type)))?;
        debug!(event = %event_type, "execute event handler");
        let env = self.invocation_env();
        env.bind("event", event.clone());
        env.bind("input", event);
        self.bind_injections(&handler.injections, &env);
        self.run(&handler.body, &env)
    }

    pub fn execute_queue(&self, queue: &str, message: Value) -> Result<Value, RuntimeError> {
        let worker = self
            .queues
            .get(queue)
            .ok_or_else(|| RuntimeError::UndefinedBinding(format!("queue {}", queue)))?;
        debug!(queue = %queue, "execute queue worker");
        let env = self.invocation_env();
        env.bind("message", message.clone());
        env.bind("input", message);
        self.bind_injections(&worker.injections, &env);
        self.run(&worker.body, &env)
    }

    /// Run every test whose name matches `filter` (all when `None`)
    pub fn run_tests(&self, filter: Option<&str>) -> Vec<TestResult> {
        self.tests
            .iter()
            .filter(|t| filter.map_or(true, |f| wildcard_match(f, &t.name)))
            .map(|test| {
                let started = Instant::now();
                let outcome = self.run(&test.body, &self.invocation_env());
                let duration = started.elapsed();
                debug!(test = %test.name, passed = outcome.is_ok(), ?duration, "test finished");
                TestResult {
                    name: test.name.clone(),
                    passed: outcome.is_ok(),
                    error: outcome.err(),
                    duration,
                }
            })
            .collect()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
